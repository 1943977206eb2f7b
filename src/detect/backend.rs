use anyhow::Result;

use crate::detect::result::Detection;

/// Detection capabilities a backend can offer.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    Motion,
    ObjectDetection,
}

/// Synchronous detector backend.
///
/// Backends do the numeric work and may block for a whole inference pass, so the
/// pipeline only ever calls them from the blocking pool (see `BackendDetector`).
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on one RGB24 frame.
    ///
    /// Boxes are returned in the pixel coordinates of the frame that was passed in.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once after loading.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
