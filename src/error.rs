//! Failure taxonomy of the live pipeline.
//!
//! Every variant is caught and logged where it happens. None of them is allowed to
//! propagate far enough to take the host down.

use thiserror::Error;

/// Errors raised by the setup sequences and by individual ticks.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("numeric runtime failed to become ready: {0}")]
    RuntimeInit(String),

    #[error("model load failed: {0}")]
    ModelLoad(String),

    #[error("camera access failed: {0}")]
    CameraAccess(#[from] CameraAccessError),

    #[error("detection call failed: {0}")]
    DetectionCall(String),

    /// The detector is still working on an earlier frame.
    #[error("detector busy with an earlier frame")]
    DetectorBusy,

    #[error("model loader already initialized")]
    AlreadyInitialized,
}

/// Why a camera stream could not be acquired.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraAccessError {
    #[error("permission denied for {0}")]
    PermissionDenied(String),

    #[error("no video device at {0}")]
    NoDevice(String),

    #[error("device {device} unavailable: {reason}")]
    Unavailable { device: String, reason: String },
}

impl CameraAccessError {
    /// Classify an I/O failure raised while opening `device`.
    pub fn from_io(device: &str, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(device.to_string()),
            std::io::ErrorKind::NotFound => Self::NoDevice(device.to_string()),
            _ => Self::Unavailable {
                device: device.to_string(),
                reason: err.to_string(),
            },
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
