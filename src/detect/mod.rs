mod backend;
mod backends;
mod detector;
mod labels;
mod registry;
mod result;

pub use backend::{DetectionCapability, DetectorBackend};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use detector::{BackendDetector, Detector};
pub use labels::coco_label;
pub use registry::{BackendRegistry, SharedBackend};
pub use result::{non_max_suppression, BoundingBox, Detection};
