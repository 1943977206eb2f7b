//! Live Overlay
//!
//! Renders a live, annotated camera feed: frames are captured from a camera,
//! passed periodically through an object detector, and painted onto a drawing
//! surface together with a box and a label for every detection.
//!
//! # Architecture
//!
//! Everything runs on a single-threaded cooperative loop (a tokio current-thread
//! runtime driving a `LocalSet`). Blocking work (model parsing, inference, device
//! capture) is pushed off the loop.
//!
//! 1. **ModelLoader**: waits for the numeric runtime, loads the model and
//!    publishes the detector handle exactly once.
//! 2. **CameraSource**: acquires a video-only stream, binds it to the
//!    `VideoSink` and starts playback; releasing stops every track.
//! 3. **DetectionScheduler**: idle until the detector is ready, then one detect
//!    call per tick against the current frame.
//! 4. **OverlayRenderer**: clears the surface, draws the frame, then a box and
//!    `"label (NN%)"` for every detection.
//!
//! # Module Structure
//!
//! - `frame`: `VideoFrame` and `Resolution`
//! - `camera`: camera backends, `CameraSource`, `VideoSink`
//! - `detect`: detection types, blocking backends and the async `Detector`
//! - `model`: `ModelLoader` and the runtime/model-source traits
//! - `overlay`: `Canvas` surfaces and `OverlayRenderer`
//! - `scheduler`: `DetectionScheduler`
//! - `app`: `LiveOverlay`, the owning context

pub mod app;
pub mod camera;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod model;
pub mod overlay;
pub mod scheduler;
pub mod ui;

pub use app::LiveOverlay;
pub use camera::{
    CameraBackend, CameraHandle, CameraSource, HostCamera, MediaStream, StreamConstraints, Track,
    VideoSink,
};
pub use config::OverlayConfig;
pub use detect::{BoundingBox, Detection, Detector};
pub use error::{CameraAccessError, PipelineError, PipelineResult};
pub use frame::{Resolution, VideoFrame};
pub use model::{BackendModelSource, HostRuntime, ModelLoader, ModelSource, NumericRuntime};
pub use overlay::{Canvas, OverlayRenderer, OverlayStyle, RasterSurface};
pub use scheduler::{DetectionScheduler, SchedulerHandle, SchedulerState, SchedulerStats};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
