//! Live camera acquisition.
//!
//! `CameraSource` asks a backend for a video-only stream, keeps the stream's
//! tracks in a `CameraHandle`, binds the frames to a `VideoSink` and starts
//! playback. Releasing stops every track exactly once, whatever state the
//! acquisition reached.
//!
//! Backends:
//! - `stub://` synthetic camera (always available)
//! - V4L2 device nodes (feature: ingest-v4l2)

mod host;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod sink;
mod stream;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use std::cell::{Cell, RefCell};
use std::sync::Arc;

pub use host::HostCamera;
pub use sink::{Playback, VideoSink};
pub use stream::{FlagTrack, MediaStream, Track};
pub use synthetic::SyntheticCamera;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Camera;

use crate::config::CameraSettings;
use crate::error::{CameraAccessError, PipelineError, PipelineResult};

/// What the caller asks of the device. Streams are always video-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self::from(&CameraSettings::default())
    }
}

impl From<&CameraSettings> for StreamConstraints {
    fn from(settings: &CameraSettings) -> Self {
        Self {
            width: settings.width,
            height: settings.height,
            target_fps: settings.target_fps,
        }
    }
}

/// Host platform camera capability.
#[allow(async_fn_in_trait)]
pub trait CameraBackend {
    fn device(&self) -> &str;

    async fn request_video_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<MediaStream, CameraAccessError>;
}

/// The tracks of an acquired stream. Empty when acquisition never got a stream.
#[derive(Default)]
pub struct CameraHandle {
    tracks: Option<Vec<Arc<dyn Track>>>,
}

impl CameraHandle {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_tracks(tracks: Vec<Arc<dyn Track>>) -> Self {
        Self {
            tracks: Some(tracks),
        }
    }

    pub fn is_live(&self) -> bool {
        self.tracks.is_some()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.as_ref().map_or(0, Vec::len)
    }

    /// Stop every track. Returns how many tracks this call stopped; repeated
    /// calls and empty handles return 0.
    pub fn release(&mut self) -> usize {
        let Some(tracks) = self.tracks.take() else {
            return 0;
        };
        for track in &tracks {
            track.stop();
        }
        tracks.len()
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Owns the camera stream for one mount.
pub struct CameraSource<B> {
    backend: B,
    constraints: StreamConstraints,
    handle: RefCell<CameraHandle>,
    closed: Cell<bool>,
}

impl<B: CameraBackend> CameraSource<B> {
    pub fn new(backend: B, constraints: StreamConstraints) -> Self {
        Self {
            backend,
            constraints,
            handle: RefCell::new(CameraHandle::empty()),
            closed: Cell::new(false),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Request a stream, bind it to `sink` and start playback.
    ///
    /// Failures are logged here and returned; the handle keeps whatever tracks
    /// were obtained so `release` can stop them.
    pub async fn acquire(&self, sink: &VideoSink) -> PipelineResult<()> {
        let device = self.backend.device().to_string();
        log::info!(
            "requesting video stream from {} ({}x{} @ {} fps)",
            device,
            self.constraints.width,
            self.constraints.height,
            self.constraints.target_fps
        );

        let stream = match self.backend.request_video_stream(&self.constraints).await {
            Ok(stream) => stream,
            Err(err) => {
                let err = PipelineError::from(err);
                log::error!("error accessing camera: {}", err);
                return Err(err);
            }
        };

        let (tracks, frames) = stream.into_parts();
        if self.closed.get() {
            let mut late = CameraHandle::from_tracks(tracks);
            late.release();
            let err = PipelineError::from(CameraAccessError::Unavailable {
                device,
                reason: "camera released while the stream was being acquired".to_string(),
            });
            log::warn!("{}", err);
            return Err(err);
        }
        {
            let mut handle = self.handle.borrow_mut();
            handle.release();
            *handle = CameraHandle::from_tracks(tracks);
        }

        sink.bind(frames);
        if let Err(err) = sink.play().await {
            let err = PipelineError::from(CameraAccessError::Unavailable {
                device,
                reason: format!("{err:#}"),
            });
            log::error!("error starting playback: {}", err);
            return Err(err);
        }

        log::info!("camera {} live", self.backend.device());
        Ok(())
    }

    /// Stop all tracks of the current stream. Idempotent; safe after a failed
    /// or interrupted acquisition.
    pub fn release(&self) -> usize {
        self.closed.set(true);
        let stopped = self.handle.borrow_mut().release();
        if stopped > 0 {
            log::info!(
                "released camera {} ({} track(s) stopped)",
                self.backend.device(),
                stopped
            );
        }
        stopped
    }

    /// Allow acquisition again after `release`, for a full remount.
    pub fn reopen(&self) {
        self.closed.set(false);
    }

    pub fn is_live(&self) -> bool {
        self.handle.borrow().is_live()
    }

    pub fn track_count(&self) -> usize {
        self.handle.borrow().track_count()
    }
}
