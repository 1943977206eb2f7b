use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::frame::VideoFrame;

/// One constituent track of a live stream.
///
/// `stop` must be idempotent: stopping an already stopped track is a no-op.
pub trait Track: Send + Sync {
    fn id(&self) -> &str;

    fn stop(&self);

    fn is_stopped(&self) -> bool;
}

/// A live, video-only capture stream as handed out by a camera backend.
pub struct MediaStream {
    tracks: Vec<Arc<dyn Track>>,
    frames: mpsc::Receiver<VideoFrame>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Arc<dyn Track>>, frames: mpsc::Receiver<VideoFrame>) -> Self {
        Self { tracks, frames }
    }

    pub fn tracks(&self) -> &[Arc<dyn Track>] {
        &self.tracks
    }

    pub(crate) fn into_parts(self) -> (Vec<Arc<dyn Track>>, mpsc::Receiver<VideoFrame>) {
        (self.tracks, self.frames)
    }
}

/// Track backed by a shared stop flag that the producer polls.
#[derive(Debug)]
pub struct FlagTrack {
    id: String,
    stopped: Arc<AtomicBool>,
}

impl FlagTrack {
    /// Returns the track and the flag its producer should watch.
    pub fn new(id: impl Into<String>) -> (Self, Arc<AtomicBool>) {
        let stopped = Arc::new(AtomicBool::new(false));
        (
            Self {
                id: id.into(),
                stopped: stopped.clone(),
            },
            stopped,
        )
    }
}

impl Track for FlagTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            log::debug!("track {} stopped", self.id);
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
