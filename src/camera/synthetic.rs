//! Synthetic camera for `stub://` devices.
//!
//! Produces a gradient background with a bright block sliding across it, at the
//! requested resolution and frame rate. `stub://denied` and `stub://absent`
//! reproduce the two acquisition failures a real camera can raise.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::stream::{FlagTrack, MediaStream};
use super::{CameraBackend, StreamConstraints};
use crate::error::CameraAccessError;
use crate::frame::VideoFrame;

pub const STUB_PREFIX: &str = "stub://";

/// Frames buffered between the producer and the sink. A live source drops
/// frames instead of queueing them.
const FRAME_QUEUE: usize = 2;

pub struct SyntheticCamera {
    device: String,
    failure: Option<CameraAccessError>,
}

impl SyntheticCamera {
    pub fn new(device: impl Into<String>) -> Self {
        let device = device.into();
        let failure = match device.strip_prefix(STUB_PREFIX) {
            Some("denied") => Some(CameraAccessError::PermissionDenied(device.clone())),
            Some("absent") => Some(CameraAccessError::NoDevice(device.clone())),
            _ => None,
        };
        Self { device, failure }
    }
}

impl CameraBackend for SyntheticCamera {
    fn device(&self) -> &str {
        &self.device
    }

    async fn request_video_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<MediaStream, CameraAccessError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        let (track, stopped) = FlagTrack::new(format!("{}#video", self.device));
        let (tx, rx) = mpsc::channel(FRAME_QUEUE);
        tokio::spawn(produce(constraints.clone(), stopped, tx));
        log::info!(
            "SyntheticCamera: streaming {} at {}x{} @ {} fps",
            self.device,
            constraints.width,
            constraints.height,
            constraints.target_fps
        );
        Ok(MediaStream::new(vec![Arc::new(track)], rx))
    }
}

async fn produce(
    constraints: StreamConstraints,
    stopped: Arc<AtomicBool>,
    tx: mpsc::Sender<VideoFrame>,
) {
    let period = Duration::from_millis(1000 / u64::from(constraints.target_fps.max(1)));
    let mut ticker = tokio::time::interval(period);
    let mut sequence = 0u64;
    loop {
        ticker.tick().await;
        if stopped.load(Ordering::SeqCst) {
            break;
        }
        let frame = render_scene(constraints.width, constraints.height, sequence);
        sequence += 1;
        match tx.try_send(frame) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => break,
        }
    }
    log::debug!("SyntheticCamera: producer exiting after {} frames", sequence);
}

/// Render frame `sequence` of the synthetic scene.
pub fn render_scene(width: u32, height: u32, sequence: u64) -> VideoFrame {
    let (w, h) = (width as usize, height as usize);
    let block = (w.min(h) / 6).max(1);
    let travel = w.saturating_sub(block).max(1);
    let block_x = ((sequence as usize) * 4) % travel;
    let block_y = h.saturating_sub(block) / 2;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for y in 0..h {
        for x in 0..w {
            let inside =
                x >= block_x && x < block_x + block && y >= block_y && y < block_y + block;
            if inside {
                pixels.extend_from_slice(&[250, 250, 250]);
            } else {
                pixels.push((x * 160 / w.max(1)) as u8);
                pixels.push((y * 160 / h.max(1)) as u8);
                pixels.push(64);
            }
        }
    }

    VideoFrame::from_rgb(width, height, pixels, sequence)
        .unwrap_or_else(|_| VideoFrame::solid(0, 0, [0, 0, 0], sequence))
}
