//! V4L2 camera backend.
//!
//! Opens a local device node (e.g. /dev/video0), negotiates RGB3 or YUYV at the
//! preferred resolution and captures on a dedicated thread. Frames are normalized
//! to RGB24 and handed to the sink through a small bounded queue; when the sink
//! falls behind, frames are dropped rather than queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::stream::{FlagTrack, MediaStream};
use super::{CameraBackend, StreamConstraints};
use crate::error::CameraAccessError;
use crate::frame::{Resolution, VideoFrame};

const FRAME_QUEUE: usize = 2;
const MMAP_BUFFERS: u32 = 4;

pub struct V4l2Camera {
    device: String,
}

impl V4l2Camera {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl CameraBackend for V4l2Camera {
    fn device(&self) -> &str {
        &self.device
    }

    async fn request_video_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<MediaStream, CameraAccessError> {
        let (track, stopped) = FlagTrack::new(format!("{}#video", self.device));
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE);
        let (ready_tx, ready_rx) = oneshot::channel();

        let device = self.device.clone();
        let constraints = constraints.clone();
        std::thread::Builder::new()
            .name("v4l2-capture".to_string())
            .spawn(move || capture(device, constraints, stopped, frame_tx, ready_tx))
            .map_err(|err| CameraAccessError::Unavailable {
                device: self.device.clone(),
                reason: format!("spawn capture thread: {err}"),
            })?;

        let resolution = ready_rx
            .await
            .map_err(|_| CameraAccessError::Unavailable {
                device: self.device.clone(),
                reason: "capture thread exited during setup".to_string(),
            })??;

        log::info!(
            "V4l2Camera: connected to {} ({})",
            self.device,
            resolution
        );
        Ok(MediaStream::new(vec![Arc::new(track)], frame_rx))
    }
}

struct OpenDevice {
    device: v4l::Device,
    resolution: Resolution,
    format: PixelFormat,
}

fn open(path: &str, constraints: &StreamConstraints) -> Result<OpenDevice, CameraAccessError> {
    use v4l::video::Capture;

    let unavailable = |reason: String| CameraAccessError::Unavailable {
        device: path.to_string(),
        reason,
    };

    let device =
        v4l::Device::with_path(path).map_err(|err| CameraAccessError::from_io(path, &err))?;
    let mut format = device
        .format()
        .map_err(|err| unavailable(format!("read format: {err}")))?;
    format.width = constraints.width;
    format.height = constraints.height;

    let mut negotiated = None;
    for fourcc in [b"RGB3", b"YUYV"] {
        format.fourcc = v4l::FourCC::new(fourcc);
        match device.set_format(&format) {
            Ok(applied) if applied.fourcc == v4l::FourCC::new(fourcc) => {
                negotiated = Some(applied);
                break;
            }
            Ok(applied) => log::debug!(
                "V4l2Camera: {} answered {} when asked for {}",
                path,
                applied.fourcc,
                v4l::FourCC::new(fourcc)
            ),
            Err(err) => log::warn!("V4l2Camera: failed to set format on {}: {}", path, err),
        }
    }
    let format = negotiated.ok_or_else(|| unavailable("neither RGB3 nor YUYV supported".into()))?;
    let pixel_format = if format.fourcc == v4l::FourCC::new(b"RGB3") {
        PixelFormat::Rgb24
    } else {
        PixelFormat::Yuyv
    };

    if constraints.target_fps > 0 {
        let params = v4l::video::capture::Parameters::with_fps(constraints.target_fps);
        if let Err(err) = device.set_params(&params) {
            log::warn!("V4l2Camera: failed to set fps on {}: {}", path, err);
        }
    }

    Ok(OpenDevice {
        device,
        resolution: Resolution::new(format.width, format.height),
        format: pixel_format,
    })
}

fn capture(
    path: String,
    constraints: StreamConstraints,
    stopped: Arc<AtomicBool>,
    frames: mpsc::Sender<VideoFrame>,
    ready: oneshot::Sender<Result<Resolution, CameraAccessError>>,
) {
    use v4l::buffer::Type;
    use v4l::io::traits::CaptureStream;

    let mut open = match open(&path, &constraints) {
        Ok(open) => open,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    let resolution = open.resolution;
    let mut stream =
        match v4l::prelude::MmapStream::with_buffers(&mut open.device, Type::VideoCapture, MMAP_BUFFERS) {
            Ok(stream) => stream,
            Err(err) => {
                let _ = ready.send(Err(CameraAccessError::Unavailable {
                    device: path.clone(),
                    reason: format!("create buffer stream: {err}"),
                }));
                return;
            }
        };
    if ready.send(Ok(resolution)).is_err() {
        return;
    }

    let mut sequence = 0u64;
    while !stopped.load(Ordering::SeqCst) {
        let (buf, meta) = match stream.next() {
            Ok(next) => next,
            Err(err) => {
                log::warn!("V4l2Camera: capture on {} failed: {}", path, err);
                break;
            }
        };
        let used = (meta.bytesused as usize).min(buf.len());
        let rgb = match normalize_to_rgb(
            &buf[..used],
            resolution.width,
            resolution.height,
            open.format,
        ) {
            Ok(rgb) => rgb,
            Err(err) => {
                log::debug!("V4l2Camera: dropping malformed frame: {:#}", err);
                continue;
            }
        };
        let frame = match VideoFrame::from_rgb(resolution.width, resolution.height, rgb, sequence) {
            Ok(frame) => frame,
            Err(err) => {
                log::debug!("V4l2Camera: dropping frame: {:#}", err);
                continue;
            }
        };
        sequence += 1;
        match frames.try_send(frame) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => break,
        }
    }
    log::info!("V4l2Camera: capture on {} stopped after {} frames", path, sequence);
}
