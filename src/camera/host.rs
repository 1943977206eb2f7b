use super::stream::MediaStream;
use super::synthetic::{SyntheticCamera, STUB_PREFIX};
#[cfg(feature = "ingest-v4l2")]
use super::v4l2::V4l2Camera;
use super::{CameraBackend, StreamConstraints};
use crate::error::CameraAccessError;

/// Camera selected from a device string: `stub://...` is synthetic, anything
/// else is a V4L2 device node when the `ingest-v4l2` feature is built in.
pub enum HostCamera {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(V4l2Camera),
    #[cfg(not(feature = "ingest-v4l2"))]
    Unsupported(String),
}

impl HostCamera {
    pub fn for_device(device: &str) -> Self {
        if device.starts_with(STUB_PREFIX) {
            return Self::Synthetic(SyntheticCamera::new(device));
        }
        #[cfg(feature = "ingest-v4l2")]
        {
            Self::Device(V4l2Camera::new(device))
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            Self::Unsupported(device.to_string())
        }
    }
}

impl CameraBackend for HostCamera {
    fn device(&self) -> &str {
        match self {
            Self::Synthetic(camera) => camera.device(),
            #[cfg(feature = "ingest-v4l2")]
            Self::Device(camera) => camera.device(),
            #[cfg(not(feature = "ingest-v4l2"))]
            Self::Unsupported(device) => device,
        }
    }

    async fn request_video_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<MediaStream, CameraAccessError> {
        match self {
            Self::Synthetic(camera) => camera.request_video_stream(constraints).await,
            #[cfg(feature = "ingest-v4l2")]
            Self::Device(camera) => camera.request_video_stream(constraints).await,
            #[cfg(not(feature = "ingest-v4l2"))]
            Self::Unsupported(device) => {
                log::warn!(
                    "{} is not a stub device and this build lacks the ingest-v4l2 feature",
                    device
                );
                Err(CameraAccessError::NoDevice(device.clone()))
            }
        }
    }
}
