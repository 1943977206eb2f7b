//! Video frames as they flow from the camera to the detector and renderer.
//!
//! A `VideoFrame` is a cheap handle: the pixel buffer is shared behind an `Arc`,
//! so handing "the current frame" to a detector or renderer never copies pixels.

use anyhow::{anyhow, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Display size used before the stream reports its native resolution.
pub const DEFAULT_DISPLAY_WIDTH: u32 = 640;
pub const DEFAULT_DISPLAY_HEIGHT: u32 = 480;

/// Pixel dimensions of a frame or drawing surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero (stream not live yet).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of bytes an RGB24 buffer of this size occupies.
    pub fn rgb_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(3))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One RGB24 frame of live video.
#[derive(Clone)]
pub struct VideoFrame {
    resolution: Resolution,
    pixels: Arc<[u8]>,
    sequence: u64,
    captured_at: Instant,
}

impl VideoFrame {
    /// Wrap a row-major RGB24 buffer. The length must match the dimensions.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>, sequence: u64) -> Result<Self> {
        let resolution = Resolution::new(width, height);
        let expected = resolution
            .rgb_len()
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            resolution,
            pixels: pixels.into(),
            sequence,
            captured_at: Instant::now(),
        })
    }

    /// A frame filled with a single colour.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3], sequence: u64) -> Self {
        let len = (width as usize) * (height as usize);
        let mut pixels = Vec::with_capacity(len * 3);
        for _ in 0..len {
            pixels.extend_from_slice(&rgb);
        }
        Self {
            resolution: Resolution::new(width, height),
            pixels: pixels.into(),
            sequence,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Read-only pixel view (RGB24, row-major).
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Monotonic per-stream frame counter.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Milliseconds since the frame was captured.
    pub fn age_ms(&self) -> u128 {
        self.captured_at.elapsed().as_millis()
    }

    /// True when both handles point at the same pixel buffer.
    pub fn shares_pixels_with(&self, other: &VideoFrame) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Pixel content stays out of logs.
        f.debug_struct("VideoFrame")
            .field("resolution", &self.resolution)
            .field("sequence", &self.sequence)
            .finish()
    }
}
