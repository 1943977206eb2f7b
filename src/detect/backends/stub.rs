use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{BoundingBox, Detection};

/// Luma difference a pixel must exceed to count as changed.
const DEFAULT_CHANGE_THRESHOLD: u8 = 24;

/// Frame-differencing backend.
///
/// Reports one `motion` box around every pixel whose luma changed since the
/// previous frame. Needs no model, which makes it the default for demos and tests.
pub struct StubBackend {
    previous: Option<LumaPlane>,
    threshold: u8,
}

struct LumaPlane {
    width: u32,
    height: u32,
    luma: Vec<u8>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            previous: None,
            threshold: DEFAULT_CHANGE_THRESHOLD,
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(
            capability,
            DetectionCapability::Motion | DetectionCapability::ObjectDetection
        )
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let current = LumaPlane::from_rgb(pixels, width, height)?;
        let detections = match self.previous.as_ref() {
            Some(prev) if prev.width == width && prev.height == height => {
                changed_region(prev, &current, self.threshold)
                    .into_iter()
                    .collect()
            }
            _ => Vec::new(),
        };
        self.previous = Some(current);
        Ok(detections)
    }
}

impl LumaPlane {
    fn from_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize) * (height as usize) * 3;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected,
                pixels.len()
            ));
        }
        let luma = pixels
            .chunks_exact(3)
            .map(|px| ((px[0] as u32 * 77 + px[1] as u32 * 150 + px[2] as u32 * 29) >> 8) as u8)
            .collect();
        Ok(Self {
            width,
            height,
            luma,
        })
    }
}

fn changed_region(prev: &LumaPlane, current: &LumaPlane, threshold: u8) -> Option<Detection> {
    let width = current.width as usize;
    let (mut min_x, mut min_y) = (usize::MAX, usize::MAX);
    let (mut max_x, mut max_y) = (0usize, 0usize);
    let mut changed = 0usize;

    for (idx, (a, b)) in prev.luma.iter().zip(&current.luma).enumerate() {
        if a.abs_diff(*b) <= threshold {
            continue;
        }
        let (x, y) = (idx % width, idx / width);
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
        changed += 1;
    }

    if changed == 0 {
        return None;
    }

    let w = (max_x - min_x + 1) as f32;
    let h = (max_y - min_y + 1) as f32;
    let confidence = (changed as f32 / (w * h)).clamp(0.0, 1.0);
    Some(Detection::new(
        BoundingBox::new(min_x as f32, min_y as f32, w, h),
        "motion",
        confidence,
    ))
}
