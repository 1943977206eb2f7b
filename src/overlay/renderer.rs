use anyhow::Result;

use super::surface::Canvas;
use crate::config::{parse_color, StyleSettings};
use crate::detect::{BoundingBox, Detection};
use crate::frame::VideoFrame;

/// Label baseline used when the box is too close to the top edge.
const MIN_LABEL_Y: f32 = 10.0;
const LABEL_OFFSET: f32 = 5.0;

#[derive(Clone, Debug, PartialEq)]
pub struct OverlayStyle {
    pub line_width: u32,
    pub stroke: [u8; 3],
    pub label: [u8; 3],
    pub font_scale: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            line_width: 2,
            stroke: [255, 0, 0],
            label: [255, 0, 0],
            font_scale: 1,
        }
    }
}

impl OverlayStyle {
    pub fn from_settings(settings: &StyleSettings) -> Result<Self> {
        Ok(Self {
            line_width: settings.line_width,
            stroke: parse_color(&settings.stroke_color)?,
            label: parse_color(&settings.label_color)?,
            font_scale: settings.font_scale,
        })
    }
}

/// Paints a frame and its detections onto a surface.
#[derive(Clone, Debug, Default)]
pub struct OverlayRenderer {
    style: OverlayStyle,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Replace the surface content with `frame` plus one box and label per
    /// detection, in list order. Never resizes the surface.
    pub fn render<C: Canvas + ?Sized>(
        &self,
        surface: &mut C,
        frame: &VideoFrame,
        detections: &[Detection],
    ) {
        surface.clear();
        surface.draw_frame(frame);
        for detection in detections {
            surface.stroke_rect(&detection.bbox, self.style.line_width, self.style.stroke);
            let (x, y) = label_anchor(&detection.bbox);
            surface.fill_text(
                &label_text(detection),
                x,
                y,
                self.style.label,
                self.style.font_scale,
            );
        }
    }
}

/// `"{label} ({percent}%)"`.
pub fn label_text(detection: &Detection) -> String {
    format!(
        "{} ({}%)",
        detection.label,
        confidence_percent(detection.confidence)
    )
}

/// Confidence as a whole percentage, rounded half away from zero.
pub fn confidence_percent(confidence: f32) -> i64 {
    (f64::from(confidence) * 100.0).round() as i64
}

/// Where a box's label baseline goes: just above the box, or pinned to the top
/// margin when the box starts within it.
pub fn label_anchor(bbox: &BoundingBox) -> (f32, f32) {
    let y = if bbox.y > MIN_LABEL_Y {
        bbox.y - LABEL_OFFSET
    } else {
        MIN_LABEL_Y
    };
    (bbox.x, y)
}
