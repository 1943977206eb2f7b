//! Drawing surfaces the overlay renders onto.

use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use sha2::{Digest, Sha256};

use super::font;
use crate::detect::BoundingBox;
use crate::frame::{Resolution, VideoFrame};

/// A 2D drawing surface with a fixed pixel size until explicitly resized.
pub trait Canvas {
    fn size(&self) -> Resolution;

    /// Change the pixel dimensions. Existing content is discarded.
    fn resize(&mut self, size: Resolution);

    /// Clear every pixel to transparent.
    fn clear(&mut self);

    /// Draw `frame` scaled to cover the whole surface.
    fn draw_frame(&mut self, frame: &VideoFrame);

    fn stroke_rect(&mut self, bbox: &BoundingBox, line_width: u32, color: [u8; 3]);

    /// Fill `text` with its left edge at `x` and its baseline at `y`.
    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: [u8; 3], scale: u32);
}

/// RGBA raster surface.
pub struct RasterSurface {
    image: RgbaImage,
}

impl RasterSurface {
    pub fn new(size: Resolution) -> Self {
        Self {
            image: RgbaImage::new(size.width, size.height),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// SHA-256 over the dimensions and pixel content, hex encoded.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.image.width().to_be_bytes());
        hasher.update(self.image.height().to_be_bytes());
        hasher.update(self.image.as_raw());
        hex::encode(hasher.finalize())
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.image
            .save_with_format(path, ImageFormat::Png)
            .with_context(|| format!("write snapshot {}", path.display()))
    }
}

impl Canvas for RasterSurface {
    fn size(&self) -> Resolution {
        Resolution::new(self.image.width(), self.image.height())
    }

    fn resize(&mut self, size: Resolution) {
        if size != self.size() {
            self.image = RgbaImage::new(size.width, size.height);
        }
    }

    fn clear(&mut self) {
        self.image.pixels_mut().for_each(|p| *p = Rgba([0, 0, 0, 0]));
    }

    fn draw_frame(&mut self, frame: &VideoFrame) {
        let size = self.size();
        if size.is_empty() || frame.resolution().is_empty() {
            return;
        }
        let Some(source) =
            RgbImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
        else {
            log::warn!("frame {} has a malformed pixel buffer", frame.sequence());
            return;
        };
        let scaled = if frame.resolution() == size {
            source
        } else {
            imageops::resize(&source, size.width, size.height, FilterType::Nearest)
        };
        for (dst, Rgb([r, g, b])) in self.image.pixels_mut().zip(scaled.pixels().copied()) {
            *dst = Rgba([r, g, b, 255]);
        }
    }

    fn stroke_rect(&mut self, bbox: &BoundingBox, line_width: u32, color: [u8; 3]) {
        let [r, g, b] = color;
        let color = Rgba([r, g, b, 255]);
        let x = bbox.x.round() as i32;
        let y = bbox.y.round() as i32;
        let width = bbox.width.round().max(0.0) as i32;
        let height = bbox.height.round().max(0.0) as i32;

        // Insets stack inwards from the box edge, one pixel per unit of width.
        for inset in 0..line_width as i32 {
            let w = width - 2 * inset;
            let h = height - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x + inset, y + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(&mut self.image, rect, color);
        }
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: [u8; 3], scale: u32) {
        let [r, g, b] = color;
        font::draw_text(
            &mut self.image,
            text,
            x.round() as i32,
            y.round() as i32,
            Rgba([r, g, b, 255]),
            scale,
        );
    }
}

/// One call made against a `RecordingCanvas`.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    Resize(Resolution),
    Clear,
    Frame { sequence: u64, resolution: Resolution },
    StrokeRect { bbox: BoundingBox, line_width: u32, color: [u8; 3] },
    FillText { text: String, x: f32, y: f32, color: [u8; 3] },
}

/// Canvas that records draw calls instead of rasterizing them.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    size: Resolution,
    ops: Vec<DrawOp>,
}

impl RecordingCanvas {
    pub fn new(size: Resolution) -> Self {
        Self {
            size,
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }
}

impl Canvas for RecordingCanvas {
    fn size(&self) -> Resolution {
        self.size
    }

    fn resize(&mut self, size: Resolution) {
        self.size = size;
        self.ops.push(DrawOp::Resize(size));
    }

    fn clear(&mut self) {
        self.ops.push(DrawOp::Clear);
    }

    fn draw_frame(&mut self, frame: &VideoFrame) {
        self.ops.push(DrawOp::Frame {
            sequence: frame.sequence(),
            resolution: frame.resolution(),
        });
    }

    fn stroke_rect(&mut self, bbox: &BoundingBox, line_width: u32, color: [u8; 3]) {
        self.ops.push(DrawOp::StrokeRect {
            bbox: *bbox,
            line_width,
            color,
        });
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: [u8; 3], _scale: u32) {
        self.ops.push(DrawOp::FillText {
            text: text.to_string(),
            x,
            y,
            color,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 3] = [255, 0, 0];

    #[test]
    fn frame_is_scaled_to_surface() {
        let mut surface = RasterSurface::new(Resolution::new(8, 4));
        surface.draw_frame(&VideoFrame::solid(2, 2, [10, 20, 30], 0));
        assert!(surface
            .image()
            .pixels()
            .all(|p| *p == Rgba([10, 20, 30, 255])));
    }

    #[test]
    fn stroke_rect_tolerates_degenerate_boxes() {
        let mut surface = RasterSurface::new(Resolution::new(16, 16));
        surface.stroke_rect(&BoundingBox::new(4.0, 4.0, 0.0, 0.0), 2, RED);
        surface.stroke_rect(&BoundingBox::new(-20.0, -20.0, 5.0, 5.0), 2, RED);
        surface.stroke_rect(&BoundingBox::new(10.0, 10.0, 40.0, 40.0), 2, RED);
        assert_eq!(*surface.image().get_pixel(10, 10), Rgba([255, 0, 0, 255]));
        assert_eq!(*surface.image().get_pixel(11, 11), Rgba([255, 0, 0, 255]));
        assert_eq!(*surface.image().get_pixel(12, 12), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn resize_discards_content_and_changes_digest() {
        let mut surface = RasterSurface::new(Resolution::new(4, 4));
        surface.draw_frame(&VideoFrame::solid(4, 4, [1, 1, 1], 0));
        let before = surface.digest();
        surface.resize(Resolution::new(4, 4));
        assert_eq!(surface.digest(), before);
        surface.resize(Resolution::new(6, 2));
        assert_eq!(surface.size(), Resolution::new(6, 2));
        assert_ne!(surface.digest(), before);
    }

    #[test]
    fn snapshot_writes_a_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.png");
        let mut surface = RasterSurface::new(Resolution::new(3, 3));
        surface.draw_frame(&VideoFrame::solid(3, 3, [9, 9, 9], 0));
        surface.save_png(&path).unwrap();
        let loaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(loaded.dimensions(), (3, 3));
    }
}
