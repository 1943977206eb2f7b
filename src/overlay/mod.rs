//! Overlay rendering: the frame plus boxes and labels for each detection.

pub mod font;
mod renderer;
mod surface;

pub use renderer::{confidence_percent, label_anchor, label_text, OverlayRenderer, OverlayStyle};
pub use surface::{Canvas, DrawOp, RasterSurface, RecordingCanvas};
