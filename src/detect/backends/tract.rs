#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::labels::coco_label;
use crate::detect::result::{non_max_suppression, BoundingBox, Detection};

pub const DEFAULT_MIN_SCORE: f32 = 0.5;
pub const DEFAULT_MAX_DETECTIONS: usize = 20;
const NMS_IOU_THRESHOLD: f32 = 0.5;

/// Tract-based backend for SSD-style ONNX detectors.
///
/// Expected outputs: boxes `[1, N, 4]` as normalized `ymin, xmin, ymax, xmax`,
/// COCO class ids `[1, N]` and scores `[1, N]`.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    min_score: f32,
    max_detections: usize,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            min_score: DEFAULT_MIN_SCORE,
            max_detections: DEFAULT_MAX_DETECTIONS,
        })
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = max_detections;
        self
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let frame = RgbImage::from_raw(width, height, pixels.to_vec()).ok_or_else(|| {
            anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                width as usize * height as usize * 3,
                width,
                height,
                pixels.len()
            )
        })?;
        let resized = if (width, height) == (self.width, self.height) {
            frame
        } else {
            imageops::resize(&frame, self.width, self.height, FilterType::Triangle)
        };

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32).0[channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, width: u32, height: u32) -> Result<Vec<Detection>> {
        if outputs.len() < 3 {
            return Err(anyhow!(
                "expected boxes, classes and scores outputs, model produced {}",
                outputs.len()
            ));
        }
        let boxes = flatten_f32(&outputs[0]).context("boxes output")?;
        let classes = flatten_f32(&outputs[1]).context("classes output")?;
        let scores = flatten_f32(&outputs[2]).context("scores output")?;

        let count = scores.len().min(classes.len()).min(boxes.len() / 4);
        let (fw, fh) = (width as f32, height as f32);
        let candidates = (0..count)
            .filter(|&i| scores[i] >= self.min_score)
            .map(|i| {
                let b = &boxes[i * 4..i * 4 + 4];
                let (ymin, xmin) = (b[0].clamp(0.0, 1.0), b[1].clamp(0.0, 1.0));
                let (ymax, xmax) = (b[2].clamp(0.0, 1.0), b[3].clamp(0.0, 1.0));
                Detection::new(
                    BoundingBox::new(xmin * fw, ymin * fh, (xmax - xmin) * fw, (ymax - ymin) * fh),
                    coco_label(classes[i].round() as u32),
                    scores[i],
                )
            })
            .collect();

        Ok(non_max_suppression(
            candidates,
            NMS_IOU_THRESHOLD,
            self.max_detections,
        ))
    }
}

fn flatten_f32(value: &TValue) -> Result<Vec<f32>> {
    let tensor = value
        .cast_to::<f32>()
        .context("output tensor is not numeric")?;
    let view = tensor
        .to_array_view::<f32>()
        .context("output tensor was not f32")?;
    Ok(view.iter().copied().collect())
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::ObjectDetection)
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, width, height)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = vec![0u8; self.width as usize * self.height as usize * 3];
        self.detect(&blank, self.width, self.height).map(|_| ())
    }
}
