use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::{Resolution, DEFAULT_DISPLAY_HEIGHT, DEFAULT_DISPLAY_WIDTH};

pub const CONFIG_ENV: &str = "LIVE_OVERLAY_CONFIG";

const DEFAULT_CAMERA_DEVICE: &str = "stub://camera";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_MODEL_INPUT: u32 = 300;
const DEFAULT_MIN_SCORE: f32 = 0.5;
const DEFAULT_MAX_DETECTIONS: usize = 20;
const DEFAULT_INTERVAL_MS: u64 = 100;
const DEFAULT_LINE_WIDTH: u32 = 2;
const DEFAULT_COLOR: &str = "red";
const DEFAULT_FONT_SCALE: u32 = 1;

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    camera: Option<CameraConfigFile>,
    model: Option<ModelConfigFile>,
    scheduler: Option<SchedulerConfigFile>,
    display: Option<DisplayConfigFile>,
    overlay: Option<StyleConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    backend: Option<String>,
    path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    min_score: Option<f32>,
    max_detections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SchedulerConfigFile {
    interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct StyleConfigFile {
    line_width: Option<u32>,
    stroke_color: Option<String>,
    label_color: Option<String>,
    font_scale: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub camera: CameraSettings,
    pub model: ModelSettings,
    pub interval: Duration,
    /// Initial surface size, replaced by the stream's native resolution.
    pub display: Resolution,
    pub style: StyleSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub backend: String,
    pub path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub min_score: f32,
    pub max_detections: usize,
}

#[derive(Debug, Clone)]
pub struct StyleSettings {
    pub line_width: u32,
    pub stroke_color: String,
    pub label_color: String,
    pub font_scale: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device: DEFAULT_CAMERA_DEVICE.to_string(),
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            target_fps: DEFAULT_CAMERA_FPS,
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            path: None,
            input_width: DEFAULT_MODEL_INPUT,
            input_height: DEFAULT_MODEL_INPUT,
            min_score: DEFAULT_MIN_SCORE,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

impl Default for StyleSettings {
    fn default() -> Self {
        Self {
            line_width: DEFAULT_LINE_WIDTH,
            stroke_color: DEFAULT_COLOR.to_string(),
            label_color: DEFAULT_COLOR.to_string(),
            font_scale: DEFAULT_FONT_SCALE,
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            camera: CameraSettings::default(),
            model: ModelSettings::default(),
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            display: Resolution::new(DEFAULT_DISPLAY_WIDTH, DEFAULT_DISPLAY_HEIGHT),
            style: StyleSettings::default(),
        }
    }
}

impl OverlayConfig {
    /// Load from the file named by `LIVE_OVERLAY_CONFIG` (if any), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like `load`, with an explicit file path taking precedence over the env var.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let file_cfg = match path.or(env_path.as_deref()) {
            Some(path) => read_config_file(path)?,
            None => OverlayConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: OverlayConfigFile) -> Self {
        let defaults = Self::default();
        let camera = file.camera.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let display = file.display.unwrap_or_default();
        let style = file.overlay.unwrap_or_default();

        Self {
            camera: CameraSettings {
                device: camera.device.unwrap_or(defaults.camera.device),
                width: camera.width.unwrap_or(defaults.camera.width),
                height: camera.height.unwrap_or(defaults.camera.height),
                target_fps: camera.target_fps.unwrap_or(defaults.camera.target_fps),
            },
            model: ModelSettings {
                backend: model.backend.unwrap_or(defaults.model.backend),
                path: model.path,
                input_width: model.input_width.unwrap_or(defaults.model.input_width),
                input_height: model.input_height.unwrap_or(defaults.model.input_height),
                min_score: model.min_score.unwrap_or(defaults.model.min_score),
                max_detections: model
                    .max_detections
                    .unwrap_or(defaults.model.max_detections),
            },
            interval: file
                .scheduler
                .and_then(|scheduler| scheduler.interval_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            display: Resolution::new(
                display.width.unwrap_or(defaults.display.width),
                display.height.unwrap_or(defaults.display.height),
            ),
            style: StyleSettings {
                line_width: style.line_width.unwrap_or(defaults.style.line_width),
                stroke_color: style.stroke_color.unwrap_or(defaults.style.stroke_color),
                label_color: style.label_color.unwrap_or(defaults.style.label_color),
                font_scale: style.font_scale.unwrap_or(defaults.style.font_scale),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("LIVE_OVERLAY_CAMERA") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(backend) = std::env::var("LIVE_OVERLAY_BACKEND") {
            if !backend.trim().is_empty() {
                self.model.backend = backend.trim().to_lowercase();
            }
        }
        if let Ok(path) = std::env::var("LIVE_OVERLAY_MODEL") {
            if !path.trim().is_empty() {
                self.model.path = Some(PathBuf::from(path));
            }
        }
        if let Ok(interval) = std::env::var("LIVE_OVERLAY_INTERVAL_MS") {
            let ms: u64 = interval.parse().map_err(|_| {
                anyhow!("LIVE_OVERLAY_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.interval = Duration::from_millis(ms);
        }
        Ok(())
    }

    /// Check invariants. Also called by the binary after CLI overrides.
    pub fn validate(&mut self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(anyhow!("detection interval must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be >= 1"));
        }
        if self.display.is_empty() {
            return Err(anyhow!("display resolution must be non-zero"));
        }
        if self.style.line_width == 0 {
            return Err(anyhow!("overlay line_width must be >= 1"));
        }
        if self.style.font_scale == 0 {
            return Err(anyhow!("overlay font_scale must be >= 1"));
        }
        parse_color(&self.style.stroke_color)?;
        parse_color(&self.style.label_color)?;

        self.model.backend = self.model.backend.trim().to_lowercase();
        if !(0.0..=1.0).contains(&self.model.min_score) {
            return Err(anyhow!("model min_score must be within [0, 1]"));
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(anyhow!("model input size must be non-zero"));
        }
        if self.model.backend == "tract" && self.model.path.is_none() {
            return Err(anyhow!("the tract backend requires a model path"));
        }
        Ok(())
    }
}

/// Parse `#rrggbb`, `rrggbb` or one of a few colour names.
pub fn parse_color(value: &str) -> Result<[u8; 3]> {
    let value = value.trim();
    let named = match value.to_lowercase().as_str() {
        "red" => Some([255, 0, 0]),
        "green" => Some([0, 255, 0]),
        "blue" => Some([0, 0, 255]),
        "yellow" => Some([255, 255, 0]),
        "white" => Some([255, 255, 255]),
        _ => None,
    };
    if let Some(rgb) = named {
        return Ok(rgb);
    }
    let digits = value.strip_prefix('#').unwrap_or(value);
    let bytes = hex::decode(digits).map_err(|e| anyhow!("invalid colour {value:?}: {e}"))?;
    match bytes.as_slice() {
        [r, g, b] => Ok([*r, *g, *b]),
        _ => Err(anyhow!("invalid colour {value:?}: expected 6 hex digits")),
    }
}

fn read_config_file(path: &Path) -> Result<OverlayConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    }
}
