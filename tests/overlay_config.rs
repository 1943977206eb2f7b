use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use live_overlay::config::{OverlayConfig, CONFIG_ENV};
use live_overlay::Resolution;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        CONFIG_ENV,
        "LIVE_OVERLAY_CAMERA",
        "LIVE_OVERLAY_BACKEND",
        "LIVE_OVERLAY_MODEL",
        "LIVE_OVERLAY_INTERVAL_MS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_from_env_path_with_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r##"{
        "camera": { "device": "/dev/video2", "width": 1280, "height": 720, "target_fps": 15 },
        "model": { "backend": "stub", "min_score": 0.6, "max_detections": 5 },
        "scheduler": { "interval_ms": 250 },
        "display": { "width": 320, "height": 240 },
        "overlay": { "line_width": 3, "stroke_color": "#00ff00", "font_scale": 2 }
    }"##;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var(CONFIG_ENV, file.path());
    std::env::set_var("LIVE_OVERLAY_CAMERA", "stub://porch");
    std::env::set_var("LIVE_OVERLAY_INTERVAL_MS", "50");

    let cfg = OverlayConfig::load().expect("load config");

    assert_eq!(cfg.camera.device, "stub://porch");
    assert_eq!(cfg.camera.width, 1280);
    assert_eq!(cfg.camera.height, 720);
    assert_eq!(cfg.camera.target_fps, 15);
    assert_eq!(cfg.model.backend, "stub");
    assert_eq!(cfg.model.max_detections, 5);
    assert!((cfg.model.min_score - 0.6).abs() < f32::EPSILON);
    assert_eq!(cfg.interval, Duration::from_millis(50));
    assert_eq!(cfg.display, Resolution::new(320, 240));
    assert_eq!(cfg.style.line_width, 3);
    assert_eq!(cfg.style.stroke_color, "#00ff00");
    assert_eq!(cfg.style.label_color, "red");
    assert_eq!(cfg.style.font_scale, 2);

    clear_env();
}

#[test]
fn loads_toml_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("overlay.toml");
    std::fs::write(
        &path,
        r#"
[camera]
device = "stub://garage"

[scheduler]
interval_ms = 200

[overlay]
label_color = "yellow"
"#,
    )
    .expect("write config");

    let cfg = OverlayConfig::load_from(Some(&path)).expect("load config");
    assert_eq!(cfg.camera.device, "stub://garage");
    assert_eq!(cfg.camera.width, 640);
    assert_eq!(cfg.interval, Duration::from_millis(200));
    assert_eq!(cfg.style.label_color, "yellow");
    assert_eq!(cfg.style.stroke_color, "red");
}

#[test]
fn defaults_apply_without_a_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = OverlayConfig::load().expect("load defaults");
    assert_eq!(cfg.camera.device, "stub://camera");
    assert_eq!(cfg.interval, Duration::from_millis(100));
    assert_eq!(cfg.display, Resolution::new(640, 480));
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LIVE_OVERLAY_INTERVAL_MS", "soon");
    assert!(OverlayConfig::load().is_err());

    std::env::set_var("LIVE_OVERLAY_INTERVAL_MS", "0");
    assert!(OverlayConfig::load().is_err());
    std::env::remove_var("LIVE_OVERLAY_INTERVAL_MS");

    std::env::set_var("LIVE_OVERLAY_BACKEND", "tract");
    let err = OverlayConfig::load().unwrap_err();
    assert!(err.to_string().contains("model path"));

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(b"{ not json").expect("write config");
    std::env::remove_var("LIVE_OVERLAY_BACKEND");
    assert!(OverlayConfig::load_from(Some(file.path())).is_err());

    clear_env();
}
