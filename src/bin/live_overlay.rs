//! live-overlay - live camera feed annotated with object detections
//!
//! Mounts the overlay pipeline on a single-threaded event loop, periodically
//! writes the drawing surface to a PNG snapshot and logs scheduler stats, and
//! unmounts cleanly on Ctrl-C or when `--seconds` elapses.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::LocalSet;
use tokio::time::{self, Instant, MissedTickBehavior};

use live_overlay::ui::{Ui, UiMode};
use live_overlay::{
    BackendModelSource, CameraSource, HostCamera, HostRuntime, LiveOverlay, ModelLoader,
    OverlayConfig, OverlayRenderer, OverlayStyle, RasterSurface, StreamConstraints,
};

type HostOverlay = LiveOverlay<HostRuntime, BackendModelSource, HostCamera, RasterSurface>;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML by .toml extension).
    #[arg(long, env = "LIVE_OVERLAY_CONFIG")]
    config: Option<PathBuf>,
    /// Camera device: /dev/videoN, or stub://<name> for the synthetic camera.
    #[arg(long)]
    camera: Option<String>,
    /// Detector backend (stub, tract).
    #[arg(long)]
    backend: Option<String>,
    /// Model file for the tract backend.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Detection period in milliseconds.
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Stop after this many seconds (runs until Ctrl-C otherwise).
    #[arg(long)]
    seconds: Option<u64>,
    /// Write the drawing surface to this PNG periodically and on exit.
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Snapshot and stats period in milliseconds.
    #[arg(long, default_value_t = 1000)]
    snapshot_every_ms: u64,
    /// Output mode: auto, plain, pretty.
    #[arg(long, value_enum, default_value_t = UiMode::Auto, value_name = "MODE")]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = Ui::new(args.ui, std::io::stderr().is_terminal());

    let config = {
        let _stage = ui.stage("Load configuration");
        load_config(&args)?
    };
    log::info!(
        "live-overlay {} camera={} backend={} interval={}ms",
        live_overlay::VERSION,
        config.camera.device,
        config.model.backend,
        config.interval.as_millis()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(true);
    })
    .context("error setting Ctrl-C handler")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build event loop")?;
    LocalSet::new().block_on(&runtime, run(config, &args, &ui, shutdown_rx))
}

fn load_config(args: &Args) -> Result<OverlayConfig> {
    let mut config = OverlayConfig::load_from(args.config.as_deref())?;
    if let Some(camera) = &args.camera {
        config.camera.device = camera.clone();
    }
    if let Some(backend) = &args.backend {
        config.model.backend = backend.clone();
    }
    if let Some(model) = &args.model {
        config.model.path = Some(model.clone());
    }
    if let Some(ms) = args.interval_ms {
        config.interval = Duration::from_millis(ms);
    }
    config.validate()?;
    Ok(config)
}

async fn run(
    config: OverlayConfig,
    args: &Args,
    ui: &Ui,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let overlay: HostOverlay = LiveOverlay::new(
        ModelLoader::new(
            HostRuntime::new(),
            BackendModelSource::new(config.model.clone()),
        ),
        CameraSource::new(
            HostCamera::for_device(&config.camera.device),
            StreamConstraints::from(&config.camera),
        ),
        RasterSurface::new(config.display),
        OverlayRenderer::new(OverlayStyle::from_settings(&config.style)?),
        config.interval,
    );

    {
        let stage = ui.stage("Mount live overlay");
        overlay.mount();
        stage.progress("waiting for model");
        let mut detector = overlay.loader().subscribe();
        // Give setup a bounded window to report; failures are already logged.
        let _ = time::timeout(Duration::from_secs(5), detector.wait_for(Option::is_some)).await;
    }

    let deadline = args
        .seconds
        .map(|seconds| Instant::now() + Duration::from_secs(seconds));
    let period = Duration::from_millis(args.snapshot_every_ms.max(1));
    let mut report = time::interval_at(Instant::now() + period, period);
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    log::info!("shutdown signal received, unmounting...");
                    break;
                }
            }
            _ = until(deadline) => {
                log::info!("run time elapsed, unmounting...");
                break;
            }
            _ = report.tick() => {
                report_progress(&overlay, args.snapshot.as_deref());
            }
        }
    }

    overlay.unmount();
    if let Some(path) = &args.snapshot {
        save_snapshot(&overlay, path)?;
        log::info!("final snapshot written to {}", path.display());
    }
    Ok(())
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn report_progress(overlay: &HostOverlay, snapshot: Option<&Path>) {
    if let Some(stats) = overlay.stats() {
        log::info!(
            "ticks={} detect_calls={} skipped={} failures={} renders={} in_flight={} camera_live={}",
            stats.ticks,
            stats.detect_calls,
            stats.skipped,
            stats.failures,
            stats.renders,
            stats.in_flight,
            overlay.camera().is_live()
        );
    }
    if let Some(path) = snapshot {
        if let Err(err) = save_snapshot(overlay, path) {
            log::warn!("{:#}", err);
        }
    }
}

fn save_snapshot(overlay: &HostOverlay, path: &Path) -> Result<()> {
    let surface = overlay.surface().borrow();
    surface.save_png(path)?;
    log::debug!("snapshot {} digest={}", path.display(), surface.digest());
    Ok(())
}
