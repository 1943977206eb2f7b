//! One-shot "runtime ready → model ready" sequence.
//!
//! `ModelLoader` publishes the detector handle through a watch channel. Observers
//! see `None` until the model is fully loaded, and keep seeing `None` forever if
//! either phase fails.

use std::cell::Cell;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::watch;

use crate::config::ModelSettings;
use crate::detect::{
    BackendDetector, BackendRegistry, DetectionCapability, Detector, SharedBackend, StubBackend,
};
use crate::error::{PipelineError, PipelineResult};

/// The numeric runtime a model depends on.
#[allow(async_fn_in_trait)]
pub trait NumericRuntime {
    fn name(&self) -> &str;

    /// Resolves once the runtime can execute models.
    async fn ready(&self) -> Result<()>;
}

/// Fetches and parses a model, producing a ready detector.
#[allow(async_fn_in_trait)]
pub trait ModelSource {
    type Detector: Detector;

    async fn load(&self) -> Result<Self::Detector>;
}

/// Shared, read-only detector handle.
pub type DetectorHandle<D> = Arc<D>;

pub struct ModelLoader<R, M: ModelSource> {
    runtime: R,
    source: M,
    started: Cell<bool>,
    slot: watch::Sender<Option<DetectorHandle<M::Detector>>>,
}

impl<R: NumericRuntime, M: ModelSource> ModelLoader<R, M> {
    pub fn new(runtime: R, source: M) -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            runtime,
            source,
            started: Cell::new(false),
            slot,
        }
    }

    /// Current handle, `None` until the model is loaded.
    pub fn handle(&self) -> Option<DetectorHandle<M::Detector>> {
        self.slot.borrow().clone()
    }

    /// Watch the handle slot. The value flips from `None` to `Some` at most once.
    pub fn subscribe(&self) -> watch::Receiver<Option<DetectorHandle<M::Detector>>> {
        self.slot.subscribe()
    }

    /// Run the load sequence. Only the first call does any work.
    pub async fn initialize(&self) -> PipelineResult<DetectorHandle<M::Detector>> {
        if self.started.replace(true) {
            log::warn!("model loader initialize called more than once; ignoring");
            return Err(PipelineError::AlreadyInitialized);
        }

        log::info!("waiting for {} runtime", self.runtime.name());
        if let Err(err) = self.runtime.ready().await {
            let err = PipelineError::RuntimeInit(format!("{err:#}"));
            log::error!("{}", err);
            return Err(err);
        }

        let detector = match self.source.load().await {
            Ok(detector) => Arc::new(detector),
            Err(err) => {
                let err = PipelineError::ModelLoad(format!("{err:#}"));
                log::error!("{}", err);
                return Err(err);
            }
        };

        log::info!("model loaded (backend={})", detector.name());
        self.slot.send_replace(Some(detector.clone()));
        Ok(detector)
    }
}

/// Runtime for the in-process backends: ready once the event loop has yielded.
#[derive(Clone, Debug, Default)]
pub struct HostRuntime;

impl HostRuntime {
    pub fn new() -> Self {
        Self
    }
}

impl NumericRuntime for HostRuntime {
    fn name(&self) -> &str {
        "host"
    }

    async fn ready(&self) -> Result<()> {
        let threads = std::thread::available_parallelism()
            .context("query available parallelism")?
            .get();
        tokio::task::yield_now().await;
        log::debug!("host runtime ready ({} hardware threads)", threads);
        Ok(())
    }
}

/// Builds the configured backend on the blocking pool.
#[derive(Clone, Debug)]
pub struct BackendModelSource {
    settings: ModelSettings,
}

impl BackendModelSource {
    pub fn new(settings: ModelSettings) -> Self {
        Self { settings }
    }
}

impl ModelSource for BackendModelSource {
    type Detector = BackendDetector;

    async fn load(&self) -> Result<BackendDetector> {
        let settings = self.settings.clone();
        let backend = tokio::task::spawn_blocking(move || select_backend(&settings))
            .await
            .context("model load task panicked")??;
        BackendDetector::new(backend)
    }
}

fn select_backend(settings: &ModelSettings) -> Result<SharedBackend> {
    let mut registry = available_backends(settings)?;
    log::info!("detector backends available: {}", registry.list().join(", "));
    registry
        .set_default(&settings.backend)
        .with_context(|| format!("unknown detector backend '{}'", settings.backend))?;

    let backend = registry.backend_for_capability(DetectionCapability::ObjectDetection)?;
    backend
        .lock()
        .map_err(|_| anyhow!("backend lock poisoned"))?
        .warm_up()
        .context("backend warm-up failed")?;
    Ok(backend)
}

/// Every backend this build can construct from `settings`.
fn available_backends(settings: &ModelSettings) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new());
    register_tract(&mut registry, settings)?;
    Ok(registry)
}

#[cfg(feature = "backend-tract")]
fn register_tract(registry: &mut BackendRegistry, settings: &ModelSettings) -> Result<()> {
    let Some(path) = settings.path.as_ref() else {
        if settings.backend == "tract" {
            return Err(anyhow!("the tract backend requires a model path"));
        }
        return Ok(());
    };
    let backend = match crate::detect::TractBackend::new(
        path,
        settings.input_width,
        settings.input_height,
    ) {
        Ok(backend) => backend,
        Err(err) if settings.backend == "tract" => return Err(err),
        Err(err) => {
            log::warn!("tract backend unavailable: {:#}", err);
            return Ok(());
        }
    };
    registry.register(
        backend
            .with_min_score(settings.min_score)
            .with_max_detections(settings.max_detections),
    );
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn register_tract(_registry: &mut BackendRegistry, settings: &ModelSettings) -> Result<()> {
    if settings.backend == "tract" {
        return Err(anyhow!(
            "tract backend requested but this build lacks the backend-tract feature"
        ));
    }
    Ok(())
}
