//! The owning context that wires loader, camera, surface and scheduler together.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::camera::{CameraBackend, CameraSource, VideoSink};
use crate::frame::Resolution;
use crate::model::{ModelLoader, ModelSource, NumericRuntime};
use crate::overlay::{Canvas, OverlayRenderer};
use crate::scheduler::{DetectionScheduler, SchedulerHandle, SchedulerState, SchedulerStats};

/// A mounted live overlay.
///
/// `mount` starts three independent local tasks (model load, camera acquire,
/// resize watcher) plus the detection scheduler; `unmount` stops the scheduler
/// before releasing the camera. Both must run inside a `LocalSet`.
///
/// The model loads once per `LiveOverlay`. A load still pending at `unmount`
/// keeps running so a later `mount` picks up its detector.
pub struct LiveOverlay<R, M: ModelSource, B, C> {
    loader: Rc<ModelLoader<R, M>>,
    camera: Rc<CameraSource<B>>,
    sink: Rc<VideoSink>,
    surface: Rc<RefCell<C>>,
    renderer: Rc<OverlayRenderer>,
    period: Duration,
    scheduler: RefCell<Option<SchedulerHandle>>,
    load: RefCell<Option<JoinHandle<()>>>,
    acquire: RefCell<Option<JoinHandle<()>>>,
}

impl<R, M, B, C> LiveOverlay<R, M, B, C>
where
    R: NumericRuntime + 'static,
    M: ModelSource + 'static,
    B: CameraBackend + 'static,
    C: Canvas + 'static,
{
    pub fn new(
        loader: ModelLoader<R, M>,
        camera: CameraSource<B>,
        surface: C,
        renderer: OverlayRenderer,
        period: Duration,
    ) -> Self {
        Self {
            loader: Rc::new(loader),
            camera: Rc::new(camera),
            sink: Rc::new(VideoSink::new()),
            surface: Rc::new(RefCell::new(surface)),
            renderer: Rc::new(renderer),
            period,
            scheduler: RefCell::new(None),
            load: RefCell::new(None),
            acquire: RefCell::new(None),
        }
    }

    pub fn mount(&self) {
        if self.scheduler.borrow().is_some() {
            log::warn!("live overlay already mounted");
            return;
        }
        log::info!("mounting live overlay");
        self.camera.reopen();

        if self.load.borrow().is_none() {
            let loader = self.loader.clone();
            let load = tokio::task::spawn_local(async move {
                // Failures are logged inside the loader; the scheduler stays idle.
                let _ = loader.initialize().await;
            });
            *self.load.borrow_mut() = Some(load);
        }

        let camera = self.camera.clone();
        let sink = self.sink.clone();
        let surface = self.surface.clone();
        let acquire = tokio::task::spawn_local(async move {
            let mut metadata = sink.metadata();
            if camera.acquire(&sink).await.is_err() {
                return;
            }
            watch_resolution(&mut metadata, &surface).await;
        });

        *self.acquire.borrow_mut() = Some(acquire);

        let scheduler = DetectionScheduler::new(
            self.period,
            self.loader.subscribe(),
            self.sink.clone(),
            self.surface.clone(),
            self.renderer.clone(),
        );
        *self.scheduler.borrow_mut() = Some(scheduler.spawn());
    }

    /// Stop detection, cancel a pending camera acquisition and release the
    /// camera. Safe to call at any point, including before `mount` or more than
    /// once.
    pub fn unmount(&self) {
        if let Some(scheduler) = self.scheduler.borrow_mut().take() {
            scheduler.stop();
            log::info!("detection stopped: {:?}", scheduler.stats());
        }
        if let Some(acquire) = self.acquire.borrow_mut().take() {
            acquire.abort();
        }
        self.camera.release();
        self.sink.unbind();
    }

    pub fn loader(&self) -> &ModelLoader<R, M> {
        &self.loader
    }

    pub fn camera(&self) -> &CameraSource<B> {
        &self.camera
    }

    pub fn sink(&self) -> &VideoSink {
        &self.sink
    }

    pub fn surface(&self) -> &RefCell<C> {
        &self.surface
    }

    pub fn scheduler_state(&self) -> Option<SchedulerState> {
        self.scheduler.borrow().as_ref().map(SchedulerHandle::state)
    }

    pub fn stats(&self) -> Option<SchedulerStats> {
        self.scheduler.borrow().as_ref().map(SchedulerHandle::stats)
    }
}

impl<R, M: ModelSource, B, C> Drop for LiveOverlay<R, M, B, C> {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.get_mut().take() {
            scheduler.stop();
        }
        for task in [self.load.get_mut().take(), self.acquire.get_mut().take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}

/// Resize the surface to every native resolution the sink announces.
async fn watch_resolution<C: Canvas>(
    metadata: &mut watch::Receiver<Option<Resolution>>,
    surface: &RefCell<C>,
) {
    loop {
        let announced = *metadata.borrow_and_update();
        if let Some(resolution) = announced {
            let mut surface = surface.borrow_mut();
            if surface.size() != resolution {
                log::info!("resizing surface {} -> {}", surface.size(), resolution);
                surface.resize(resolution);
            }
        }
        if metadata.changed().await.is_err() {
            return;
        }
    }
}
