use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use super::registry::SharedBackend;
use super::result::Detection;
use crate::error::PipelineError;
use crate::frame::VideoFrame;

/// The asynchronous detection capability the scheduler drives.
///
/// `frame` is a reference to the current video content; implementations clone the
/// handle if they need it past the first suspension point.
#[allow(async_fn_in_trait)]
pub trait Detector {
    fn name(&self) -> &str;

    async fn detect(&self, frame: &VideoFrame) -> Result<Vec<Detection>>;
}

/// Adapts a blocking `DetectorBackend` to `Detector` by running each pass on the
/// tokio blocking pool.
///
/// A backend runs one pass at a time. A call that arrives while a pass is still
/// running fails at once with `PipelineError::DetectorBusy` and never queues.
#[derive(Clone)]
pub struct BackendDetector {
    name: String,
    backend: SharedBackend,
    busy: Arc<AtomicBool>,
}

/// Clears the busy flag when the blocking pass ends, even if the caller is gone.
struct PassGuard(Arc<AtomicBool>);

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BackendDetector {
    pub fn new(backend: SharedBackend) -> Result<Self> {
        let name = backend
            .lock()
            .map_err(|_| anyhow!("backend lock poisoned"))?
            .name()
            .to_string();
        Ok(Self {
            name,
            backend,
            busy: Arc::new(AtomicBool::new(false)),
        })
    }

    /// True while a pass is running on the blocking pool.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Detector for BackendDetector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn detect(&self, frame: &VideoFrame) -> Result<Vec<Detection>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PipelineError::DetectorBusy.into());
        }
        let pass = PassGuard(self.busy.clone());
        let backend = self.backend.clone();
        let frame = frame.clone();
        tokio::task::spawn_blocking(move || {
            let _pass = pass;
            let mut guard = backend
                .lock()
                .map_err(|_| anyhow!("backend lock poisoned"))?;
            guard.detect(frame.pixels(), frame.width(), frame.height())
        })
        .await
        .context("detector task panicked")?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::detect::StubBackend;

    #[tokio::test]
    async fn backend_detector_runs_stub_passes() {
        let backend: SharedBackend = Arc::new(Mutex::new(StubBackend::new()));
        let detector = BackendDetector::new(backend).unwrap();
        assert_eq!(detector.name(), "stub");

        let dark = VideoFrame::solid(8, 8, [0, 0, 0], 0);
        let bright = VideoFrame::solid(8, 8, [255, 255, 255], 1);
        assert!(detector.detect(&dark).await.unwrap().is_empty());

        let detections = detector.detect(&bright).await.unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox.width, 8.0);
        assert_eq!(detections[0].confidence, 1.0);
    }

    struct Broken;

    impl crate::detect::DetectorBackend for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn supports(&self, _capability: crate::detect::DetectionCapability) -> bool {
            true
        }

        fn detect(&mut self, _pixels: &[u8], _w: u32, _h: u32) -> Result<Vec<Detection>> {
            Err(anyhow!("session lost"))
        }
    }

    #[tokio::test]
    async fn backend_errors_surface_to_caller() {
        let backend: SharedBackend = Arc::new(Mutex::new(Broken));
        let detector = BackendDetector::new(backend).unwrap();
        let frame = VideoFrame::solid(4, 4, [0, 0, 0], 0);
        let err = detector.detect(&frame).await.unwrap_err();
        assert!(err.to_string().contains("session lost"));
        assert!(!detector.is_busy());
    }

    struct Gate(std::sync::mpsc::Receiver<()>);

    impl crate::detect::DetectorBackend for Gate {
        fn name(&self) -> &'static str {
            "gate"
        }

        fn supports(&self, _capability: crate::detect::DetectionCapability) -> bool {
            true
        }

        fn detect(&mut self, _pixels: &[u8], _w: u32, _h: u32) -> Result<Vec<Detection>> {
            self.0.recv().map_err(|_| anyhow!("gate dropped"))?;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn overlapping_call_is_rejected_while_a_pass_runs() {
        let (open, gate) = std::sync::mpsc::channel();
        let backend: SharedBackend = Arc::new(Mutex::new(Gate(gate)));
        let detector = BackendDetector::new(backend).unwrap();
        let frame = VideoFrame::solid(4, 4, [0, 0, 0], 0);

        let first = tokio::spawn({
            let detector = detector.clone();
            let frame = frame.clone();
            async move { detector.detect(&frame).await }
        });
        while !detector.is_busy() {
            tokio::task::yield_now().await;
        }

        let err = detector.detect(&frame).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::DetectorBusy)
        ));

        open.send(()).unwrap();
        assert!(first.await.unwrap().unwrap().is_empty());
        assert!(!detector.is_busy());

        // The next pass reaches the backend again.
        drop(open);
        let err = detector.detect(&frame).await.unwrap_err();
        assert!(err.to_string().contains("gate dropped"));
    }
}
