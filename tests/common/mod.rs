#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::time::Duration;

use anyhow::{bail, Result};

use live_overlay::{Detection, Detector, VideoFrame};

/// Detector double: records every call and answers with a fixed result after an
/// optional delay.
#[derive(Default)]
pub struct ScriptedDetector {
    pub delay: Duration,
    pub fail: bool,
    pub result: Vec<Detection>,
    calls: Cell<usize>,
    active: Cell<usize>,
    peak: Cell<usize>,
    seen: RefCell<Vec<u64>>,
}

impl ScriptedDetector {
    pub fn returning(result: Vec<Detection>) -> Self {
        Self {
            result,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// Most calls that were awaiting at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.get()
    }

    /// Frame sequence numbers in call order.
    pub fn frames_seen(&self) -> Vec<u64> {
        self.seen.borrow().clone()
    }
}

impl Detector for ScriptedDetector {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn detect(&self, frame: &VideoFrame) -> Result<Vec<Detection>> {
        self.calls.set(self.calls.get() + 1);
        self.seen.borrow_mut().push(frame.sequence());
        self.active.set(self.active.get() + 1);
        self.peak.set(self.peak.get().max(self.active.get()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.set(self.active.get() - 1);
        if self.fail {
            bail!("inference failed");
        }
        Ok(self.result.clone())
    }
}
