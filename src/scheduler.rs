//! Periodic detection driver.
//!
//! The scheduler sits idle until the detector slot holds a model, then ticks at a
//! fixed period. Every tick that finds a non-empty frame on the sink starts one
//! detect call as its own local task and renders that frame with the result.
//! Calls may overlap: a slow detector never delays or cancels later ticks. A
//! detector that reports `PipelineError::DetectorBusy` drops that tick's update.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::camera::VideoSink;
use crate::detect::Detector;
use crate::error::PipelineError;
use crate::overlay::{Canvas, OverlayRenderer};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    /// No detector yet.
    Idle,
    /// Timer running.
    Armed,
    Stopped,
}

/// Point-in-time copy of the scheduler counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub detect_calls: u64,
    /// Ticks that found no frame, a frame with a zero dimension, or a busy detector.
    pub skipped: u64,
    pub failures: u64,
    pub renders: u64,
    pub in_flight: u64,
}

#[derive(Default)]
struct Counters {
    ticks: Cell<u64>,
    detect_calls: Cell<u64>,
    skipped: Cell<u64>,
    failures: Cell<u64>,
    renders: Cell<u64>,
    in_flight: Cell<u64>,
}

impl Counters {
    fn bump(cell: &Cell<u64>) {
        cell.set(cell.get() + 1);
    }

    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            ticks: self.ticks.get(),
            detect_calls: self.detect_calls.get(),
            skipped: self.skipped.get(),
            failures: self.failures.get(),
            renders: self.renders.get(),
            in_flight: self.in_flight.get(),
        }
    }
}

/// Decrements the in-flight count when a tick task finishes or is aborted.
struct InFlight(Rc<Counters>);

impl InFlight {
    fn enter(counters: Rc<Counters>) -> Self {
        Counters::bump(&counters.in_flight);
        Self(counters)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let in_flight = &self.0.in_flight;
        in_flight.set(in_flight.get().saturating_sub(1));
    }
}

pub struct DetectionScheduler<D, C> {
    period: Duration,
    detector: watch::Receiver<Option<Arc<D>>>,
    sink: Rc<VideoSink>,
    surface: Rc<RefCell<C>>,
    renderer: Rc<OverlayRenderer>,
}

impl<D, C> DetectionScheduler<D, C>
where
    D: Detector + 'static,
    C: Canvas + 'static,
{
    pub fn new(
        period: Duration,
        detector: watch::Receiver<Option<Arc<D>>>,
        sink: Rc<VideoSink>,
        surface: Rc<RefCell<C>>,
        renderer: Rc<OverlayRenderer>,
    ) -> Self {
        Self {
            period,
            detector,
            sink,
            surface,
            renderer,
        }
    }

    /// Start the scheduler on the current `LocalSet`.
    pub fn spawn(self) -> SchedulerHandle {
        let state = Rc::new(Cell::new(SchedulerState::Idle));
        let counters = Rc::new(Counters::default());
        let task = tokio::task::spawn_local(self.run(state.clone(), counters.clone()));
        SchedulerHandle {
            state,
            counters,
            task,
        }
    }

    async fn run(mut self, state: Rc<Cell<SchedulerState>>, counters: Rc<Counters>) {
        let mut detector = loop {
            if let Some(detector) = self.detector.borrow_and_update().clone() {
                break detector;
            }
            if self.detector.changed().await.is_err() {
                log::debug!("detector slot closed before a model loaded; staying idle");
                return;
            }
        };

        let mut tasks = JoinSet::new();
        let mut slot_open = true;
        'arm: loop {
            state.set(SchedulerState::Armed);
            log::info!(
                "detection armed: {} every {} ms",
                detector.name(),
                self.period.as_millis()
            );
            let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick(&detector, &mut tasks, &state, &counters);
                    }
                    changed = self.detector.changed(), if slot_open => match changed {
                        Ok(()) => {
                            let next = self.detector.borrow_and_update().clone();
                            if let Some(next) = next {
                                if !Arc::ptr_eq(&next, &detector) {
                                    detector = next;
                                    continue 'arm;
                                }
                            }
                        }
                        Err(_) => slot_open = false,
                    },
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        if let Err(err) = joined {
                            if err.is_panic() {
                                log::error!("detection tick task panicked: {}", err);
                            }
                        }
                    }
                }
            }
        }
    }

    fn tick(
        &self,
        detector: &Arc<D>,
        tasks: &mut JoinSet<()>,
        state: &Rc<Cell<SchedulerState>>,
        counters: &Rc<Counters>,
    ) {
        Counters::bump(&counters.ticks);
        let Some(frame) = self
            .sink
            .current_frame()
            .filter(|frame| !frame.resolution().is_empty())
        else {
            Counters::bump(&counters.skipped);
            return;
        };

        Counters::bump(&counters.detect_calls);
        let guard = InFlight::enter(counters.clone());
        let detector = detector.clone();
        let surface = self.surface.clone();
        let renderer = self.renderer.clone();
        let state = state.clone();
        let counters = counters.clone();
        tasks.spawn_local(async move {
            let _guard = guard;
            let detections = match detector.detect(&frame).await {
                Ok(detections) => detections,
                Err(err)
                    if matches!(
                        err.downcast_ref::<PipelineError>(),
                        Some(PipelineError::DetectorBusy)
                    ) =>
                {
                    log::trace!("frame {}: {}", frame.sequence(), err);
                    Counters::bump(&counters.skipped);
                    return;
                }
                Err(err) => {
                    let err = PipelineError::DetectionCall(format!("{err:#}"));
                    log::warn!("frame {}: {}", frame.sequence(), err);
                    Counters::bump(&counters.failures);
                    Vec::new()
                }
            };
            if state.get() == SchedulerState::Stopped {
                return;
            }
            renderer.render(&mut *surface.borrow_mut(), &frame, &detections);
            Counters::bump(&counters.renders);
            log::trace!(
                "frame {} rendered {} ms after capture",
                frame.sequence(),
                frame.age_ms()
            );
        });
    }
}

/// Controls a spawned scheduler. Dropping the handle stops it.
pub struct SchedulerHandle {
    state: Rc<Cell<SchedulerState>>,
    counters: Rc<Counters>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn state(&self) -> SchedulerState {
        self.state.get()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.counters.snapshot()
    }

    /// Cancel the timer and every in-flight tick. Nothing renders after this
    /// returns.
    pub fn stop(&self) {
        if self.state.replace(SchedulerState::Stopped) != SchedulerState::Stopped {
            self.task.abort();
            log::debug!("detection scheduler stopped: {:?}", self.counters.snapshot());
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
