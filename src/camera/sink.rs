//! The video sink a camera stream is bound to.
//!
//! The sink owns the playback pump: a local task that moves frames from the bound
//! stream into the "current frame" slot and announces the native resolution on a
//! separate metadata channel, once when it first becomes known and again whenever
//! it changes.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::frame::{Resolution, VideoFrame};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Playback {
    Paused,
    /// `play` was requested and the first frame has not arrived yet.
    Pending,
    Playing,
}

pub struct VideoSink {
    playback: Rc<Cell<Playback>>,
    source: RefCell<Option<mpsc::Receiver<VideoFrame>>>,
    frame: Rc<watch::Sender<Option<VideoFrame>>>,
    metadata: Rc<watch::Sender<Option<Resolution>>>,
    pump: RefCell<Option<JoinHandle<()>>>,
    starts: Cell<u64>,
}

impl VideoSink {
    pub fn new() -> Self {
        let (frame, _) = watch::channel(None);
        let (metadata, _) = watch::channel(None);
        Self {
            playback: Rc::new(Cell::new(Playback::Paused)),
            source: RefCell::new(None),
            frame: Rc::new(frame),
            metadata: Rc::new(metadata),
            pump: RefCell::new(None),
            starts: Cell::new(0),
        }
    }

    /// Attach a stream's frames. Any previously bound stream is detached first.
    pub fn bind(&self, frames: mpsc::Receiver<VideoFrame>) {
        self.unbind();
        *self.source.borrow_mut() = Some(frames);
    }

    /// Start playback of the bound stream.
    ///
    /// Resolves when the first frame has arrived. A request made while a start is
    /// pending or playback is running does nothing and returns immediately.
    /// Must run inside a `LocalSet`.
    pub async fn play(&self) -> Result<()> {
        let state = self.playback.get();
        if state != Playback::Paused {
            log::debug!("play requested while {:?}; not starting again", state);
            return Ok(());
        }
        let frames = self
            .source
            .borrow_mut()
            .take()
            .ok_or_else(|| anyhow!("no stream bound to video sink"))?;

        self.playback.set(Playback::Pending);
        self.starts.set(self.starts.get() + 1);

        let (started_tx, started_rx) = oneshot::channel();
        let pump = tokio::task::spawn_local(pump(
            frames,
            self.frame.clone(),
            self.metadata.clone(),
            self.playback.clone(),
            started_tx,
        ));
        *self.pump.borrow_mut() = Some(pump);

        match started_rx.await {
            Ok(()) => Ok(()),
            Err(_) => {
                self.playback.set(Playback::Paused);
                Err(anyhow!("stream ended before delivering a frame"))
            }
        }
    }

    /// Detach the stream, stop the pump and drop the current frame.
    pub fn unbind(&self) {
        if let Some(pump) = self.pump.borrow_mut().take() {
            pump.abort();
        }
        self.source.borrow_mut().take();
        self.playback.set(Playback::Paused);
        self.frame.send_replace(None);
    }

    /// The frame currently on display, if any.
    pub fn current_frame(&self) -> Option<VideoFrame> {
        self.frame.borrow().clone()
    }

    pub fn frames(&self) -> watch::Receiver<Option<VideoFrame>> {
        self.frame.subscribe()
    }

    /// "Metadata loaded" signal: the native resolution once known.
    pub fn metadata(&self) -> watch::Receiver<Option<Resolution>> {
        self.metadata.subscribe()
    }

    pub fn native_resolution(&self) -> Option<Resolution> {
        *self.metadata.borrow()
    }

    pub fn playback(&self) -> Playback {
        self.playback.get()
    }

    /// How many times playback was actually started.
    pub fn play_starts(&self) -> u64 {
        self.starts.get()
    }
}

impl Default for VideoSink {
    fn default() -> Self {
        Self::new()
    }
}

async fn pump(
    mut frames: mpsc::Receiver<VideoFrame>,
    frame_tx: Rc<watch::Sender<Option<VideoFrame>>>,
    metadata_tx: Rc<watch::Sender<Option<Resolution>>>,
    playback: Rc<Cell<Playback>>,
    started: oneshot::Sender<()>,
) {
    let mut started = Some(started);
    while let Some(frame) = frames.recv().await {
        let resolution = frame.resolution();
        let changed = *metadata_tx.borrow() != Some(resolution);
        if changed && !resolution.is_empty() {
            log::info!("video metadata loaded: native resolution {}", resolution);
            metadata_tx.send_replace(Some(resolution));
        }
        frame_tx.send_replace(Some(frame));

        if let Some(tx) = started.take() {
            playback.set(Playback::Playing);
            let _ = tx.send(());
        }
    }

    log::info!("video stream ended");
    playback.set(Playback::Paused);
    frame_tx.send_replace(None);
}
