mod common;

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tokio::time::sleep;

use common::ScriptedDetector;
use live_overlay::camera::{FlagTrack, SyntheticCamera};
use live_overlay::overlay::{DrawOp, RecordingCanvas};
use live_overlay::{
    Canvas,
    BoundingBox, CameraAccessError, CameraBackend, CameraSource, Detection, HostCamera,
    LiveOverlay, MediaStream, ModelLoader, ModelSource, NumericRuntime, OverlayRenderer,
    RasterSurface, Resolution, SchedulerState, StreamConstraints, VideoFrame,
};

const RED: [u8; 3] = [255, 0, 0];
const PERIOD: Duration = Duration::from_millis(100);

#[derive(Default)]
struct TestRuntime {
    fail: bool,
    delay: Duration,
}

impl NumericRuntime for TestRuntime {
    fn name(&self) -> &str {
        "test"
    }

    async fn ready(&self) -> Result<()> {
        sleep(self.delay).await;
        if self.fail {
            bail!("no numeric backend available");
        }
        Ok(())
    }
}

struct FixedModel {
    detections: Vec<Detection>,
}

impl ModelSource for FixedModel {
    type Detector = ScriptedDetector;

    async fn load(&self) -> Result<ScriptedDetector> {
        Ok(ScriptedDetector::returning(self.detections.clone()))
    }
}

/// Camera that delivers one fixed frame and keeps the stream open.
struct FixedCamera {
    frame: VideoFrame,
    feed: RefCell<Option<mpsc::Sender<VideoFrame>>>,
    stopped: RefCell<Vec<Arc<AtomicBool>>>,
}

impl FixedCamera {
    fn new(frame: VideoFrame) -> Self {
        Self {
            frame,
            feed: RefCell::new(None),
            stopped: RefCell::new(Vec::new()),
        }
    }

    /// Deliver another frame on the live stream.
    fn push(&self, frame: VideoFrame) {
        let feed = self.feed.borrow();
        let feed = feed.as_ref().expect("stream acquired");
        feed.try_send(frame).expect("feed has room");
    }

    fn tracks_stopped(&self) -> Vec<bool> {
        self.stopped
            .borrow()
            .iter()
            .map(|flag| flag.load(Ordering::SeqCst))
            .collect()
    }
}

impl CameraBackend for FixedCamera {
    fn device(&self) -> &str {
        "test://fixed"
    }

    async fn request_video_stream(
        &self,
        _constraints: &StreamConstraints,
    ) -> Result<MediaStream, CameraAccessError> {
        let (track, stopped) = FlagTrack::new("test://fixed#video");
        let (tx, rx) = mpsc::channel(2);
        tx.send(self.frame.clone())
            .await
            .map_err(|_| CameraAccessError::NoDevice(self.device().to_string()))?;
        *self.feed.borrow_mut() = Some(tx);
        self.stopped.borrow_mut().push(stopped);
        Ok(MediaStream::new(vec![Arc::new(track)], rx))
    }
}

fn person() -> Detection {
    Detection::new(BoundingBox::new(10.0, 20.0, 100.0, 50.0), "person", 0.92)
}

fn overlay<B: CameraBackend + 'static>(
    runtime_fails: bool,
    camera: B,
) -> LiveOverlay<TestRuntime, FixedModel, B, RecordingCanvas> {
    overlay_with_runtime(
        TestRuntime {
            fail: runtime_fails,
            ..TestRuntime::default()
        },
        camera,
    )
}

fn overlay_with_runtime<B: CameraBackend + 'static>(
    runtime: TestRuntime,
    camera: B,
) -> LiveOverlay<TestRuntime, FixedModel, B, RecordingCanvas> {
    LiveOverlay::new(
        ModelLoader::new(
            runtime,
            FixedModel {
                detections: vec![person()],
            },
        ),
        CameraSource::new(camera, StreamConstraints::default()),
        RecordingCanvas::new(Resolution::new(640, 480)),
        OverlayRenderer::default(),
        PERIOD,
    )
}

#[tokio::test(start_paused = true)]
async fn annotates_a_live_720p_frame() {
    LocalSet::new()
        .run_until(async {
            let frame = VideoFrame::solid(1280, 720, [30, 30, 30], 1);
            let overlay = overlay(false, FixedCamera::new(frame));
            overlay.mount();
            sleep(Duration::from_millis(150)).await;

            assert_eq!(overlay.scheduler_state(), Some(SchedulerState::Armed));
            assert_eq!(overlay.loader().handle().unwrap().calls(), 1);
            assert_eq!(overlay.surface().borrow().size(), Resolution::new(1280, 720));
            assert_eq!(
                overlay.surface().borrow().ops(),
                &[
                    DrawOp::Resize(Resolution::new(1280, 720)),
                    DrawOp::Clear,
                    DrawOp::Frame {
                        sequence: 1,
                        resolution: Resolution::new(1280, 720)
                    },
                    DrawOp::StrokeRect {
                        bbox: BoundingBox::new(10.0, 20.0, 100.0, 50.0),
                        line_width: 2,
                        color: RED
                    },
                    DrawOp::FillText {
                        text: "person (92%)".to_string(),
                        x: 10.0,
                        y: 15.0,
                        color: RED
                    },
                ]
            );

            overlay.unmount();
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn denied_camera_never_reaches_the_detector() {
    LocalSet::new()
        .run_until(async {
            let overlay = overlay(false, HostCamera::for_device("stub://denied"));
            overlay.mount();
            sleep(Duration::from_millis(1000)).await;

            let detector = overlay.loader().handle().expect("model still loads");
            assert_eq!(detector.calls(), 0);
            assert!(!overlay.camera().is_live());
            assert!(overlay.surface().borrow().ops().is_empty());

            let stats = overlay.stats().unwrap();
            assert_eq!(stats.detect_calls, 0);
            assert_eq!(stats.renders, 0);
            assert_eq!(stats.skipped, stats.ticks);

            // Teardown after a failed acquisition is a no-op.
            overlay.unmount();
            overlay.unmount();
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn runtime_failure_keeps_detection_idle() {
    LocalSet::new()
        .run_until(async {
            let frame = VideoFrame::solid(320, 240, [0, 0, 0], 0);
            let overlay = overlay(true, FixedCamera::new(frame));
            overlay.mount();
            sleep(Duration::from_millis(1000)).await;

            assert!(overlay.loader().handle().is_none());
            assert_eq!(overlay.scheduler_state(), Some(SchedulerState::Idle));
            assert_eq!(overlay.stats().unwrap().ticks, 0);
            // The camera still plays and the surface still follows it.
            assert!(overlay.camera().is_live());
            assert_eq!(
                overlay.surface().borrow().ops(),
                &[DrawOp::Resize(Resolution::new(320, 240))]
            );
            overlay.unmount();
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn unmount_stops_tracks_and_rendering() {
    LocalSet::new()
        .run_until(async {
            let frame = VideoFrame::solid(64, 48, [0, 0, 0], 0);
            let overlay = overlay(false, FixedCamera::new(frame));
            overlay.mount();
            sleep(Duration::from_millis(350)).await;
            let rendered = overlay.stats().unwrap().renders;
            assert_eq!(rendered, 3);

            overlay.unmount();
            assert!(overlay.scheduler_state().is_none());
            assert!(!overlay.camera().is_live());
            assert_eq!(overlay.camera().backend().tracks_stopped(), vec![true]);
            assert!(overlay.sink().current_frame().is_none());

            let ops = overlay.surface().borrow().ops().len();
            sleep(Duration::from_millis(500)).await;
            assert_eq!(overlay.surface().borrow().ops().len(), ops);
            assert_eq!(overlay.loader().handle().unwrap().calls(), 3);

            assert_eq!(overlay.camera().release(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn second_mount_is_ignored() {
    LocalSet::new()
        .run_until(async {
            let frame = VideoFrame::solid(64, 48, [0, 0, 0], 0);
            let overlay = overlay(false, FixedCamera::new(frame));
            overlay.mount();
            overlay.mount();
            sleep(Duration::from_millis(150)).await;

            assert_eq!(overlay.sink().play_starts(), 1);
            assert_eq!(overlay.camera().track_count(), 1);
            assert_eq!(overlay.loader().handle().unwrap().calls(), 1);
            overlay.unmount();
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn synthetic_camera_drives_a_raster_surface() {
    LocalSet::new()
        .run_until(async {
            let camera = SyntheticCamera::new("stub://test");
            let constraints = StreamConstraints {
                width: 96,
                height: 64,
                target_fps: 20,
            };
            let overlay = LiveOverlay::new(
                ModelLoader::new(
                    TestRuntime::default(),
                    FixedModel {
                        detections: vec![Detection::new(
                            BoundingBox::new(4.0, 4.0, 40.0, 30.0),
                            "cat",
                            0.5,
                        )],
                    },
                ),
                CameraSource::new(camera, constraints),
                RasterSurface::new(Resolution::new(640, 480)),
                OverlayRenderer::default(),
                PERIOD,
            );
            overlay.mount();
            sleep(Duration::from_millis(250)).await;

            let surface = overlay.surface().borrow();
            assert_eq!(surface.image().dimensions(), (96, 64));
            assert_eq!(surface.image().get_pixel(4, 4).0, [255, 0, 0, 255]);
            drop(surface);
            overlay.unmount();
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn remount_after_unmount_reacquires_the_camera() {
    LocalSet::new()
        .run_until(async {
            let frame = VideoFrame::solid(64, 48, [0, 0, 0], 0);
            let overlay = overlay(false, FixedCamera::new(frame));
            overlay.mount();
            sleep(Duration::from_millis(150)).await;
            overlay.unmount();

            overlay.mount();
            sleep(Duration::from_millis(150)).await;
            assert!(overlay.camera().is_live());
            assert_eq!(
                overlay.camera().backend().tracks_stopped(),
                vec![true, false]
            );
            assert_eq!(overlay.scheduler_state(), Some(SchedulerState::Armed));
            assert_eq!(overlay.loader().handle().unwrap().calls(), 2);
            overlay.unmount();
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn surface_follows_every_resolution_change() {
    LocalSet::new()
        .run_until(async {
            let frame = VideoFrame::solid(1280, 720, [30, 30, 30], 1);
            let overlay = overlay(false, FixedCamera::new(frame));
            overlay.mount();
            sleep(Duration::from_millis(150)).await;

            overlay
                .camera()
                .backend()
                .push(VideoFrame::solid(640, 360, [30, 30, 30], 2));
            sleep(Duration::from_millis(100)).await;
            assert_eq!(overlay.surface().borrow().size(), Resolution::new(640, 360));

            let surface = overlay.surface().borrow();
            let ops = surface.ops();
            let resizes: Vec<usize> = ops
                .iter()
                .enumerate()
                .filter(|(_, op)| matches!(op, DrawOp::Resize(_)))
                .map(|(idx, _)| idx)
                .collect();
            // Each render is four ops; both resizes land outside a render.
            assert_eq!(resizes, vec![0, 5]);
            assert_eq!(ops[0], DrawOp::Resize(Resolution::new(1280, 720)));
            assert_eq!(ops[5], DrawOp::Resize(Resolution::new(640, 360)));
            assert_eq!(
                ops[7],
                DrawOp::Frame {
                    sequence: 2,
                    resolution: Resolution::new(640, 360)
                }
            );
            assert_eq!(ops.len(), 10);
            drop(surface);
            overlay.unmount();
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn remount_reuses_a_load_still_pending_at_unmount() {
    LocalSet::new()
        .run_until(async {
            let frame = VideoFrame::solid(64, 48, [0, 0, 0], 0);
            let overlay = overlay_with_runtime(
                TestRuntime {
                    delay: Duration::from_millis(200),
                    ..TestRuntime::default()
                },
                FixedCamera::new(frame),
            );
            overlay.mount();
            sleep(Duration::from_millis(50)).await;
            overlay.unmount();
            assert!(overlay.loader().handle().is_none());

            overlay.mount();
            sleep(Duration::from_millis(300)).await;
            let detector = overlay.loader().handle().expect("first load completes");
            assert_eq!(overlay.scheduler_state(), Some(SchedulerState::Armed));

            // Armed at 200 ms, first tick at 300 ms.
            assert_eq!(detector.calls(), 1);
            overlay.unmount();
        })
        .await;
}
