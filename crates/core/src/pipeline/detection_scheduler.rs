use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::{Receiver, Sender};
use uuid::Uuid;

use crate::capture::domain::camera::Camera;
use crate::detection::domain::coordinate_transform::{
    fit_to_viewport, is_face_large_enough, select_largest_face, to_display_rect,
};
use crate::detection::domain::face_detector::FaceDetector;
use crate::feedback::domain::sound_player::{Sound, SoundPlayer};
use crate::imaging::domain::image_operator::ImageOperator;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::process_crop_use_case::{CropConfig, ProcessCropUseCase};
use crate::recognition::domain::network_session::{
    NetworkSession, RequestFraming, SessionOutput,
};
use crate::recognition::domain::recognition_response::ResponseClassifier;
use crate::recognition::domain::recognition_state_machine::{
    RecognitionOutcome, RecognitionState, RecognitionStateMachine, RecognitionTimings,
};
use crate::recognition::domain::recognition_transport::{RecognitionTransport, TransportEvent};
use crate::shared::face_box::{DisplayRect, FaceBox};
use crate::shared::frame::Frame;
use crate::shared::settings::RecognitionSettings;
use crate::storage::domain::crop_history::{CropHistory, CropPreview, PreviewResolution};
use crate::storage::domain::file_storage::FileStorage;
use crate::storage::domain::preview_sweeper::PreviewSweeper;

/// Control messages accepted by a running scheduler.
#[derive(Clone, Debug, PartialEq)]
pub enum SchedulerCommand {
    /// Run a detection cycle now instead of waiting for the next tick.
    /// Still gated by the recognition state machine.
    TriggerNow,
    /// Pause detection entirely (inspection view open).
    Suspend,
    Resume,
    SetViewport(f64, f64),
    Stop,
}

/// Cloneable remote control for a [`DetectionScheduler`].
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Returns false once the scheduler is gone.
    pub fn send(&self, command: SchedulerCommand) -> bool {
        self.tx.send(command).is_ok()
    }

    pub fn trigger_now(&self) -> bool {
        self.send(SchedulerCommand::TriggerNow)
    }

    pub fn suspend(&self) -> bool {
        self.send(SchedulerCommand::Suspend)
    }

    pub fn resume(&self) -> bool {
        self.send(SchedulerCommand::Resume)
    }

    pub fn set_viewport(&self, width: f64, height: f64) -> bool {
        self.send(SchedulerCommand::SetViewport(width, height))
    }

    pub fn stop(&self) -> bool {
        self.send(SchedulerCommand::Stop)
    }
}

/// What a single detection attempt did.
#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    Suspended,
    /// Automatic triggering is off until the current recognition finishes.
    AwaitingResult,
    /// The previous cycle is still running.
    Busy,
    CaptureFailed,
    DetectFailed,
    /// Faces were detected but none was submitted.
    Detected { faces: usize },
    Submitted { preview_id: Uuid },
    /// A crop was produced or attempted but could not be submitted.
    Failed { reason: String },
}

/// External collaborators the scheduler drives.
pub struct SchedulerPorts {
    pub camera: Box<dyn Camera>,
    pub detector: Box<dyn FaceDetector>,
    pub operator: Arc<dyn ImageOperator>,
    pub storage: Arc<dyn FileStorage>,
    pub transport: Box<dyn RecognitionTransport>,
    pub sound: Box<dyn SoundPlayer>,
    pub logger: Box<dyn PipelineLogger>,
}

#[derive(Clone, Debug)]
struct LoopConfig {
    tick_interval: Duration,
    sweep_interval: Duration,
    viewport: (f64, f64),
    box_padding: f64,
    min_display_face_size: f64,
}

/// Top-level detection and recognition loop.
///
/// One thread owns all mutable state. Ticks, transport events and
/// commands are multiplexed with `select!` and each is handled to
/// completion before the next, so the state machine and the pending
/// request are only ever touched from here.
pub struct DetectionScheduler {
    camera: Box<dyn Camera>,
    detector: Box<dyn FaceDetector>,
    crop: ProcessCropUseCase,
    session: NetworkSession,
    state_machine: RecognitionStateMachine,
    history: Arc<CropHistory>,
    storage: Arc<dyn FileStorage>,
    sweeper: PreviewSweeper,
    sound: Box<dyn SoundPlayer>,
    logger: Box<dyn PipelineLogger>,
    config: LoopConfig,
    /// Set while a detection cycle runs.
    cycle_running: bool,
    suspended: bool,
    cycles: usize,
    overlay: Vec<DisplayRect>,
    face_count: usize,
    commands_tx: Sender<SchedulerCommand>,
    commands_rx: Receiver<SchedulerCommand>,
}

impl DetectionScheduler {
    pub fn new(ports: SchedulerPorts, settings: &RecognitionSettings, preview_dir: PathBuf) -> Self {
        let history = Arc::new(CropHistory::new(settings.history_capacity));
        let crop = ProcessCropUseCase::new(
            ports.operator,
            ports.storage.clone(),
            history.clone(),
            CropConfig {
                mirror: settings.mirror,
                crop_margin: settings.crop_margin,
                compression: settings.compression.clone(),
                preview_dir: preview_dir.clone(),
                preview_prefix: settings.preview_prefix.clone(),
            },
        );
        let session = NetworkSession::new(
            ports.transport,
            ResponseClassifier::new(settings.not_recognized_names.iter().cloned()),
            RequestFraming {
                marker: settings.request_marker.clone(),
                terminator: settings.request_terminator.clone(),
            },
            settings.response_timeout(),
        );
        let state_machine = RecognitionStateMachine::new(RecognitionTimings {
            cooldown: settings.cooldown(),
            recognized_dwell: settings.recognized_dwell(),
            not_recognized_dwell: settings.not_recognized_dwell(),
        });
        let sweeper = PreviewSweeper::new(
            preview_dir,
            settings.preview_prefix.clone(),
            settings.preview_retention(),
        );
        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();

        Self {
            camera: ports.camera,
            detector: ports.detector,
            crop,
            session,
            state_machine,
            history,
            storage: ports.storage,
            sweeper,
            sound: ports.sound,
            logger: ports.logger,
            config: LoopConfig {
                tick_interval: settings.tick_interval(),
                sweep_interval: settings.sweep_interval(),
                viewport: settings.viewport,
                box_padding: settings.box_padding,
                min_display_face_size: settings.min_display_face_size,
            },
            cycle_running: false,
            suspended: false,
            cycles: 0,
            overlay: Vec::new(),
            face_count: 0,
            commands_tx,
            commands_rx,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            tx: self.commands_tx.clone(),
        }
    }

    pub fn history(&self) -> &Arc<CropHistory> {
        &self.history
    }

    pub fn state(&self) -> &RecognitionState {
        self.state_machine.state()
    }

    /// Display rectangles of the faces found in the latest cycle.
    pub fn overlay(&self) -> &[DisplayRect] {
        &self.overlay
    }

    pub fn face_count(&self) -> usize {
        self.face_count
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Runs until [`SchedulerCommand::Stop`] arrives or every handle and the
    /// transport are gone.
    pub fn run(&mut self) {
        let ticker = crossbeam_channel::tick(self.config.tick_interval);
        let sweep_ticker = crossbeam_channel::tick(self.config.sweep_interval);
        let commands = self.commands_rx.clone();
        let events = self.session.events();
        let never = crossbeam_channel::never();
        let mut events_closed = false;

        log::info!(
            "Detection loop started (tick {} ms)",
            self.config.tick_interval.as_millis()
        );
        self.sweep();

        loop {
            crossbeam_channel::select! {
                recv(ticker) -> _ => {
                    self.on_tick(Instant::now());
                }
                recv(if events_closed { &never } else { &events }) -> event => match event {
                    Ok(event) => self.on_transport_event(event, Instant::now()),
                    Err(_) => {
                        log::warn!("Transport event channel closed");
                        events_closed = true;
                    }
                },
                recv(commands) -> command => {
                    let keep_running = match command {
                        Ok(command) => self.handle_command(command, Instant::now()),
                        Err(_) => false,
                    };
                    if !keep_running {
                        break;
                    }
                }
                recv(sweep_ticker) -> _ => self.sweep(),
            }
        }

        self.dispose();
    }

    /// One tick of the fixed-interval loop.
    pub fn on_tick(&mut self, now: Instant) -> CycleOutcome {
        if self.state_machine.poll(now) {
            log::debug!("Result dwell ended, detection resumes after cooldown");
        }
        if let Some(output) = self.session.expire(now) {
            self.apply_session_output(output, now);
        }
        if self.suspended {
            return CycleOutcome::Suspended;
        }
        if !self.state_machine.auto_trigger_enabled() {
            return CycleOutcome::AwaitingResult;
        }
        self.run_cycle(now)
    }

    pub fn on_transport_event(&mut self, event: TransportEvent, now: Instant) {
        if let Some(output) = self.session.handle_event(event) {
            self.apply_session_output(output, now);
        }
    }

    /// Applies a command. Returns false for [`SchedulerCommand::Stop`].
    pub fn handle_command(&mut self, command: SchedulerCommand, now: Instant) -> bool {
        match command {
            SchedulerCommand::TriggerNow => {
                if self.suspended {
                    log::debug!("Manual trigger ignored while suspended");
                } else {
                    let outcome = self.run_cycle(now);
                    log::debug!("Manual trigger: {outcome:?}");
                }
            }
            SchedulerCommand::Suspend => {
                self.suspended = true;
                log::info!("Detection suspended");
            }
            SchedulerCommand::Resume => {
                self.suspended = false;
                log::info!("Detection resumed");
            }
            SchedulerCommand::SetViewport(width, height) => {
                if width > 0.0 && height > 0.0 {
                    self.config.viewport = (width, height);
                } else {
                    log::warn!("Ignoring invalid viewport {width}x{height}");
                }
            }
            SchedulerCommand::Stop => return false,
        }
        true
    }

    fn run_cycle(&mut self, now: Instant) -> CycleOutcome {
        if self.cycle_running {
            return CycleOutcome::Busy;
        }
        self.cycle_running = true;
        let outcome = self.cycle_body(now);
        self.cycle_running = false;
        outcome
    }

    /// Capture → detect → overlay → gate → crop → send.
    fn cycle_body(&mut self, now: Instant) -> CycleOutcome {
        self.cycles += 1;
        self.logger.cycle(self.cycles);

        let frame = match self.camera.capture() {
            Ok(frame) if frame.has_area() => frame,
            Ok(frame) => {
                log::warn!("Captured frame {} has no area", frame.path().display());
                return CycleOutcome::CaptureFailed;
            }
            Err(e) => {
                log::warn!("Capture failed: {e}");
                return CycleOutcome::CaptureFailed;
            }
        };

        let faces = match self.detector.detect(&frame) {
            Ok(faces) => faces,
            Err(e) => {
                log::warn!("Detection failed on {}: {e}", frame.path().display());
                return CycleOutcome::DetectFailed;
            }
        };
        self.logger.metric("faces", faces.len() as f64);

        if !self.update_overlay(&frame, &faces) {
            return CycleOutcome::Detected { faces: faces.len() };
        }
        if !self.should_submit(&frame, &faces, now) {
            return CycleOutcome::Detected { faces: faces.len() };
        }
        if let Err(e) = self.state_machine.begin_processing(now) {
            log::debug!("Not starting recognition: {e}");
            return CycleOutcome::Detected { faces: faces.len() };
        }
        self.submit(&frame, &faces, now)
    }

    /// Recomputes the display overlay. Returns false when the frame cannot
    /// be fitted into the viewport.
    fn update_overlay(&mut self, frame: &Frame, faces: &[FaceBox]) -> bool {
        let (img_w, img_h) = (frame.width() as f64, frame.height() as f64);
        let (vw, vh) = self.config.viewport;
        self.face_count = faces.len();
        let Some(fit) = fit_to_viewport(img_w, img_h, vw, vh) else {
            self.overlay.clear();
            return false;
        };
        self.overlay = faces
            .iter()
            .map(|face| to_display_rect(face, &fit, img_w, img_h, self.config.box_padding))
            .collect();
        true
    }

    fn should_submit(&self, frame: &Frame, faces: &[FaceBox], now: Instant) -> bool {
        let Some(largest) = select_largest_face(faces) else {
            return false;
        };
        let (img_w, img_h) = (frame.width() as f64, frame.height() as f64);
        let (vw, vh) = self.config.viewport;
        let Some(fit) = fit_to_viewport(img_w, img_h, vw, vh) else {
            return false;
        };
        if !is_face_large_enough(
            &largest,
            &fit,
            img_w,
            img_h,
            self.config.box_padding,
            self.config.min_display_face_size,
        ) {
            log::trace!("Largest face too small for recognition");
            return false;
        }
        self.state_machine.can_begin(now) && self.session.pending().is_none()
    }

    fn submit(&mut self, frame: &Frame, faces: &[FaceBox], now: Instant) -> CycleOutcome {
        let submission = match self.crop.execute(frame, faces, SystemTime::now()) {
            Ok(submission) => submission,
            Err(failure) => {
                failure.timings.report(self.logger.as_mut());
                let reason = failure.error.to_string();
                log::warn!("Crop pipeline failed: {reason}");
                let preview = CropPreview::waiting(Uuid::new_v4(), None, SystemTime::now());
                let id = preview.id;
                self.history.append(preview);
                self.fail_request(id, &reason, now);
                return CycleOutcome::Failed { reason };
            }
        };
        submission.timings.report(self.logger.as_mut());

        let preview_id = submission.preview.id;
        // Stamped after the pipeline so round-trip covers the network only.
        let sent_at = Instant::now().max(now);
        match self.session.send(preview_id, &submission.payload, sent_at) {
            Ok(()) => {
                if let Err(e) = self.state_machine.await_response() {
                    log::error!("State machine rejected send: {e}");
                }
                CycleOutcome::Submitted { preview_id }
            }
            Err(e) => {
                let reason = e.to_string();
                log::warn!("Recognition request not sent: {reason}");
                self.fail_request(preview_id, &reason, now);
                CycleOutcome::Failed { reason }
            }
        }
    }

    fn apply_session_output(&mut self, output: SessionOutput, now: Instant) {
        match output {
            SessionOutput::Response {
                preview_id,
                outcome,
                round_trip,
                error,
            } => {
                self.logger
                    .metric("round_trip_ms", round_trip.as_secs_f64() * 1000.0);
                let resolution = match &outcome {
                    RecognitionOutcome::Recognized { person_name } => {
                        PreviewResolution::Recognized {
                            person_name: person_name.clone(),
                        }
                    }
                    RecognitionOutcome::NotRecognized => PreviewResolution::NotRecognized {
                        error_message: error,
                    },
                };
                self.history.resolve(preview_id, resolution);

                let (sound, counter) = match &outcome {
                    RecognitionOutcome::Recognized { person_name } => {
                        self.logger.info(&format!(
                            "Recognized {person_name} ({} ms)",
                            round_trip.as_millis()
                        ));
                        (Sound::Recognized, "recognized")
                    }
                    RecognitionOutcome::NotRecognized => {
                        log::info!("Not recognized ({} ms)", round_trip.as_millis());
                        (Sound::NotRecognized, "not_recognized")
                    }
                };
                self.logger.metric(counter, 1.0);
                match self.state_machine.show_result(outcome, now) {
                    Ok(_) => self.play(sound),
                    Err(e) => {
                        log::warn!("Dropping result: {e}");
                        self.state_machine.reset(now);
                    }
                }
            }
            SessionOutput::Failed { preview_id, reason } => {
                self.fail_request(preview_id, &reason, now);
            }
            SessionOutput::GaveUp { failed } => {
                if let Some(preview_id) = failed {
                    self.fail_request(preview_id, "connection lost", now);
                }
                self.logger.info("Recognition service unreachable, giving up");
            }
        }
    }

    /// Local failure path: resolve the preview, give feedback, hard reset.
    fn fail_request(&mut self, preview_id: Uuid, reason: &str, now: Instant) {
        self.history.resolve(
            preview_id,
            PreviewResolution::NotRecognized {
                error_message: Some(reason.to_string()),
            },
        );
        self.logger.metric("failed", 1.0);
        self.play(Sound::NotRecognized);
        self.session.reset();
        self.state_machine.reset(now);
    }

    fn play(&mut self, sound: Sound) {
        if let Err(e) = self.sound.play(sound) {
            log::warn!("Sound feedback failed: {e}");
        }
    }

    fn sweep(&mut self) {
        if let Err(e) = self
            .sweeper
            .sweep_expired(self.storage.as_ref(), SystemTime::now())
        {
            log::warn!(
                "Preview sweep of {} failed: {e}",
                self.sweeper.dir().display()
            );
        }
    }

    /// Closes the connection and reports telemetry. Safe to call twice.
    pub fn dispose(&mut self) {
        self.session.shutdown();
        self.state_machine.reset(Instant::now());
        self.logger.summary();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::infrastructure::image_crate_operator::ImageCrateOperator;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::recognition::domain::recognition_transport::TransportError;
    use crate::storage::domain::crop_history::PreviewStatus;
    use crate::storage::infrastructure::local_file_storage::LocalFileStorage;
    use image::{Rgb, RgbImage};
    use rstest::rstest;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    const MS: Duration = Duration::from_millis(1);

    // --- Stubs ---

    struct StubCamera {
        frame: Frame,
        fail: Arc<AtomicBool>,
        captures: Arc<Mutex<usize>>,
    }

    impl Camera for StubCamera {
        fn capture(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
            *self.captures.lock().unwrap() += 1;
            if self.fail.load(Ordering::Relaxed) {
                return Err("camera busy".into());
            }
            Ok(self.frame.clone())
        }
    }

    struct StubDetector {
        faces: Arc<Mutex<Vec<FaceBox>>>,
    }

    impl FaceDetector for StubDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
            Ok(self.faces.lock().unwrap().clone())
        }
    }

    struct StubTransport {
        sent: Arc<Mutex<Vec<String>>>,
        events_tx: Sender<TransportEvent>,
        events_rx: Receiver<TransportEvent>,
    }

    impl RecognitionTransport for StubTransport {
        fn send(&self, text: String) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(text);
            Ok(())
        }

        fn events(&self) -> Receiver<TransportEvent> {
            self.events_rx.clone()
        }

        fn shutdown(&mut self) {
            let _ = self.events_tx.send(TransportEvent::Disconnected {
                reason: "shutdown".into(),
            });
        }
    }

    struct RecordingSound(Arc<Mutex<Vec<Sound>>>);

    impl SoundPlayer for RecordingSound {
        fn play(&mut self, sound: Sound) -> Result<(), Box<dyn std::error::Error>> {
            self.0.lock().unwrap().push(sound);
            Ok(())
        }
    }

    struct RecordingLogger {
        timings: Arc<Mutex<Vec<String>>>,
    }

    impl PipelineLogger for RecordingLogger {
        fn cycle(&mut self, _n: usize) {}
        fn timing(&mut self, stage: &str, _duration_ms: f64) {
            self.timings.lock().unwrap().push(stage.to_string());
        }
        fn metric(&mut self, _name: &str, _value: f64) {}
        fn info(&mut self, _message: &str) {}
    }

    struct Harness {
        scheduler: DetectionScheduler,
        faces: Arc<Mutex<Vec<FaceBox>>>,
        sent: Arc<Mutex<Vec<String>>>,
        sounds: Arc<Mutex<Vec<Sound>>>,
        camera_fails: Arc<AtomicBool>,
        captures: Arc<Mutex<usize>>,
        dir: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_logger(Box::new(NullPipelineLogger))
        }

        fn with_logger(logger: Box<dyn PipelineLogger>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let frame = write_frame(dir.path());
            let faces = Arc::new(Mutex::new(vec![large_face()]));
            let sent = Arc::new(Mutex::new(Vec::new()));
            let sounds = Arc::new(Mutex::new(Vec::new()));
            let camera_fails = Arc::new(AtomicBool::new(false));
            let captures = Arc::new(Mutex::new(0));
            let (events_tx, events_rx) = crossbeam_channel::unbounded();

            let ports = SchedulerPorts {
                camera: Box::new(StubCamera {
                    frame,
                    fail: camera_fails.clone(),
                    captures: captures.clone(),
                }),
                detector: Box::new(StubDetector {
                    faces: faces.clone(),
                }),
                operator: Arc::new(ImageCrateOperator::default()),
                storage: Arc::new(LocalFileStorage),
                transport: Box::new(StubTransport {
                    sent: sent.clone(),
                    events_tx,
                    events_rx,
                }),
                sound: Box::new(RecordingSound(sounds.clone())),
                logger,
            };
            let settings = RecognitionSettings {
                viewport: (400.0, 200.0),
                ..RecognitionSettings::default()
            };
            let scheduler =
                DetectionScheduler::new(ports, &settings, dir.path().join("previews"));

            Self {
                scheduler,
                faces,
                sent,
                sounds,
                camera_fails,
                captures,
                dir,
            }
        }

        fn connected() -> Self {
            let mut h = Self::new();
            h.scheduler
                .on_transport_event(TransportEvent::Connected, Instant::now());
            h
        }

        /// Delivers a reply handled at `now`. The receive stamp stays on the
        /// real clock so it never precedes the send stamp.
        fn reply(&mut self, text: &str, now: Instant) {
            self.scheduler.on_transport_event(
                TransportEvent::Message {
                    text: text.to_string(),
                    received_at: Instant::now().max(now),
                },
                now,
            );
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        fn sounds(&self) -> Vec<Sound> {
            self.sounds.lock().unwrap().clone()
        }
    }

    /// 200x100 frame shown in a 400x200 viewport: display scale 2.
    fn write_frame(dir: &Path) -> Frame {
        let path = dir.join("frame.png");
        RgbImage::from_pixel(200, 100, Rgb([90, 120, 150]))
            .save(&path)
            .unwrap();
        Frame::new(path, 200, 100)
    }

    /// Padded display size (40 + 2*20) * 2 = 160, above the 120 threshold.
    fn large_face() -> FaceBox {
        FaceBox::new(20.0, 20.0, 40.0, 40.0)
    }

    /// Padded display size (10 + 2*20) * 2 = 100, below the threshold.
    fn small_face() -> FaceBox {
        FaceBox::new(150.0, 40.0, 10.0, 10.0)
    }

    fn submitted_id(outcome: CycleOutcome) -> Uuid {
        match outcome {
            CycleOutcome::Submitted { preview_id } => preview_id,
            other => panic!("expected submission, got {other:?}"),
        }
    }

    // --- Tests ---

    #[test]
    fn test_large_face_is_submitted() {
        let mut h = Harness::connected();
        let t0 = Instant::now();

        let id = submitted_id(h.scheduler.on_tick(t0));

        assert_eq!(h.scheduler.state(), &RecognitionState::WaitingForResponse);
        let sent = h.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("frs:check_image:"));
        assert!(sent[0].ends_with(":frs:eof"));
        let preview = h.scheduler.history().get(id).unwrap();
        assert_eq!(preview.status, PreviewStatus::Waiting);
        assert!(preview.image_path.unwrap().exists());
    }

    #[test]
    fn test_small_face_updates_overlay_without_submitting() {
        let mut h = Harness::connected();
        *h.faces.lock().unwrap() = vec![small_face()];

        let outcome = h.scheduler.on_tick(Instant::now());

        assert_eq!(outcome, CycleOutcome::Detected { faces: 1 });
        assert_eq!(h.sent_count(), 0);
        assert_eq!(h.scheduler.face_count(), 1);
        assert_eq!(h.scheduler.overlay().len(), 1);
        assert!(h.scheduler.state_machine.is_idle());
    }

    #[test]
    fn test_no_faces_clears_overlay() {
        let mut h = Harness::connected();
        h.scheduler.on_tick(Instant::now());
        h.scheduler.state_machine.reset(Instant::now());
        *h.faces.lock().unwrap() = Vec::new();

        let outcome = h.scheduler.on_tick(Instant::now() + 5000 * MS);

        assert_eq!(outcome, CycleOutcome::Detected { faces: 0 });
        assert!(h.scheduler.overlay().is_empty());
    }

    #[test]
    fn test_recognized_flow_dwell_and_cooldown() {
        let mut h = Harness::connected();
        let t0 = Instant::now();
        let id = submitted_id(h.scheduler.on_tick(t0));

        h.reply(r#"{"name":"Alice"}"#, t0 + 300 * MS);

        let preview = h.scheduler.history().get(id).unwrap();
        assert_eq!(preview.status, PreviewStatus::Recognized);
        assert_eq!(preview.person_name.as_deref(), Some("Alice"));
        assert_eq!(h.sounds(), vec![Sound::Recognized]);
        assert!(matches!(
            h.scheduler.state(),
            RecognitionState::ShowingResult { .. }
        ));

        // Dwell: 1500 ms after the result.
        assert_eq!(
            h.scheduler.on_tick(t0 + 1799 * MS),
            CycleOutcome::AwaitingResult
        );
        let idle_at = t0 + 1800 * MS;
        // Dwell ends; the cooldown keeps the face from being resubmitted.
        assert_eq!(
            h.scheduler.on_tick(idle_at),
            CycleOutcome::Detected { faces: 1 }
        );
        assert_eq!(
            h.scheduler.on_tick(idle_at + 1999 * MS),
            CycleOutcome::Detected { faces: 1 }
        );
        assert_eq!(h.sent_count(), 1);
        submitted_id(h.scheduler.on_tick(idle_at + 2000 * MS));
        assert_eq!(h.sent_count(), 2);
    }

    #[test]
    fn test_unknown_done_is_not_recognized_with_short_dwell() {
        let mut h = Harness::connected();
        let t0 = Instant::now();
        let id = submitted_id(h.scheduler.on_tick(t0));

        h.reply(r#"{"name":"Unknown_done"}"#, t0);

        assert_eq!(
            h.scheduler.history().get(id).unwrap().status,
            PreviewStatus::NotRecognized
        );
        assert_eq!(h.sounds(), vec![Sound::NotRecognized]);
        assert_eq!(h.scheduler.on_tick(t0 + 499 * MS), CycleOutcome::AwaitingResult);
        h.scheduler.on_tick(t0 + 500 * MS);
        assert!(h.scheduler.state_machine.is_idle());
    }

    #[test]
    fn test_send_while_disconnected_fails_locally() {
        let mut h = Harness::new();
        let t0 = Instant::now();

        let outcome = h.scheduler.on_tick(t0);

        assert!(matches!(outcome, CycleOutcome::Failed { .. }));
        assert_eq!(h.sent_count(), 0);
        assert!(h.scheduler.state_machine.is_idle());
        let latest = h.scheduler.history().snapshot()[0].clone();
        assert_eq!(latest.status, PreviewStatus::NotRecognized);
        assert_eq!(
            latest.error_message.as_deref(),
            Some("not connected to the recognition service")
        );
        assert_eq!(h.sounds(), vec![Sound::NotRecognized]);
        // Cooldown applies after the reset.
        assert_eq!(
            h.scheduler.on_tick(t0 + 100 * MS),
            CycleOutcome::Detected { faces: 1 }
        );
    }

    #[test]
    fn test_response_timeout_resets() {
        let mut h = Harness::connected();
        let t0 = Instant::now();
        let id = submitted_id(h.scheduler.on_tick(t0));

        h.scheduler.on_tick(t0 + Duration::from_secs(11));

        let preview = h.scheduler.history().get(id).unwrap();
        assert_eq!(preview.status, PreviewStatus::NotRecognized);
        assert_eq!(preview.error_message.as_deref(), Some("response timed out"));
        assert!(h.scheduler.state_machine.is_idle());
        assert!(h.scheduler.session.pending().is_none());
    }

    #[test]
    fn test_connection_loss_while_pending_resets() {
        let mut h = Harness::connected();
        let t0 = Instant::now();
        let id = submitted_id(h.scheduler.on_tick(t0));

        h.scheduler.on_transport_event(
            TransportEvent::Disconnected {
                reason: "eof".into(),
            },
            t0 + 10 * MS,
        );

        let preview = h.scheduler.history().get(id).unwrap();
        assert_eq!(preview.error_message.as_deref(), Some("connection lost"));
        assert!(h.scheduler.state_machine.is_idle());
    }

    #[test]
    fn test_malformed_response_resets_and_late_reply_is_ignored() {
        let mut h = Harness::connected();
        let t0 = Instant::now();
        let id = submitted_id(h.scheduler.on_tick(t0));

        h.reply("<<garbage>>", t0 + 10 * MS);
        h.reply(r#"{"name":"Alice"}"#, t0 + 20 * MS);

        let preview = h.scheduler.history().get(id).unwrap();
        assert_eq!(preview.status, PreviewStatus::NotRecognized);
        assert_eq!(preview.error_message.as_deref(), Some("malformed response"));
        assert!(preview.person_name.is_none());
        assert!(h.scheduler.state_machine.is_idle());
    }

    #[test]
    fn test_single_flight_under_manual_trigger() {
        let mut h = Harness::connected();
        let t0 = Instant::now();
        submitted_id(h.scheduler.on_tick(t0));

        assert!(h.scheduler.handle_command(SchedulerCommand::TriggerNow, t0 + MS));
        assert_eq!(h.scheduler.on_tick(t0 + 2 * MS), CycleOutcome::AwaitingResult);

        assert_eq!(h.sent_count(), 1);
    }

    #[test]
    fn test_manual_trigger_runs_cycle() {
        let mut h = Harness::connected();
        h.scheduler
            .handle_command(SchedulerCommand::TriggerNow, Instant::now());
        assert_eq!(h.sent_count(), 1);
    }

    #[test]
    fn test_suspend_stops_capturing() {
        let mut h = Harness::connected();
        let t0 = Instant::now();
        h.scheduler.handle_command(SchedulerCommand::Suspend, t0);

        assert_eq!(h.scheduler.on_tick(t0), CycleOutcome::Suspended);
        h.scheduler.handle_command(SchedulerCommand::TriggerNow, t0);
        assert_eq!(*h.captures.lock().unwrap(), 0);

        h.scheduler.handle_command(SchedulerCommand::Resume, t0);
        submitted_id(h.scheduler.on_tick(t0));
    }

    #[test]
    fn test_capture_failure_aborts_cycle_only() {
        let mut h = Harness::connected();
        let t0 = Instant::now();
        h.camera_fails.store(true, Ordering::Relaxed);
        assert_eq!(h.scheduler.on_tick(t0), CycleOutcome::CaptureFailed);

        h.camera_fails.store(false, Ordering::Relaxed);
        submitted_id(h.scheduler.on_tick(t0 + 50 * MS));
    }

    #[test]
    fn test_running_flag_skips_overlapping_cycle() {
        let mut h = Harness::connected();
        h.scheduler.cycle_running = true;

        assert_eq!(h.scheduler.on_tick(Instant::now()), CycleOutcome::Busy);
        assert_eq!(*h.captures.lock().unwrap(), 0);
    }

    #[rstest]
    #[case::no_submission(vec![small_face()])]
    #[case::submission(vec![large_face()])]
    fn test_running_flag_cleared_after_cycle(#[case] faces: Vec<FaceBox>) {
        let mut h = Harness::connected();
        *h.faces.lock().unwrap() = faces;
        h.scheduler.on_tick(Instant::now());
        assert!(!h.scheduler.cycle_running);
    }

    #[test]
    fn test_failed_crop_still_reports_stage_timings() {
        let timings = Arc::new(Mutex::new(Vec::new()));
        let mut h = Harness::with_logger(Box::new(RecordingLogger {
            timings: timings.clone(),
        }));
        h.scheduler
            .on_transport_event(TransportEvent::Connected, Instant::now());
        std::fs::remove_file(h.dir.path().join("frame.png")).unwrap();

        let outcome = h.scheduler.on_tick(Instant::now());

        assert!(matches!(outcome, CycleOutcome::Failed { .. }));
        assert_eq!(*timings.lock().unwrap(), vec!["read", "total"]);
        assert!(h.scheduler.state_machine.is_idle());
        assert!(!h.scheduler.cycle_running);
    }

    #[test]
    fn test_viewport_change_affects_gate() {
        let mut h = Harness::connected();
        // At 200x100 the display scale is 1 and the padded face is 80px.
        h.scheduler
            .handle_command(SchedulerCommand::SetViewport(200.0, 100.0), Instant::now());

        assert_eq!(
            h.scheduler.on_tick(Instant::now()),
            CycleOutcome::Detected { faces: 1 }
        );
    }

    #[test]
    fn test_invalid_viewport_is_ignored() {
        let mut h = Harness::connected();
        h.scheduler
            .handle_command(SchedulerCommand::SetViewport(0.0, 100.0), Instant::now());
        submitted_id(h.scheduler.on_tick(Instant::now()));
    }

    #[test]
    fn test_stop_command_ends_run_loop() {
        let mut h = Harness::connected();
        *h.faces.lock().unwrap() = Vec::new();
        let handle = h.scheduler.handle();
        assert!(handle.stop());

        h.scheduler.run();

        assert!(h.scheduler.state_machine.is_idle());
    }

    #[test]
    fn test_gave_up_fails_pending() {
        let mut h = Harness::connected();
        let t0 = Instant::now();
        let id = submitted_id(h.scheduler.on_tick(t0));

        h.scheduler.on_transport_event(TransportEvent::GaveUp, t0);

        assert_eq!(
            h.scheduler.history().get(id).unwrap().status,
            PreviewStatus::NotRecognized
        );
        assert!(h.scheduler.state_machine.is_idle());
    }
}
