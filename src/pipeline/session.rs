//! Per-stream camera session: connection state machine and worker loop
//!
//! A session's worker is the only writer of its [`SessionStatus`]; the
//! supervisor and activity monitor read it through [`SessionHandle`], which
//! only ever hands out detached copies.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use crate::capture::{decoder, FrameSource, SourceConnector};
use crate::error::SessionError;
use crate::pipeline::motion::{MotionDetector, MotionSettings};
use crate::pipeline::recording::{RecordingController, RecordingSettings, SinkFactory};
use crate::utils::{self, StorageProbe};
use crate::{Config, Frame, StreamConfig};

/// Fraction of the inactivity timeout a single read may take before it counts as a stall.
pub const READ_STALL_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active,
    ReadStalled,
    Reconnecting,
    /// Terminal: reconnects exhausted or the worker faulted
    Failed,
    /// Terminal: stopped on request
    Stopped,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Stopped)
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub timeout: Duration,
    pub max_reconnects: u32,
    pub reconnect_delay: Duration,
    pub motion: MotionSettings,
    pub recording: RecordingSettings,
}

impl SessionSettings {
    /// Session defaults with the stream's overrides applied.
    pub fn for_stream(config: &Config, stream: &StreamConfig) -> Self {
        let recording = &config.recording;
        Self {
            timeout: Duration::from_secs_f64(stream.timeout_secs.unwrap_or(config.session.timeout_secs)),
            max_reconnects: config.session.max_reconnects,
            reconnect_delay: Duration::from_millis(config.session.reconnect_delay_ms),
            motion: MotionSettings {
                motion_threshold: stream.motion_threshold.unwrap_or(config.motion.threshold),
                history: config.motion.history,
                var_threshold: config.motion.var_threshold,
            },
            recording: RecordingSettings {
                record_on_motion: stream.record_on_motion.unwrap_or(recording.record_on_motion),
                min_record_time: Duration::from_secs_f64(recording.min_record_time_secs),
                directory: recording.directory.clone(),
                min_file_size: recording.min_file_size,
                min_disk_space_gb: recording.min_disk_space_gb,
                indicator: recording.indicator,
                default_fps: recording.default_fps,
                preroll_frames: config.session.preroll_frames,
            },
        }
    }

    pub fn read_stall_window(&self) -> Duration {
        self.timeout.mul_f64(READ_STALL_RATIO)
    }
}

/// Fields shared between the worker and its readers.
#[derive(Debug)]
struct SessionStatus {
    state: ConnectionState,
    inactive: bool,
    frame: Option<Frame>,
    last_update: Option<Instant>,
    reconnect_attempts: u32,
    motion: bool,
    recording: bool,
}

struct SessionShared {
    id: usize,
    name: String,
    timeout: Duration,
    status: Mutex<SessionStatus>,
    stop: AtomicBool,
}

/// Point-in-time copy of a session's status.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: usize,
    pub name: String,
    pub state: ConnectionState,
    pub inactive: bool,
    pub frame: Option<Frame>,
    pub last_update: Option<Instant>,
    pub reconnect_attempts: u32,
    pub motion: bool,
    pub recording: bool,
}

impl SessionSnapshot {
    /// Active, not marked stale, and holding a frame to show.
    pub fn is_live(&self) -> bool {
        self.state == ConnectionState::Active && !self.inactive && self.frame.is_some()
    }
}

/// Cloneable reader/controller side of a session.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    pub(crate) fn new(id: usize, name: String, timeout: Duration) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                id,
                name,
                timeout,
                status: Mutex::new(SessionStatus {
                    state: ConnectionState::Connecting,
                    inactive: false,
                    frame: None,
                    last_update: None,
                    reconnect_attempts: 0,
                    motion: false,
                    recording: false,
                }),
                stop: AtomicBool::new(false),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionStatus> {
        self.shared.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> usize {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn timeout(&self) -> Duration {
        self.shared.timeout
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Active and not marked inactive.
    pub fn is_counted_active(&self) -> bool {
        let status = self.lock();
        status.state == ConnectionState::Active && !status.inactive && status.last_update.is_some()
    }

    /// Copy of the shared status. The frame is detached from the worker's buffer.
    pub fn snapshot(&self) -> SessionSnapshot {
        let status = self.lock();
        SessionSnapshot {
            id: self.shared.id,
            name: self.shared.name.clone(),
            state: status.state,
            inactive: status.inactive,
            frame: status.frame.as_ref().map(Frame::detached),
            last_update: status.last_update,
            reconnect_attempts: status.reconnect_attempts,
            motion: status.motion,
            recording: status.recording,
        }
    }

    /// Ask the worker to exit at its next loop iteration.
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    /// Flag an Active session whose last frame is older than its timeout.
    /// Returns true when the flag was newly set.
    pub fn mark_inactive_if_stale(&self, now: Instant) -> bool {
        let mut status = self.lock();
        if status.state != ConnectionState::Active || status.inactive {
            return false;
        }
        let stale = status
            .last_update
            .map_or(true, |at| now.saturating_duration_since(at) > self.shared.timeout);
        if stale {
            status.inactive = true;
        }
        stale
    }

    fn set_state(&self, state: ConnectionState) {
        self.lock().state = state;
    }

    fn set_attempts(&self, attempts: u32) {
        self.lock().reconnect_attempts = attempts;
    }

    /// Publish a processed frame. Clears the inactive flag; returns true if it was set.
    pub(crate) fn publish(&self, frame: Frame, motion: bool, recording: bool, attempts: u32, now: Instant) -> bool {
        let mut status = self.lock();
        let recovered = status.inactive;
        if status.state != ConnectionState::Active {
            info!(session = self.shared.id, "Session {} active", self.shared.name);
        }
        status.state = ConnectionState::Active;
        status.inactive = false;
        status.frame = Some(frame);
        status.last_update = Some(status.last_update.map_or(now, |prev| prev.max(now)));
        status.reconnect_attempts = attempts;
        status.motion = motion;
        status.recording = recording;
        recovered
    }

    fn finish(&self, state: ConnectionState) {
        let mut status = self.lock();
        status.state = state;
        status.inactive = false;
        status.motion = false;
        status.recording = false;
    }
}

/// How a worker ended.
#[derive(Debug)]
pub enum SessionExit {
    Stopped,
    Failed(SessionError),
}

/// One stream's worker: owns the source, motion detector and recorder.
pub struct CameraSession {
    handle: SessionHandle,
    uri: String,
    settings: SessionSettings,
    connector: Arc<dyn SourceConnector>,
    detector: MotionDetector,
    recorder: RecordingController,
    source: Option<Box<dyn FrameSource>>,
    attempts: u32,
    frame_since_open: bool,
    /// Set by the first published frame; only then may a reopen count as Active
    ever_published: bool,
}

impl CameraSession {
    pub fn new(
        id: usize,
        stream: &StreamConfig,
        settings: SessionSettings,
        connector: Arc<dyn SourceConnector>,
        sinks: Arc<dyn SinkFactory>,
        storage: Arc<dyn StorageProbe>,
    ) -> Self {
        let handle = SessionHandle::new(id, stream.name.clone(), settings.timeout);
        let recorder = RecordingController::new(id, settings.recording.clone(), sinks, storage);
        Self {
            handle,
            uri: stream.uri.clone(),
            detector: MotionDetector::new(settings.motion),
            recorder,
            settings,
            connector,
            source: None,
            attempts: 0,
            frame_since_open: false,
            ever_published: false,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Run until stopped or failed. Resources are released on every exit route.
    #[instrument(name = "session", skip(self), fields(id = self.handle.id(), name = %self.handle.name()))]
    pub fn run(mut self) -> SessionExit {
        let exit = match panic::catch_unwind(AssertUnwindSafe(|| self.drive())) {
            Ok(Ok(())) => SessionExit::Stopped,
            Ok(Err(e)) => SessionExit::Failed(e),
            Err(payload) => SessionExit::Failed(SessionError::WorkerFault(panic_message(payload.as_ref()))),
        };
        self.finalize(&exit);
        exit
    }

    fn stopped(&self) -> bool {
        self.handle.stop_requested()
    }

    fn drive(&mut self) -> Result<(), SessionError> {
        info!("Connecting to {}", self.uri);
        self.handle.set_state(ConnectionState::Connecting);
        if !self.open_source()? {
            return Ok(());
        }

        let window = self.settings.read_stall_window();
        while !self.stopped() {
            let Some(source) = self.source.as_mut() else {
                break;
            };
            let started = Instant::now();
            match source.read(window) {
                Ok(Some(frame)) => self.on_frame(frame),
                Ok(None) => {
                    if !self.recover(SessionError::ReadStall(started.elapsed()))? {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Read error on {}: {}", self.uri, e);
                    if !self.recover(SessionError::ReadStall(started.elapsed()))? {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Open the source, retrying with backoff. `Ok(false)` if stopped meanwhile.
    fn open_source(&mut self) -> Result<bool, SessionError> {
        loop {
            if self.stopped() {
                return Ok(false);
            }
            match self.connector.open(&self.uri) {
                Ok(source) => {
                    self.recorder.set_source_fps(source.fps());
                    self.source = Some(source);
                    self.frame_since_open = false;
                    self.detector.reset();
                    if self.ever_published {
                        info!(attempts = self.attempts, "Successfully reconnected to {}", self.uri);
                        self.handle.set_state(ConnectionState::Active);
                    } else {
                        // Active only once a frame has been read
                        info!("Connected to {}, waiting for first frame", self.uri);
                    }
                    return Ok(true);
                }
                Err(e) => {
                    self.count_failed_attempt(SessionError::ConnectFailure(e))?;
                    self.handle.set_state(ConnectionState::Reconnecting);
                    if !utils::sleep_unless_stopped(&self.handle.shared.stop, self.settings.reconnect_delay) {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Bump the reconnect counter; error once it exceeds `max_reconnects`.
    fn count_failed_attempt(&mut self, cause: SessionError) -> Result<(), SessionError> {
        self.attempts += 1;
        self.handle.set_attempts(self.attempts);
        metrics::counter!("reconnect_attempts").increment(1);
        warn!(attempt = self.attempts, "{} ({})", cause, self.uri);

        if self.attempts > self.settings.max_reconnects {
            error!("Max reconnection attempts reached for {}", self.uri);
            return Err(SessionError::ReconnectExhausted {
                attempts: self.attempts,
            });
        }
        Ok(())
    }

    /// ReadStalled -> Reconnecting -> Active. `Ok(false)` if stopped meanwhile.
    fn recover(&mut self, cause: SessionError) -> Result<bool, SessionError> {
        metrics::counter!("read_stalls").increment(1);
        self.handle.set_state(ConnectionState::ReadStalled);
        if self.frame_since_open {
            warn!("{} on {}", cause, self.uri);
        } else {
            // The connection never delivered anything: that open did not succeed
            self.count_failed_attempt(cause)?;
        }

        if let Some(mut source) = self.source.take() {
            source.close();
        }
        if !utils::sleep_unless_stopped(&self.handle.shared.stop, self.settings.reconnect_delay) {
            return Ok(false);
        }
        self.handle.set_state(ConnectionState::Reconnecting);
        info!(attempt = self.attempts + 1, "Attempting to reconnect to {}", self.uri);
        self.open_source()
    }

    fn on_frame(&mut self, raw: Frame) {
        let now = Instant::now();
        let frame = match decoder::normalize(raw) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Dropping undecodable frame: {}", e);
                metrics::counter!("frames_undecodable").increment(1);
                return;
            }
        };

        self.frame_since_open = true;
        if self.attempts > 0 {
            debug!(attempts = self.attempts, "Reconnect counter reset");
            self.attempts = 0;
        }

        let motion = self.detector.apply(&frame);
        if let Some(event) = self.recorder.on_frame(&frame, motion, now) {
            debug!(?event, "Recorder transition");
        }
        metrics::counter!("frames_read").increment(1);

        self.ever_published = true;
        let recovered = self
            .handle
            .publish(frame, motion, self.recorder.is_recording(), self.attempts, now);
        if recovered {
            info!("Session {} producing frames again", self.handle.name());
        }
    }

    fn finalize(&mut self, exit: &SessionExit) {
        if let Some(mut source) = self.source.take() {
            source.close();
        }
        self.recorder.finalize();
        self.detector.reset();

        match exit {
            SessionExit::Stopped => {
                info!("Session stopped");
                self.handle.finish(ConnectionState::Stopped);
            }
            SessionExit::Failed(e) => {
                error!("Session failed: {}", e);
                self.handle.finish(ConnectionState::Failed);
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::pipeline::recording::MjpegSinkFactory;
    use crate::utils::StatvfsProbe;
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Frame,
        /// Frames until the session is stopped
        Frames,
        Stall,
        /// Waits out the whole read window, then stalls
        Silent,
        Error,
        Panic,
    }

    /// Each `open` pops the next script: `None` fails the open, `Some(steps)` yields a source.
    #[derive(Default)]
    struct Scripted {
        opens: Mutex<VecDeque<Option<Vec<Step>>>>,
        open_calls: AtomicU32,
        closes: Arc<AtomicU32>,
    }

    impl Scripted {
        fn new(opens: Vec<Option<Vec<Step>>>) -> Arc<Self> {
            Arc::new(Self {
                opens: Mutex::new(opens.into()),
                ..Default::default()
            })
        }
    }

    struct ScriptedSource {
        steps: VecDeque<Step>,
        sequence: u64,
        closes: Arc<AtomicU32>,
    }

    impl SourceConnector for Scripted {
        fn open(&self, uri: &str) -> Result<Box<dyn FrameSource>, SourceError> {
            self.open_calls.fetch_add(1, Ordering::SeqCst);
            match self.opens.lock().unwrap().pop_front().flatten() {
                Some(steps) => Ok(Box::new(ScriptedSource {
                    steps: steps.into(),
                    sequence: 0,
                    closes: self.closes.clone(),
                })),
                None => Err(SourceError::Open {
                    uri: uri.to_string(),
                    reason: "refused".into(),
                }),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn read(&mut self, wait: Duration) -> Result<Option<Frame>, SourceError> {
            let step = self.steps.pop_front().unwrap_or(Step::Stall);
            if let Step::Frames = step {
                self.steps.push_front(Step::Frames);
            }
            match step {
                Step::Frame | Step::Frames => {
                    self.sequence += 1;
                    let image = RgbImage::from_pixel(16, 12, Rgb([50, 60, 70]));
                    Ok(Some(Frame::from_rgb(image, self.sequence, Instant::now())))
                }
                Step::Stall => Ok(None),
                Step::Silent => {
                    std::thread::sleep(wait);
                    Ok(None)
                }
                Step::Error => Err(SourceError::Read("connection reset".into())),
                Step::Panic => panic!("decoder blew up"),
            }
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn session(connector: Arc<Scripted>, max_reconnects: u32) -> (CameraSession, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.session.max_reconnects = max_reconnects;
        config.session.reconnect_delay_ms = 0;
        config.session.timeout_secs = 0.2;
        config.recording.directory = dir.path().to_path_buf();
        let stream = StreamConfig::new("scripted://cam", "Cam");
        let settings = SessionSettings::for_stream(&config, &stream);
        let session = CameraSession::new(
            0,
            &stream,
            settings,
            connector,
            Arc::new(MjpegSinkFactory::default()),
            Arc::new(StatvfsProbe),
        );
        (session, dir)
    }

    #[test]
    fn never_connecting_fails_after_max_reconnects_retries() {
        let connector = Scripted::new(vec![None; 10]);
        let (session, _dir) = session(connector.clone(), 3);
        let handle = session.handle();

        let exit = session.run();
        assert!(matches!(exit, SessionExit::Failed(SessionError::ReconnectExhausted { attempts: 4 })));
        // One initial attempt plus three retries
        assert_eq!(connector.open_calls.load(Ordering::SeqCst), 4);
        assert_eq!(handle.state(), ConnectionState::Failed);
        assert_eq!(handle.snapshot().reconnect_attempts, 4);
    }

    #[test]
    fn stall_reconnects_and_counter_resets_on_frames() {
        let connector = Scripted::new(vec![
            Some(vec![Step::Frame, Step::Frame, Step::Stall]),
            None,
            Some(vec![Step::Frame, Step::Error]),
            None,
            None,
            None,
        ]);
        let (session, _dir) = session(connector.clone(), 2);
        let handle = session.handle();

        let exit = session.run();
        assert!(matches!(exit, SessionExit::Failed(SessionError::ReconnectExhausted { attempts: 3 })));
        assert_eq!(connector.open_calls.load(Ordering::SeqCst), 6);
        // Both sources that opened were closed exactly once
        assert_eq!(connector.closes.load(Ordering::SeqCst), 2);

        let snap = handle.snapshot();
        assert_eq!(snap.state, ConnectionState::Failed);
        assert_eq!(snap.frame.as_ref().map(|f| f.meta.sequence), Some(1));
        assert!(!snap.recording);
    }

    #[test]
    fn connection_that_never_delivers_counts_as_failed_attempt() {
        let connector = Scripted::new(vec![Some(vec![Step::Stall]), Some(vec![Step::Stall]), Some(vec![])]);
        let (session, _dir) = session(connector.clone(), 1);

        let exit = session.run();
        assert!(matches!(exit, SessionExit::Failed(SessionError::ReconnectExhausted { attempts: 2 })));
        assert_eq!(connector.open_calls.load(Ordering::SeqCst), 2);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reopen_after_refusal_waits_for_a_frame_before_active() {
        let connector = Scripted::new(vec![None, Some(vec![Step::Silent; 50])]);
        let (session, _dir) = session(connector.clone(), 50);
        let handle = session.handle();

        let worker = std::thread::spawn(move || session.run());
        let deadline = Instant::now() + Duration::from_secs(5);
        while connector.open_calls.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        std::thread::sleep(Duration::from_millis(20));

        // Second open succeeded but nothing has been read yet
        assert_eq!(handle.state(), ConnectionState::Reconnecting);
        assert!(!handle.is_counted_active());
        assert!(handle.snapshot().frame.is_none());

        handle.request_stop();
        assert!(matches!(worker.join().unwrap(), SessionExit::Stopped));
    }

    #[test]
    fn reopen_after_frames_goes_straight_to_active() {
        let connector = Scripted::new(vec![Some(vec![Step::Frame, Step::Stall]), Some(vec![Step::Silent; 50])]);
        let (session, _dir) = session(connector.clone(), 5);
        let handle = session.handle();

        let worker = std::thread::spawn(move || session.run());
        let deadline = Instant::now() + Duration::from_secs(5);
        while connector.open_calls.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(handle.state(), ConnectionState::Active);
        assert!(handle.snapshot().frame.is_some());

        handle.request_stop();
        assert!(matches!(worker.join().unwrap(), SessionExit::Stopped));
    }

    #[test]
    fn panic_is_contained_and_source_released() {
        let connector = Scripted::new(vec![Some(vec![Step::Frame, Step::Panic])]);
        let (session, _dir) = session(connector.clone(), 3);
        let handle = session.handle();

        let exit = session.run();
        match exit {
            SessionExit::Failed(SessionError::WorkerFault(msg)) => assert!(msg.contains("decoder blew up")),
            other => panic!("unexpected exit {other:?}"),
        }
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), ConnectionState::Failed);
    }

    #[test]
    fn stop_before_start_exits_cleanly() {
        let connector = Scripted::new(vec![Some(vec![Step::Frame])]);
        let (session, _dir) = session(connector.clone(), 3);
        let handle = session.handle();
        handle.request_stop();

        assert!(matches!(session.run(), SessionExit::Stopped));
        assert_eq!(connector.open_calls.load(Ordering::SeqCst), 0);
        assert_eq!(handle.state(), ConnectionState::Stopped);
    }

    #[test]
    fn stop_honoured_within_one_iteration() {
        let connector = Scripted::new(vec![Some(vec![Step::Frames])]);
        let (session, _dir) = session(connector.clone(), 3);
        let handle = session.handle();

        let worker = std::thread::spawn(move || session.run());
        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.is_counted_active() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        handle.request_stop();
        assert!(matches!(worker.join().unwrap(), SessionExit::Stopped));
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn snapshot_frame_is_an_independent_copy() {
        let handle = SessionHandle::new(1, "Porch".into(), Duration::from_secs(5));
        let frame = Frame::from_rgb(RgbImage::new(4, 4), 3, Instant::now());
        let ptr = frame.data.as_ptr();
        handle.publish(frame, true, false, 0, Instant::now());

        let snap = handle.snapshot();
        assert!(snap.is_live());
        assert!(snap.motion);
        assert_ne!(snap.frame.unwrap().data.as_ptr(), ptr);
    }

    #[test]
    fn last_update_never_moves_backwards() {
        let handle = SessionHandle::new(1, "Porch".into(), Duration::from_secs(5));
        let later = Instant::now() + Duration::from_secs(2);
        let frame = Frame::from_rgb(RgbImage::new(2, 2), 1, Instant::now());
        handle.publish(frame.clone(), false, false, 0, later);
        handle.publish(frame, false, false, 0, later - Duration::from_secs(1));
        assert_eq!(handle.snapshot().last_update, Some(later));
    }

    #[test]
    fn read_stall_window_is_half_the_timeout() {
        let mut config = Config::default();
        let mut stream = StreamConfig::new("synthetic://a", "A");
        assert_eq!(SessionSettings::for_stream(&config, &stream).read_stall_window(), Duration::from_millis(2500));

        stream.timeout_secs = Some(1.0);
        stream.motion_threshold = Some(42.0);
        config.recording.record_on_motion = false;
        let settings = SessionSettings::for_stream(&config, &stream);
        assert_eq!(settings.read_stall_window(), Duration::from_millis(500));
        assert_eq!(settings.motion.motion_threshold, 42.0);
        assert!(!settings.recording.record_on_motion);
    }
}
