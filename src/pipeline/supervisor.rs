//! Session ownership, startup gate, render loop and shutdown

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::TrySendError;
use image::Rgb;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::capture::SourceConnector;
use crate::display::mosaic::{self, CellSize, Mosaic, Tile};
use crate::display::overlay::{self, FrameAnnotator};
use crate::error::SupervisorError;
use crate::pipeline::monitor::ActivityMonitor;
use crate::pipeline::recording::{MjpegSinkFactory, SinkFactory};
use crate::pipeline::session::{CameraSession, SessionExit, SessionHandle, SessionSettings, SessionSnapshot};
use crate::utils::{StatvfsProbe, StorageProbe};
use crate::Config;

const STARTUP_POLL: Duration = Duration::from_millis(50);
/// Floor for the pacing sleep when a cycle overruns the frame interval.
const MIN_CYCLE_DELAY: Duration = Duration::from_millis(1);

/// Why the render loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Signal,
    ConsumerGone,
}

pub struct Supervisor {
    config: Arc<Config>,
    connector: Arc<dyn SourceConnector>,
    sinks: Arc<dyn SinkFactory>,
    storage: Arc<dyn StorageProbe>,
    annotators: Vec<Arc<dyn FrameAnnotator>>,
    sessions: Arc<[SessionHandle]>,
    workers: Vec<JoinHandle<SessionExit>>,
    monitor: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

impl Supervisor {
    pub fn new(config: Arc<Config>, connector: Arc<dyn SourceConnector>) -> Self {
        let sinks = Arc::new(MjpegSinkFactory {
            quality: config.recording.jpeg_quality,
        });
        Self {
            config,
            connector,
            sinks,
            storage: Arc::new(StatvfsProbe),
            annotators: Vec::new(),
            sessions: Arc::from(Vec::new()),
            workers: Vec::new(),
            monitor: None,
        }
    }

    pub fn with_sink_factory(mut self, sinks: Arc<dyn SinkFactory>) -> Self {
        self.sinks = sinks;
        self
    }

    pub fn with_storage_probe(mut self, storage: Arc<dyn StorageProbe>) -> Self {
        self.storage = storage;
        self
    }

    /// Annotators run in insertion order on every live frame, before labels.
    pub fn with_annotator(mut self, annotator: Arc<dyn FrameAnnotator>) -> Self {
        info!("Frame annotator registered: {}", annotator.name());
        self.annotators.push(annotator);
        self
    }

    pub fn sessions(&self) -> &[SessionHandle] {
        &self.sessions
    }

    pub fn cell_size(&self) -> CellSize {
        CellSize {
            width: self.config.display.cell_width,
            height: self.config.display.cell_height,
        }
    }

    /// Start one worker per configured stream plus the activity monitor. No-op if already launched.
    pub fn launch(&mut self) {
        if !self.workers.is_empty() {
            return;
        }

        let mut handles = Vec::with_capacity(self.config.streams.len());
        for (id, stream) in self.config.streams.iter().enumerate() {
            let settings = SessionSettings::for_stream(&self.config, stream);
            let session = CameraSession::new(
                id,
                stream,
                settings,
                self.connector.clone(),
                self.sinks.clone(),
                self.storage.clone(),
            );
            handles.push(session.handle());
            self.workers.push(tokio::task::spawn_blocking(move || session.run()));
        }
        self.sessions = handles.into();
        info!("Launched {} session workers", self.sessions.len());

        let (stop_tx, stop_rx) = watch::channel(false);
        let monitor = ActivityMonitor::new(self.sessions.clone(), self.config.activity_interval());
        self.monitor = Some((stop_tx, monitor.spawn(stop_rx)));
    }

    pub fn active_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_counted_active()).count()
    }

    /// Wait until at least one session is Active, up to the configured startup timeout.
    pub async fn wait_for_startup(&self) -> Result<usize, SupervisorError> {
        let timeout = self.config.startup_timeout();
        let deadline = Instant::now() + timeout;
        loop {
            let active = self.active_count();
            if active > 0 {
                info!("{} of {} sessions active", active, self.sessions.len());
                return Ok(active);
            }
            if self.sessions.iter().all(|s| s.state().is_terminal()) {
                break;
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            tokio::time::sleep(left.min(STARTUP_POLL)).await;
        }
        error!("No active camera sessions after {:?}", timeout);
        Err(SupervisorError::NoActiveSessions(timeout))
    }

    /// Snapshot every session and compose one mosaic.
    pub fn render_cycle(&self) -> Mosaic {
        let started = Instant::now();
        let cell = self.cell_size();
        let fill = Rgb(self.config.display.fill);

        let tiles: Vec<Tile> = self
            .sessions
            .iter()
            .map(|session| self.display_tile(session.snapshot(), cell, fill))
            .collect();
        let mosaic = mosaic::compose_mosaic(&tiles, cell, fill, self.config.display.label_font);

        metrics::histogram!("compose_time_seconds").record(started.elapsed().as_secs_f64());
        metrics::counter!("mosaics_rendered").increment(1);
        mosaic
    }

    fn display_tile(&self, snapshot: SessionSnapshot, cell: CellSize, fill: Rgb<u8>) -> Tile {
        let image = snapshot
            .is_live()
            .then(|| snapshot.frame.as_ref().and_then(|f| f.to_rgb_image()))
            .flatten();
        let Some(mut image) = image else {
            return Tile::Offline(snapshot.name);
        };

        for annotator in &self.annotators {
            annotator.annotate(&mut image);
        }
        let mut cell_image = mosaic::fit_to_cell(&image, cell, fill);
        overlay::annotate_live(
            &mut cell_image,
            &snapshot.name,
            snapshot.motion,
            snapshot.recording,
            self.config.display.label_font,
        );
        Tile::Live(cell_image)
    }

    /// Compose and deliver mosaics at the target rate until `shutdown` resolves
    /// or the consumer goes away.
    pub async fn render_loop<F>(&self, output: &flume::Sender<Mosaic>, shutdown: F) -> StopReason
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let interval = self.config.frame_interval();
        loop {
            let started = Instant::now();
            match output.try_send(self.render_cycle()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    metrics::counter!("mosaics_dropped").increment(1);
                }
                Err(TrySendError::Disconnected(_)) => {
                    info!("Display consumer disconnected, stopping");
                    return StopReason::ConsumerGone;
                }
            }

            let delay = interval.saturating_sub(started.elapsed()).max(MIN_CYCLE_DELAY);
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Stop signal received");
                    return StopReason::Signal;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Launch, gate on startup, render until stopped, then shut down.
    #[instrument(name = "supervisor", skip_all)]
    pub async fn run<F>(mut self, output: flume::Sender<Mosaic>, shutdown: F) -> Result<(), SupervisorError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.launch();

        let startup = tokio::select! {
            result = self.wait_for_startup() => Some(result),
            _ = &mut shutdown => None,
        };
        match startup {
            Some(Ok(_)) => {
                let reason = self.render_loop(&output, &mut shutdown).await;
                debug!(?reason, "Render loop finished");
                self.shutdown().await;
                Ok(())
            }
            Some(Err(e)) => {
                self.shutdown().await;
                Err(e)
            }
            None => {
                info!("Stop signal received during startup");
                self.shutdown().await;
                Ok(())
            }
        }
    }

    /// Stop every worker and wait for all of them. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        info!("Shutting down {} sessions", self.sessions.len());
        for session in self.sessions.iter() {
            session.request_stop();
        }
        if let Some((stop, task)) = self.monitor.take() {
            let _ = stop.send(true);
            if let Err(e) = task.await {
                warn!("Activity monitor task failed: {}", e);
            }
        }

        for (id, worker) in self.workers.drain(..).enumerate() {
            match worker.await {
                Ok(SessionExit::Stopped) => debug!(session = id, "Worker stopped"),
                Ok(SessionExit::Failed(e)) => debug!(session = id, "Worker had failed: {}", e),
                Err(e) => error!(session = id, "Worker join failed: {}", e),
            }
        }

        if self.config.display.snapshot_on_exit {
            self.save_last_frames();
        }
        info!("All sessions stopped");
    }

    /// Write each session's last frame as `last_frame_<id>.jpg` in the recording directory.
    fn save_last_frames(&self) -> Vec<PathBuf> {
        let directory = &self.config.recording.directory;
        if let Err(e) = std::fs::create_dir_all(directory) {
            warn!("Cannot create {}: {}", directory.display(), e);
            return Vec::new();
        }

        let mut saved = Vec::new();
        for session in self.sessions.iter() {
            let snapshot = session.snapshot();
            let Some(image) = snapshot.frame.as_ref().and_then(|f| f.to_rgb_image()) else {
                continue;
            };
            let path = directory.join(format!("last_frame_{}.jpg", snapshot.id));
            match image.save(&path) {
                Ok(()) => {
                    info!(session = snapshot.id, "Saved last frame: {}", path.display());
                    saved.push(path);
                }
                Err(e) => warn!(session = snapshot.id, "Failed to save {}: {}", path.display(), e),
            }
        }
        saved
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // Blocking workers outlive their JoinHandles; make sure they wind down
        for session in self.sessions.iter() {
            session.request_stop();
        }
    }
}
