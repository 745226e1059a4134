//! Motion-triggered recording state machine
//!
//! `Idle -> Recording` when motion is asserted, recording is enabled and the
//! target has enough free space. The pre-roll buffer is drained into the sink
//! before the triggering frame. `Recording -> Idle` once no motion has been seen
//! for `min_record_time`; the artifact is then kept or, if smaller than
//! `min_file_size`, deleted.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use tracing::{debug, error, info, warn};

use crate::display::overlay;
use crate::error::RecordingError;
use crate::pipeline::ringbuf::RingBuffer;
use crate::utils::StorageProbe;
use crate::Frame;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
/// Source frame rates outside (0, MAX_SOURCE_FPS] are not trusted.
const MAX_SOURCE_FPS: f64 = 60.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSettings {
    pub record_on_motion: bool,
    pub min_record_time: Duration,
    pub directory: PathBuf,
    pub min_file_size: u64,
    pub min_disk_space_gb: f64,
    pub indicator: bool,
    pub default_fps: f64,
    pub preroll_frames: usize,
}

/// Geometry and rate handed to a sink when it is opened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinkParams {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// An open recording artifact, exclusively owned by one session worker.
pub trait RecordingSink: Send {
    fn write(&mut self, frame: &Frame) -> Result<(), RecordingError>;

    /// Flush and close. The artifact is complete on disk once this returns.
    fn finish(self: Box<Self>) -> Result<(), RecordingError>;
}

/// Creates sinks; the encoder behind it is opaque to the controller.
pub trait SinkFactory: Send + Sync {
    /// File extension of produced artifacts, without the dot.
    fn extension(&self) -> &str;

    fn create(&self, path: &Path, params: SinkParams) -> Result<Box<dyn RecordingSink>, RecordingError>;
}

/// Writes recordings as concatenated JPEG frames (`.mjpeg`).
#[derive(Debug, Clone, Copy)]
pub struct MjpegSinkFactory {
    pub quality: u8,
}

impl Default for MjpegSinkFactory {
    fn default() -> Self {
        Self { quality: 80 }
    }
}

impl SinkFactory for MjpegSinkFactory {
    fn extension(&self) -> &str {
        "mjpeg"
    }

    fn create(&self, path: &Path, _params: SinkParams) -> Result<Box<dyn RecordingSink>, RecordingError> {
        // Never truncate an existing recording
        let file = File::options().write(true).create_new(true).open(path)?;
        Ok(Box::new(MjpegFileSink {
            writer: BufWriter::new(file),
            quality: self.quality,
        }))
    }
}

struct MjpegFileSink {
    writer: BufWriter<File>,
    quality: u8,
}

impl RecordingSink for MjpegFileSink {
    fn write(&mut self, frame: &Frame) -> Result<(), RecordingError> {
        if !frame.is_valid_rgb() {
            return Err(RecordingError::SinkWrite(format!(
                "frame {} is not RGB24",
                frame.meta.sequence
            )));
        }
        JpegEncoder::new_with_quality(&mut self.writer, self.quality)
            .encode(&frame.data, frame.width(), frame.height(), ExtendedColorType::Rgb8)
            .map_err(|e| RecordingError::SinkWrite(e.to_string()))
    }

    fn finish(mut self: Box<Self>) -> Result<(), RecordingError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

#[derive(Debug)]
pub enum RecordingOutcome {
    Saved { path: PathBuf, bytes: u64, frames: u64 },
    Discarded { path: PathBuf, bytes: u64 },
}

#[derive(Debug)]
pub enum RecordingEvent {
    Started { path: PathBuf, preroll: usize },
    Denied(RecordingError),
    Stopped(RecordingOutcome),
}

struct ActiveRecording {
    sink: Box<dyn RecordingSink>,
    path: PathBuf,
    frames: u64,
}

pub struct RecordingController {
    session_id: usize,
    settings: RecordingSettings,
    preroll: RingBuffer,
    sinks: Arc<dyn SinkFactory>,
    storage: Arc<dyn StorageProbe>,
    active: Option<ActiveRecording>,
    last_motion: Option<Instant>,
    source_fps: Option<f64>,
    denial_reported: bool,
}

impl RecordingController {
    pub fn new(
        session_id: usize,
        settings: RecordingSettings,
        sinks: Arc<dyn SinkFactory>,
        storage: Arc<dyn StorageProbe>,
    ) -> Self {
        Self {
            session_id,
            preroll: RingBuffer::new(settings.preroll_frames),
            settings,
            sinks,
            storage,
            active: None,
            last_motion: None,
            source_fps: None,
            denial_reported: false,
        }
    }

    pub fn state(&self) -> RecorderState {
        if self.active.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn preroll_len(&self) -> usize {
        self.preroll.len()
    }

    /// Frame rate reported by the current source, used for new recordings.
    pub fn set_source_fps(&mut self, fps: Option<f64>) {
        self.source_fps = fps;
    }

    /// Advance the state machine by one frame.
    pub fn on_frame(&mut self, frame: &Frame, motion: bool, now: Instant) -> Option<RecordingEvent> {
        if motion {
            self.last_motion = Some(now);
        }

        if self.active.is_none() {
            if !(motion && self.settings.record_on_motion) {
                self.preroll.push(frame.clone());
                return None;
            }
            return match self.start(frame) {
                Ok(event) => {
                    self.denial_reported = false;
                    Some(event)
                }
                Err(e) => {
                    if !self.denial_reported {
                        warn!(session = self.session_id, "Recording not started: {}", e);
                        self.denial_reported = true;
                    }
                    metrics::counter!("recordings_denied").increment(1);
                    self.preroll.push(frame.clone());
                    Some(RecordingEvent::Denied(e))
                }
            };
        }

        let silence = self
            .last_motion
            .map_or(Duration::MAX, |at| now.saturating_duration_since(at));
        if silence >= self.settings.min_record_time {
            let outcome = self.stop()?;
            self.preroll.push(frame.clone());
            return Some(RecordingEvent::Stopped(outcome));
        }

        let annotated = self.annotate(frame);
        let write = self.active.as_mut().map(|rec| {
            rec.frames += 1;
            rec.sink.write(&annotated)
        });
        if let Some(Err(e)) = write {
            error!(session = self.session_id, "Recording write failed, closing: {}", e);
            return self.stop().map(RecordingEvent::Stopped);
        }
        None
    }

    /// Close any open recording and discard the pre-roll. Safe to call repeatedly.
    pub fn finalize(&mut self) -> Option<RecordingOutcome> {
        self.preroll.clear();
        self.last_motion = None;
        self.stop()
    }

    fn start(&mut self, trigger: &Frame) -> Result<RecordingEvent, RecordingError> {
        let directory = self.settings.directory.clone();
        fs::create_dir_all(&directory).map_err(|e| RecordingError::SinkOpen {
            path: directory.clone(),
            reason: e.to_string(),
        })?;

        let available = self
            .storage
            .available_bytes(&directory)
            .map_err(|source| RecordingError::SpaceProbe {
                directory: directory.clone(),
                source,
            })?;
        let available_gb = available as f64 / BYTES_PER_GB;
        if available_gb < self.settings.min_disk_space_gb {
            return Err(RecordingError::InsufficientSpace {
                directory,
                available_gb,
                required_gb: self.settings.min_disk_space_gb,
            });
        }

        let path = unused_path(&directory.join(recording_file_name(
            self.session_id,
            &chrono::Local::now(),
            self.sinks.extension(),
        )));
        let fps = self
            .source_fps
            .filter(|fps| *fps > 0.0 && *fps <= MAX_SOURCE_FPS)
            .unwrap_or(self.settings.default_fps);
        let params = SinkParams {
            width: trigger.width(),
            height: trigger.height(),
            fps,
        };
        let mut sink = self
            .sinks
            .create(&path, params)
            .map_err(|e| RecordingError::SinkOpen {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let preroll = self.preroll.drain();
        let preroll_len = preroll.len();
        let annotated = self.annotate(trigger);
        let primed = preroll
            .iter()
            .chain(std::iter::once(&annotated))
            .try_for_each(|frame| sink.write(frame));
        if let Err(e) = primed {
            let _ = sink.finish();
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        info!(
            session = self.session_id,
            preroll = preroll_len,
            fps,
            "Started recording {}",
            path.display()
        );
        metrics::counter!("recordings_started").increment(1);
        self.active = Some(ActiveRecording {
            sink,
            path: path.clone(),
            frames: preroll_len as u64 + 1,
        });
        Ok(RecordingEvent::Started {
            path,
            preroll: preroll_len,
        })
    }

    fn stop(&mut self) -> Option<RecordingOutcome> {
        let ActiveRecording { sink, path, frames } = self.active.take()?;
        if let Err(e) = sink.finish() {
            error!(session = self.session_id, "Failed to close {}: {}", path.display(), e);
        }

        let bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if bytes < self.settings.min_file_size {
            match fs::remove_file(&path) {
                Ok(()) => info!(session = self.session_id, bytes, "Removed small recording file: {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(session = self.session_id, "Failed to remove {}: {}", path.display(), e),
            }
            metrics::counter!("recordings_discarded").increment(1);
            return Some(RecordingOutcome::Discarded { path, bytes });
        }

        info!(session = self.session_id, bytes, frames, "Recording saved: {}", path.display());
        metrics::counter!("recordings_saved").increment(1);
        Some(RecordingOutcome::Saved { path, bytes, frames })
    }

    fn annotate(&self, frame: &Frame) -> Frame {
        if !self.settings.indicator {
            return frame.clone();
        }
        match frame.to_rgb_image() {
            Some(mut image) => {
                overlay::draw_recording_marker(&mut image);
                Frame::from_rgb(image, frame.meta.sequence, frame.timestamp)
            }
            None => {
                debug!(session = self.session_id, "Skipping indicator on non-RGB frame");
                frame.clone()
            }
        }
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        self.finalize();
    }
}

/// `path` itself if free, otherwise the first free `<stem>_<n>.<ext>`.
fn unused_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());
    (1u32..)
        .map(|n| {
            let name = match &extension {
                Some(ext) => format!("{stem}_{n}.{ext}"),
                None => format!("{stem}_{n}"),
            };
            path.with_file_name(name)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// `session_<id>_<YYYYmmdd-HHMMSS-mmm>.<ext>`
pub fn recording_file_name<Tz>(session_id: usize, at: &chrono::DateTime<Tz>, extension: &str) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "session_{}_{}.{}",
        session_id,
        at.format("%Y%m%d-%H%M%S-%3f"),
        extension
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;

    /// Writes `bytes_per_frame` bytes per frame and remembers sequence numbers.
    struct CountingSinks {
        bytes_per_frame: usize,
        written: Arc<Mutex<Vec<u64>>>,
        opened: Arc<Mutex<u32>>,
    }

    struct CountingSink {
        file: File,
        bytes_per_frame: usize,
        written: Arc<Mutex<Vec<u64>>>,
    }

    impl SinkFactory for CountingSinks {
        fn extension(&self) -> &str {
            "bin"
        }

        fn create(&self, path: &Path, _params: SinkParams) -> Result<Box<dyn RecordingSink>, RecordingError> {
            *self.opened.lock().unwrap() += 1;
            Ok(Box::new(CountingSink {
                file: File::create(path)?,
                bytes_per_frame: self.bytes_per_frame,
                written: self.written.clone(),
            }))
        }
    }

    impl RecordingSink for CountingSink {
        fn write(&mut self, frame: &Frame) -> Result<(), RecordingError> {
            self.written.lock().unwrap().push(frame.meta.sequence);
            self.file.write_all(&vec![0u8; self.bytes_per_frame])?;
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<(), RecordingError> {
            self.file.sync_all()?;
            Ok(())
        }
    }

    struct FixedSpace(u64);

    impl StorageProbe for FixedSpace {
        fn available_bytes(&self, _directory: &Path) -> std::io::Result<u64> {
            Ok(self.0)
        }
    }

    struct Harness {
        controller: RecordingController,
        written: Arc<Mutex<Vec<u64>>>,
        opened: Arc<Mutex<u32>>,
        dir: tempfile::TempDir,
        t0: Instant,
    }

    impl Harness {
        fn new(bytes_per_frame: usize, free_gb: f64, tweak: impl FnOnce(&mut RecordingSettings)) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut settings = RecordingSettings {
                record_on_motion: true,
                min_record_time: Duration::from_secs(5),
                directory: dir.path().join("rec"),
                min_file_size: 1024,
                min_disk_space_gb: 1.0,
                indicator: false,
                default_fps: 20.0,
                preroll_frames: 3,
            };
            tweak(&mut settings);
            let written = Arc::new(Mutex::new(Vec::new()));
            let opened = Arc::new(Mutex::new(0));
            let sinks = Arc::new(CountingSinks {
                bytes_per_frame,
                written: written.clone(),
                opened: opened.clone(),
            });
            let storage = Arc::new(FixedSpace((free_gb * BYTES_PER_GB) as u64));
            Self {
                controller: RecordingController::new(4, settings, sinks, storage),
                written,
                opened,
                dir,
                t0: Instant::now(),
            }
        }

        fn feed(&mut self, seq: u64, motion: bool, at_secs: u64) -> Option<RecordingEvent> {
            let frame = Frame::from_rgb(RgbImage::from_pixel(32, 24, Rgb([9, 9, 9])), seq, self.t0);
            let now = self.t0 + Duration::from_secs(at_secs);
            self.controller.on_frame(&frame, motion, now)
        }

        fn written(&self) -> Vec<u64> {
            self.written.lock().unwrap().clone()
        }

        fn files(&self) -> Vec<PathBuf> {
            match fs::read_dir(self.dir.path().join("rec")) {
                Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
                Err(_) => Vec::new(),
            }
        }
    }

    #[test]
    fn start_writes_full_preroll_before_live_frames() {
        let mut h = Harness::new(512, 10.0, |_| {});
        for seq in 1..=5 {
            assert!(h.feed(seq, false, 0).is_none());
        }
        // Capacity 3 keeps 3, 4, 5
        let started = h.feed(6, true, 1);
        assert!(matches!(started, Some(RecordingEvent::Started { preroll: 3, .. })));
        h.feed(7, false, 2);
        assert_eq!(h.written(), vec![3, 4, 5, 6, 7]);
        assert_eq!(h.controller.preroll_len(), 0);
    }

    #[test]
    fn motion_while_recording_does_not_restart() {
        let mut h = Harness::new(512, 10.0, |_| {});
        h.feed(1, true, 0);
        for seq in 2..6 {
            assert!(h.feed(seq, true, seq).is_none());
            assert_eq!(h.controller.state(), RecorderState::Recording);
        }
        assert_eq!(*h.opened.lock().unwrap(), 1);
    }

    #[test]
    fn stops_once_silence_reaches_min_record_time() {
        let mut h = Harness::new(512, 10.0, |_| {});
        h.feed(1, true, 10);
        assert!(h.feed(2, false, 14).is_none());
        assert!(h.controller.is_recording());

        let stopped = h.feed(3, false, 15);
        assert!(matches!(stopped, Some(RecordingEvent::Stopped(RecordingOutcome::Saved { frames: 2, .. }))));
        assert_eq!(h.controller.state(), RecorderState::Idle);
        // The stopping frame goes back into the pre-roll, not the file
        assert_eq!(h.written(), vec![1, 2]);
        assert_eq!(h.controller.preroll_len(), 1);
    }

    #[test]
    fn small_artifacts_are_deleted_large_ones_kept() {
        // 2 frames * 400 bytes = 800 < 1024
        let mut small = Harness::new(400, 10.0, |_| {});
        small.feed(1, true, 0);
        small.feed(2, false, 1);
        let outcome = small.controller.finalize();
        assert!(matches!(outcome, Some(RecordingOutcome::Discarded { bytes: 800, .. })));
        assert!(small.files().is_empty());

        // Exactly at the threshold is retained
        let mut exact = Harness::new(512, 10.0, |_| {});
        exact.feed(1, true, 0);
        exact.feed(2, false, 1);
        let outcome = exact.controller.finalize();
        assert!(matches!(outcome, Some(RecordingOutcome::Saved { bytes: 1024, .. })));
        assert_eq!(exact.files().len(), 1);
    }

    #[test]
    fn back_to_back_recordings_never_share_a_file() {
        let mut h = Harness::new(2048, 10.0, |s| s.min_record_time = Duration::ZERO);
        assert!(matches!(h.feed(1, true, 0), Some(RecordingEvent::Started { .. })));
        assert!(matches!(h.feed(2, false, 0), Some(RecordingEvent::Stopped(RecordingOutcome::Saved { .. }))));
        let Some(RecordingEvent::Started { path, .. }) = h.feed(3, true, 0) else {
            panic!("second recording did not start");
        };
        assert!(matches!(h.controller.finalize(), Some(RecordingOutcome::Saved { .. })));

        let files = h.files();
        assert_eq!(files.len(), 2);
        assert!(files.contains(&path));
        for file in files {
            assert!(fs::metadata(&file).unwrap().len() >= 2048);
        }
    }

    #[test]
    fn taken_names_get_a_numeric_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session_0_20240309-070501-000.mjpeg");
        assert_eq!(unused_path(&path), path);

        fs::write(&path, b"kept").unwrap();
        fs::write(dir.path().join("session_0_20240309-070501-000_1.mjpeg"), b"kept").unwrap();
        assert_eq!(
            unused_path(&path),
            dir.path().join("session_0_20240309-070501-000_2.mjpeg")
        );
    }

    #[test]
    fn mjpeg_sink_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mjpeg");
        fs::write(&path, b"previous recording").unwrap();

        let params = SinkParams { width: 16, height: 16, fps: 20.0 };
        assert!(MjpegSinkFactory::default().create(&path, params).is_err());
        assert_eq!(fs::read(&path).unwrap(), b"previous recording");
    }

    #[test]
    fn insufficient_space_denies_without_state_change() {
        let mut h = Harness::new(512, 0.5, |_| {});
        h.feed(1, false, 0);
        let denied = h.feed(2, true, 1);
        assert!(matches!(
            denied,
            Some(RecordingEvent::Denied(ref e @ RecordingError::InsufficientSpace { .. })) if e.is_start_denied()
        ));
        assert_eq!(h.controller.state(), RecorderState::Idle);
        assert_eq!(h.controller.preroll_len(), 2);
        assert_eq!(*h.opened.lock().unwrap(), 0);
    }

    #[test]
    fn disabled_recording_never_starts() {
        let mut h = Harness::new(512, 10.0, |s| s.record_on_motion = false);
        assert!(h.feed(1, true, 0).is_none());
        assert!(!h.controller.is_recording());
    }

    #[test]
    fn files_are_named_after_session_and_time() {
        let mut h = Harness::new(512, 10.0, |_| {});
        let Some(RecordingEvent::Started { path, .. }) = h.feed(1, true, 0) else {
            panic!("recording did not start");
        };
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("session_4_"));
        assert!(name.ends_with(".bin"));

        let at = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(recording_file_name(2, &at, "mjpeg"), "session_2_20240309-070501-000.mjpeg");
    }

    #[test]
    fn mjpeg_sink_produces_jpeg_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mjpeg");
        let params = SinkParams { width: 16, height: 16, fps: 20.0 };
        let mut sink = MjpegSinkFactory::default().create(&path, params).unwrap();
        let frame = Frame::from_rgb(RgbImage::from_pixel(16, 16, Rgb([200, 10, 10])), 1, Instant::now());
        sink.write(&frame).unwrap();
        sink.write(&frame).unwrap();
        sink.finish().unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(bytes.windows(2).filter(|w| w == &[0xFF, 0xD8]).count(), 2);
    }
}
