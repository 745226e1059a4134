#![allow(dead_code)]

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use argus::capture::{FrameSource, SourceConnector};
use argus::error::SourceError;
use argus::utils::StorageProbe;
use argus::{Config, Frame, StreamConfig};
use image::{Rgb, RgbImage};

pub const MOVING: &str = "fake://moving";
pub const DOWN: &str = "fake://down";
/// Refuses the first open, then connects to a stream that never sends a frame.
pub const SILENT: &str = "fake://silent";

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;
const BLOCK: u32 = 16;
const FRAME_GAP: Duration = Duration::from_millis(5);

/// `fake://moving` streams a block that shifts every frame, `fake://silent` connects
/// on its second try but never delivers; anything else refuses to open.
#[derive(Default)]
pub struct FakeCameras {
    pub opens: AtomicU32,
    silent_opens: AtomicU32,
}

impl SourceConnector for FakeCameras {
    fn open(&self, uri: &str) -> Result<Box<dyn FrameSource>, SourceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if uri == MOVING {
            Ok(Box::new(MovingBlock { sequence: 0 }))
        } else if uri == SILENT && self.silent_opens.fetch_add(1, Ordering::SeqCst) > 0 {
            Ok(Box::new(Silent))
        } else {
            Err(SourceError::Open {
                uri: uri.to_string(),
                reason: "connection refused".into(),
            })
        }
    }
}

struct MovingBlock {
    sequence: u64,
}

impl FrameSource for MovingBlock {
    fn read(&mut self, _wait: Duration) -> Result<Option<Frame>, SourceError> {
        std::thread::sleep(FRAME_GAP);
        self.sequence += 1;
        let x0 = (self.sequence as u32 * 8) % (WIDTH - BLOCK);
        let image = RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
            if (x0..x0 + BLOCK).contains(&x) && (16..16 + BLOCK).contains(&y) {
                Rgb([240, 240, 240])
            } else {
                Rgb([30, 30, 40])
            }
        });
        Ok(Some(Frame::from_rgb(image, self.sequence, Instant::now())))
    }

    fn fps(&self) -> Option<f64> {
        Some(200.0)
    }

    fn close(&mut self) {}
}

struct Silent;

impl FrameSource for Silent {
    fn read(&mut self, wait: Duration) -> Result<Option<Frame>, SourceError> {
        std::thread::sleep(wait.min(Duration::from_millis(50)));
        Ok(None)
    }

    fn close(&mut self) {}
}

/// Reports a fixed amount of free space.
pub struct FixedSpace(pub u64);

impl StorageProbe for FixedSpace {
    fn available_bytes(&self, _directory: &Path) -> io::Result<u64> {
        Ok(self.0)
    }
}

pub fn config(uris: &[&str], directory: &Path) -> Config {
    let mut config = Config::default();
    config.streams = uris
        .iter()
        .enumerate()
        .map(|(i, uri)| StreamConfig::new(*uri, format!("Cam {i}")))
        .collect();
    config.display.cell_width = 80;
    config.display.cell_height = 60;
    config.display.target_fps = 50;
    config.session.max_reconnects = 1;
    config.session.reconnect_delay_ms = 10;
    config.recording.directory = directory.to_path_buf();
    config.recording.record_on_motion = false;
    config.supervisor.startup_timeout_secs = 2.0;
    config.supervisor.activity_interval_ms = 100;
    config
}

pub fn shared(config: Config) -> Arc<Config> {
    Arc::new(config)
}
