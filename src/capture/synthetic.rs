//! Synthetic test-pattern transport for `synthetic://` URIs
//!
//! Produces a static gradient with a bright block that periodically sweeps
//! across the scene, so motion detection and recording can be exercised
//! without cameras. Recognised query parameters:
//! `fps=<n>`, `size=<w>x<h>`, `offline` (every open fails).

use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};
use tracing::info;

use super::source::{FrameSource, SourceConnector};
use super::Frame;
use crate::error::SourceError;

pub const SCHEME: &str = "synthetic://";

/// Frames between the start of two block sweeps.
const SWEEP_PERIOD: u64 = 150;
/// Frames a sweep lasts.
const SWEEP_LENGTH: u64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub offline: bool,
}

impl SyntheticConfig {
    pub fn parse(uri: &str) -> Result<Self, SourceError> {
        let rest = uri
            .strip_prefix(SCHEME)
            .ok_or_else(|| SourceError::UnsupportedUri(uri.to_string()))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));

        let mut config = Self {
            name: name.to_string(),
            width: 320,
            height: 240,
            fps: 15.0,
            offline: false,
        };

        let invalid = |param: &str| SourceError::Open {
            uri: uri.to_string(),
            reason: format!("bad parameter `{param}`"),
        };
        for param in query.split('&').filter(|p| !p.is_empty()) {
            match param.split_once('=') {
                Some(("fps", v)) => {
                    config.fps = v.parse::<f64>().ok().filter(|f| *f > 0.0).ok_or_else(|| invalid(param))?
                }
                Some(("size", v)) => {
                    let (w, h) = v.split_once('x').ok_or_else(|| invalid(param))?;
                    config.width = w.parse::<u32>().ok().filter(|w| *w > 0).ok_or_else(|| invalid(param))?;
                    config.height = h.parse::<u32>().ok().filter(|h| *h > 0).ok_or_else(|| invalid(param))?;
                }
                None if param == "offline" => config.offline = true,
                _ => return Err(invalid(param)),
            }
        }
        Ok(config)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticConnector;

impl SourceConnector for SyntheticConnector {
    fn open(&self, uri: &str) -> Result<Box<dyn FrameSource>, SourceError> {
        let config = SyntheticConfig::parse(uri)?;
        if config.offline {
            return Err(SourceError::Open {
                uri: uri.to_string(),
                reason: "stream is offline".into(),
            });
        }
        info!("Synthetic source {} opened ({}x{} @ {} fps)", config.name, config.width, config.height, config.fps);
        Ok(Box::new(SyntheticSource::new(config)))
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    background: RgbImage,
    sequence: u64,
    next_due: Instant,
    closed: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let background = RgbImage::from_fn(config.width, config.height, |x, y| {
            let shade = ((x + y) * 96 / (config.width + config.height)) as u8;
            Rgb([shade, shade, shade.saturating_add(24)])
        });
        Self {
            config,
            background,
            sequence: 0,
            next_due: Instant::now(),
            closed: false,
        }
    }

    fn render(&self) -> RgbImage {
        let mut image = self.background.clone();
        let phase = self.sequence % SWEEP_PERIOD;
        if phase < SWEEP_LENGTH {
            let side = (self.config.height / 3).max(1);
            let travel = self.config.width.saturating_sub(side);
            let x0 = (u64::from(travel) * phase / SWEEP_LENGTH) as u32;
            let y0 = (self.config.height - side) / 2;
            for y in y0..y0 + side {
                for x in x0..(x0 + side).min(self.config.width) {
                    image.put_pixel(x, y, Rgb([235, 235, 235]));
                }
            }
        }
        image
    }
}

impl FrameSource for SyntheticSource {
    fn read(&mut self, wait: Duration) -> Result<Option<Frame>, SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        let now = Instant::now();
        let pending = self.next_due.saturating_duration_since(now);
        if pending > wait {
            std::thread::sleep(wait);
            return Ok(None);
        }
        std::thread::sleep(pending);

        self.sequence += 1;
        self.next_due = self.next_due.max(now) + Duration::from_secs_f64(1.0 / self.config.fps);
        Ok(Some(Frame::from_rgb(self.render(), self.sequence, Instant::now())))
    }

    fn fps(&self) -> Option<f64> {
        Some(self.config.fps)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
