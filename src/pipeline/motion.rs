//! Adaptive background subtraction motion detector
//!
//! Each pixel keeps a running gaussian (mean, variance) of its luma. A pixel is
//! foreground when its squared distance from the mean exceeds
//! `var_threshold` variances. Foreground pixels are grouped into 8-connected
//! regions and motion is asserted when any region is larger than
//! `motion_threshold` pixels.

use image::{imageops, GrayImage, Luma};
use tracing::trace;

use crate::Frame;

const INITIAL_VARIANCE: f32 = 15.0 * 15.0;
const MIN_VARIANCE: f32 = 4.0 * 4.0;
const MAX_VARIANCE: f32 = 75.0 * 75.0;

const FOREGROUND: u8 = 255;
/// Mask values at or above this are treated as foreground.
const MASK_THRESHOLD: u8 = 254;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSettings {
    /// Minimum region area, in pixels, that counts as motion
    pub motion_threshold: f64,
    /// Number of frames the background adapts over
    pub history: u32,
    /// Squared-distance threshold in units of variance
    pub var_threshold: f32,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            motion_threshold: 500.0,
            history: 500,
            var_threshold: 16.0,
        }
    }
}

struct BackgroundModel {
    width: u32,
    height: u32,
    mean: Vec<f32>,
    variance: Vec<f32>,
    frames_seen: u32,
}

impl BackgroundModel {
    fn seed(gray: &GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        Self {
            width,
            height,
            mean: gray.as_raw().iter().map(|&v| f32::from(v)).collect(),
            variance: vec![INITIAL_VARIANCE; gray.len()],
            frames_seen: 1,
        }
    }

    /// Classify each pixel against the model, then fold the frame into it.
    fn apply(&mut self, gray: &GrayImage, history: u32, var_threshold: f32) -> GrayImage {
        self.frames_seen = self.frames_seen.saturating_add(1);
        // Learn fast while the model is young, then settle to 1/history
        let alpha = 1.0 / self.frames_seen.min(history.max(1)) as f32;

        let mut mask = GrayImage::new(self.width, self.height);
        for (i, (&value, out)) in gray.as_raw().iter().zip(mask.iter_mut()).enumerate() {
            let value = f32::from(value);
            let diff = value - self.mean[i];
            let dist2 = diff * diff;
            if dist2 > var_threshold * self.variance[i] {
                *out = FOREGROUND;
            }
            self.mean[i] += alpha * diff;
            self.variance[i] =
                (self.variance[i] + alpha * (dist2 - self.variance[i])).clamp(MIN_VARIANCE, MAX_VARIANCE);
        }
        mask
    }
}

/// Per-session motion detector.
pub struct MotionDetector {
    settings: MotionSettings,
    model: Option<BackgroundModel>,
}

impl MotionDetector {
    pub fn new(settings: MotionSettings) -> Self {
        Self {
            settings,
            model: None,
        }
    }

    /// Feed one frame; returns whether it contains motion.
    ///
    /// The first frame (and the first after a resolution change) seeds the
    /// background and never reports motion. Frames that are not valid RGB24
    /// are ignored.
    pub fn apply(&mut self, frame: &Frame) -> bool {
        let Some(view) = frame.rgb_view() else {
            return false;
        };
        let gray = imageops::grayscale(&view);

        let fits = matches!(&self.model, Some(m) if m.width == gray.width() && m.height == gray.height());
        if !fits {
            self.model = Some(BackgroundModel::seed(&gray));
            return false;
        }
        let Some(model) = self.model.as_mut() else {
            return false;
        };

        let mask = model.apply(&gray, self.settings.history, self.settings.var_threshold);
        let thresholded = threshold(&mask, MASK_THRESHOLD);
        let largest = largest_region_exceeding(&thresholded, self.settings.motion_threshold);
        trace!(sequence = frame.meta.sequence, ?largest, "motion pass");
        largest.is_some()
    }

    /// Drop the learned background, e.g. after the stream reconnects.
    pub fn reset(&mut self) {
        self.model = None;
    }
}

fn threshold(mask: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        let Luma([v]) = *mask.get_pixel(x, y);
        Luma([if v >= level { FOREGROUND } else { 0 }])
    })
}

/// Area of the first 8-connected foreground region larger than `min_area`, if any.
fn largest_region_exceeding(mask: &GrayImage, min_area: f64) -> Option<usize> {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    let pixels = mask.as_raw();
    let mut visited = vec![false; pixels.len()];
    let mut stack = Vec::new();

    for start in 0..pixels.len() {
        if visited[start] || pixels[start] != FOREGROUND {
            continue;
        }
        visited[start] = true;
        stack.push(start);
        let mut area = 0usize;

        while let Some(i) = stack.pop() {
            area += 1;
            let (x, y) = ((i % w) as isize, (i / w) as isize);
            for dy in -1..=1isize {
                for dx in -1..=1isize {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                        continue;
                    }
                    let n = ny as usize * w + nx as usize;
                    if !visited[n] && pixels[n] == FOREGROUND {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }
        }

        if area as f64 > min_area {
            return Some(area);
        }
    }
    None
}
