use bytes::Bytes;
use image::{ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Frame data with zero-copy semantics
#[derive(Clone)]
pub struct Frame {
    /// Immutable frame data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
    pub device_timestamp: Option<Duration>, // Transport timestamp if available
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuyv4,
    Mjpeg,
    Nv12,
}

impl Frame {
    /// Wrap a decoded RGB image as an `Rgb24` frame.
    pub fn from_rgb(image: RgbImage, sequence: u64, timestamp: Instant) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: Bytes::from(image.into_raw()),
            meta: Arc::new(FrameMetadata {
                sequence,
                width,
                height,
                stride: width * 3,
                format: PixelFormat::Rgb24,
                device_timestamp: None,
            }),
            timestamp,
        }
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    /// An `Rgb24` frame whose buffer matches its declared geometry.
    pub fn is_valid_rgb(&self) -> bool {
        self.meta.format == PixelFormat::Rgb24
            && self.meta.width > 0
            && self.meta.height > 0
            && self.data.len() == (self.meta.width as usize) * (self.meta.height as usize) * 3
    }

    /// Borrow the pixels as an image view. `None` unless the frame is valid RGB24.
    pub fn rgb_view(&self) -> Option<ImageBuffer<Rgb<u8>, &[u8]>> {
        if !self.is_valid_rgb() {
            return None;
        }
        ImageBuffer::from_raw(self.meta.width, self.meta.height, &self.data[..])
    }

    /// Owned RGB copy of the pixels.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        if !self.is_valid_rgb() {
            return None;
        }
        RgbImage::from_raw(self.meta.width, self.meta.height, self.data.to_vec())
    }

    /// Copy with its own backing buffer, sharing nothing with `self`.
    pub fn detached(&self) -> Self {
        Self {
            data: Bytes::copy_from_slice(&self.data),
            meta: Arc::new(FrameMetadata::clone(&self.meta)),
            timestamp: self.timestamp,
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.meta.sequence)
            .field("size", &(self.meta.width, self.meta.height))
            .field("format", &self.meta.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}
