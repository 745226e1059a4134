//! Frame overlays: text labels, recording marker, offline placeholders

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);

const GLYPH: u32 = 8;
const MARGIN: u32 = 10;
const MARKER_SIZE: u32 = 20;

/// Label sizes. Resolved from configuration at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelFont {
    Small,
    #[default]
    Medium,
    Large,
}

impl LabelFont {
    /// Pixels per glyph dot.
    pub fn scale(self) -> u32 {
        match self {
            LabelFont::Small => 1,
            LabelFont::Medium => 2,
            LabelFont::Large => 3,
        }
    }

    pub fn line_height(self) -> u32 {
        GLYPH * self.scale()
    }

    pub fn text_width(self, text: &str) -> u32 {
        text.chars().count() as u32 * GLYPH * self.scale()
    }
}

/// Pluggable overlay applied to live display frames (face boxes, people counts, ...).
pub trait FrameAnnotator: Send + Sync {
    fn name(&self) -> &str;

    fn annotate(&self, frame: &mut RgbImage);
}

/// Draw `text` with its top-left corner at (x, y). Pixels falling outside the image are clipped.
pub fn draw_text(image: &mut RgbImage, text: &str, x: u32, y: u32, color: Rgb<u8>, font: LabelFont) {
    let scale = font.scale();
    let (width, height) = image.dimensions();

    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            continue;
        };
        let origin_x = x + i as u32 * GLYPH * scale;
        if origin_x >= width {
            break;
        }
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH {
                if bits & (1 << col) == 0 {
                    continue;
                }
                for sy in 0..scale {
                    for sx in 0..scale {
                        let px = origin_x + col * scale + sx;
                        let py = y + row as u32 * scale + sy;
                        if px < width && py < height {
                            image.put_pixel(px, py, color);
                        }
                    }
                }
            }
        }
    }
}

/// Filled upward triangle in the top-right corner.
pub fn draw_recording_marker(image: &mut RgbImage) {
    let (width, height) = image.dimensions();
    if width < MARKER_SIZE + MARGIN || height < MARKER_SIZE + MARGIN {
        return;
    }
    let cx = (width - MARGIN - MARKER_SIZE / 2) as i64;
    let top = MARGIN / 2;
    for dy in 0..MARKER_SIZE {
        let half = i64::from(dy / 2);
        for x in (cx - half)..=(cx + half) {
            image.put_pixel(x as u32, top + dy, RED);
        }
    }
}

/// Solid frame carrying `<name> OFFLINE` roughly in the middle.
pub fn offline_placeholder(width: u32, height: u32, name: &str, fill: Rgb<u8>, font: LabelFont) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, fill);
    let label = if name.is_empty() {
        "OFFLINE".to_string()
    } else {
        format!("{name} OFFLINE")
    };
    let text_width = font.text_width(&label);
    let x = width.saturating_sub(text_width) / 2;
    let y = height.saturating_sub(font.line_height()) / 2;
    draw_text(&mut image, &label, x, y, WHITE, font);
    image
}

/// Stream name bottom-left, `MOTION` / `REC` badges top-left.
pub fn annotate_live(image: &mut RgbImage, name: &str, motion: bool, recording: bool, font: LabelFont) {
    let line = font.line_height();
    let name_y = image.height().saturating_sub(MARGIN + line);
    draw_text(image, name, MARGIN, name_y, WHITE, font);

    let mut y = MARGIN;
    if motion {
        draw_text(image, "MOTION", MARGIN, y, RED, font);
        y += line + line / 2;
    }
    if recording {
        draw_text(image, "REC", MARGIN, y, RED, font);
    }
}
