//! Grid composite of per-session display frames
//!
//! N slots are laid out row-major on a grid with `cols = max(1, floor(sqrt N))`
//! and `rows = ceil(N / cols)`. Every cell has the same size; frames are scaled
//! to fit with their aspect ratio kept and padded with the fill colour, never
//! cropped. Cells past the last slot are plain fill.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::display::overlay::{self, LabelFont};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MosaicLayout {
    pub cols: u32,
    pub rows: u32,
}

impl MosaicLayout {
    pub fn for_count(n: usize) -> Self {
        let cols = ((n as f64).sqrt().floor() as u32).max(1);
        let rows = (n as u32).div_ceil(cols);
        Self { cols, rows }
    }

    /// Cell origin of slot `index` (row-major).
    pub fn origin(&self, index: usize, cell: CellSize) -> (u32, u32) {
        let index = index as u32;
        ((index % self.cols) * cell.width, (index / self.cols) * cell.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSize {
    pub width: u32,
    pub height: u32,
}

/// One composed output frame.
#[derive(Debug, Clone)]
pub struct Mosaic {
    pub layout: MosaicLayout,
    pub image: RgbImage,
}

/// One grid slot: a live frame, or the name of an offline session.
#[derive(Debug, Clone)]
pub enum Tile {
    Live(RgbImage),
    Offline(String),
}

/// Compose `tiles` onto a `cols x rows` grid of `cell` sized cells.
pub fn compose_mosaic(tiles: &[Tile], cell: CellSize, fill: Rgb<u8>, font: LabelFont) -> Mosaic {
    let layout = MosaicLayout::for_count(tiles.len());
    let mut image = RgbImage::from_pixel(layout.cols * cell.width, layout.rows * cell.height, fill);

    for (index, tile) in tiles.iter().enumerate() {
        let rendered = match tile {
            Tile::Live(frame) if frame.width() > 0 && frame.height() > 0 => fit_to_cell(frame, cell, fill),
            Tile::Live(_) => overlay::offline_placeholder(cell.width, cell.height, "", fill, font),
            Tile::Offline(name) => overlay::offline_placeholder(cell.width, cell.height, name, fill, font),
        };
        let (x, y) = layout.origin(index, cell);
        imageops::replace(&mut image, &rendered, i64::from(x), i64::from(y));
    }

    Mosaic { layout, image }
}

/// Scale `frame` into `cell` keeping aspect ratio; top-left aligned, padded with `fill`.
pub fn fit_to_cell(frame: &RgbImage, cell: CellSize, fill: Rgb<u8>) -> RgbImage {
    let (w, h) = frame.dimensions();
    if (w, h) == (cell.width, cell.height) {
        return frame.clone();
    }

    let scale = f64::min(cell.width as f64 / w as f64, cell.height as f64 / h as f64);
    let scaled_w = ((w as f64 * scale).round() as u32).clamp(1, cell.width);
    let scaled_h = ((h as f64 * scale).round() as u32).clamp(1, cell.height);
    let scaled = imageops::resize(frame, scaled_w, scaled_h, FilterType::Triangle);

    let mut out = RgbImage::from_pixel(cell.width, cell.height, fill);
    imageops::replace(&mut out, &scaled, 0, 0);
    out
}
