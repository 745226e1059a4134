//! Normalisation of transport frames into RGB24

use image::{Rgb, RgbImage};
use jpeg_decoder::Decoder;

use super::frame::{Frame, FrameMetadata, PixelFormat};
use crate::error::DecodeError;

/// Decode any supported frame into an `Rgb24` frame. RGB24 input is passed through.
pub fn normalize(frame: Frame) -> Result<Frame, DecodeError> {
    if frame.is_valid_rgb() {
        return Ok(frame);
    }
    let image = decode_frame(&frame.data, &frame.meta)?;
    let mut normalized = Frame::from_rgb(image, frame.meta.sequence, frame.timestamp);
    if let Some(meta) = std::sync::Arc::get_mut(&mut normalized.meta) {
        meta.device_timestamp = frame.meta.device_timestamp;
    }
    Ok(normalized)
}

pub fn decode_frame(data: &[u8], meta: &FrameMetadata) -> Result<RgbImage, DecodeError> {
    match meta.format {
        PixelFormat::Mjpeg => decode_jpeg(data),
        PixelFormat::Rgb24 => packed_rgb(data, meta, false),
        PixelFormat::Bgr24 => packed_rgb(data, meta, true),
        PixelFormat::Yuyv4 => yuyv_to_rgb(data, meta),
        PixelFormat::Nv12 => nv12_to_rgb(data, meta),
    }
}

fn decode_jpeg(data: &[u8]) -> Result<RgbImage, DecodeError> {
    let mut decoder = Decoder::new(data);
    let pixels = decoder.decode()?;
    let info = decoder.info().ok_or(DecodeError::MissingInfo)?;
    let (width, height) = (u32::from(info.width), u32::from(info.height));

    let rgb = match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => pixels,
        jpeg_decoder::PixelFormat::L8 => pixels.iter().flat_map(|&l| [l, l, l]).collect(),
        jpeg_decoder::PixelFormat::CMYK32 => pixels
            .chunks_exact(4)
            .flat_map(|c| {
                let k = u32::from(c[3]);
                [
                    (u32::from(c[0]) * k / 255) as u8,
                    (u32::from(c[1]) * k / 255) as u8,
                    (u32::from(c[2]) * k / 255) as u8,
                ]
            })
            .collect(),
        other => return Err(DecodeError::UnsupportedJpeg(other)),
    };

    let actual = rgb.len();
    RgbImage::from_raw(width, height, rgb).ok_or(DecodeError::Geometry {
        format: PixelFormat::Mjpeg,
        width,
        height,
        expected: width as usize * height as usize * 3,
        actual,
    })
}

/// Row pitch in bytes, falling back to tight packing when the stride is unset.
fn row_bytes(meta: &FrameMetadata, bytes_per_pixel: usize) -> usize {
    let tight = meta.width as usize * bytes_per_pixel;
    (meta.stride as usize).max(tight)
}

fn check_len(data: &[u8], meta: &FrameMetadata, expected: usize) -> Result<(), DecodeError> {
    if meta.width == 0 || meta.height == 0 || data.len() < expected {
        return Err(DecodeError::Geometry {
            format: meta.format,
            width: meta.width,
            height: meta.height,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn packed_rgb(data: &[u8], meta: &FrameMetadata, swap: bool) -> Result<RgbImage, DecodeError> {
    let pitch = row_bytes(meta, 3);
    let rows = (meta.height as usize).saturating_sub(1);
    check_len(data, meta, pitch * rows + meta.width as usize * 3)?;

    Ok(RgbImage::from_fn(meta.width, meta.height, |x, y| {
        let i = y as usize * pitch + x as usize * 3;
        if swap {
            Rgb([data[i + 2], data[i + 1], data[i]])
        } else {
            Rgb([data[i], data[i + 1], data[i + 2]])
        }
    }))
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> Rgb<u8> {
    let y = f32::from(y);
    let u = f32::from(u) - 128.0;
    let v = f32::from(v) - 128.0;
    let clamp = |c: f32| c.round().clamp(0.0, 255.0) as u8;
    Rgb([
        clamp(y + 1.402 * v),
        clamp(y - 0.344_136 * u - 0.714_136 * v),
        clamp(y + 1.772 * u),
    ])
}

fn yuyv_to_rgb(data: &[u8], meta: &FrameMetadata) -> Result<RgbImage, DecodeError> {
    let pitch = row_bytes(meta, 2);
    let last_row = (meta.width as usize).div_ceil(2) * 4;
    let rows = (meta.height as usize).saturating_sub(1);
    check_len(data, meta, pitch * rows + last_row)?;

    Ok(RgbImage::from_fn(meta.width, meta.height, |x, y| {
        // Y0 U Y1 V macropixels
        let base = y as usize * pitch + (x as usize / 2) * 4;
        let luma = if x % 2 == 0 { data[base] } else { data[base + 2] };
        yuv_to_rgb(luma, data[base + 1], data[base + 3])
    }))
}

fn nv12_to_rgb(data: &[u8], meta: &FrameMetadata) -> Result<RgbImage, DecodeError> {
    let (w, h) = (meta.width as usize, meta.height as usize);
    let pitch = row_bytes(meta, 1);
    let chroma_pitch = pitch.max(w.div_ceil(2) * 2);
    let luma_len = pitch * h;
    check_len(data, meta, luma_len + chroma_pitch * h.div_ceil(2))?;

    let (luma, chroma) = data.split_at(luma_len);
    Ok(RgbImage::from_fn(meta.width, meta.height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let uv = (y / 2) * chroma_pitch + (x / 2) * 2;
        yuv_to_rgb(luma[y * pitch + x], chroma[uv], chroma[uv + 1])
    }))
}
