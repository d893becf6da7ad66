//! Decoding/re-encoding of opaque tile byte blobs.
//!
//! Grounded on the `versatiles_image::format::{jpeg, png}` encode/decode
//! bridges between the [`image`] crate and a byte blob, generalized from
//! named codecs to a caller-supplied format tag.

use crate::error::{RetileError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageEncoder};

/// Pixel dimensions of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Decode/re-encode opaque tile bytes.
pub trait ImageProbe: Send + Sync {
    /// Decode `bytes` and return its pixel dimensions, or `None` if the
    /// bytes are not a decodable image.
    fn probe(&self, bytes: &[u8]) -> Option<Dimensions>;

    /// Re-encode `bytes` in `format_name` at `quality` (`0.0..=1.0`).
    ///
    /// # Errors
    /// `Config` if `quality` is outside `[0.0, 1.0]`; `Config` (tagged as
    /// unsupported format) if `format_name` is not recognized.
    fn transcode(&self, bytes: &[u8], format_name: &str, quality: Option<f64>) -> Result<Vec<u8>>;
}

/// [`ImageProbe`] backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodecImageProbe;

impl ImageProbe for CodecImageProbe {
    fn probe(&self, bytes: &[u8]) -> Option<Dimensions> {
        let image = image::load_from_memory(bytes).ok()?;
        Some(Dimensions {
            width: image.width(),
            height: image.height(),
        })
    }

    fn transcode(&self, bytes: &[u8], format_name: &str, quality: Option<f64>) -> Result<Vec<u8>> {
        if let Some(q) = quality {
            if !(0.0..=1.0).contains(&q) {
                return Err(RetileError::Config(format!(
                    "compress quality {q} is outside [0.0, 1.0]"
                )));
            }
        }

        let image = image::load_from_memory(bytes)?;
        let mut out = Vec::new();
        match format_name.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => {
                let q = quality.unwrap_or(0.85);
                let jpeg_quality = (q * 100.0).round().clamp(1.0, 99.0) as u8;
                encode_jpeg(&image, jpeg_quality, &mut out)?;
            }
            "png" => {
                encode_png(&image, &mut out)?;
            }
            "webp" => {
                encode_webp(&image, &mut out)?;
            }
            other => {
                return Err(RetileError::Config(format!("unsupported tile format: {other}")));
            }
        }
        Ok(out)
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8, out: &mut Vec<u8>) -> Result<()> {
    let rgb = image.to_rgb8();
    JpegEncoder::new_with_quality(out, quality).encode_image(&rgb)?;
    Ok(())
}

fn encode_png(image: &DynamicImage, out: &mut Vec<u8>) -> Result<()> {
    let rgba = image.to_rgba8();
    PngEncoder::new(out).write_image(rgba.as_raw(), rgba.width(), rgba.height(), image::ExtendedColorType::Rgba8)?;
    Ok(())
}

fn encode_webp(image: &DynamicImage, out: &mut Vec<u8>) -> Result<()> {
    let rgba = image.to_rgba8();
    WebPEncoder::new_lossless(out).encode(rgba.as_raw(), rgba.width(), rgba.height(), image::ExtendedColorType::Rgba8)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let image = DynamicImage::new_rgba8(w, h);
        let mut out = Vec::new();
        encode_png(&image, &mut out).unwrap();
        out
    }

    #[test]
    fn probe_reads_dimensions() {
        let bytes = png_bytes(16, 32);
        let probe = CodecImageProbe;
        assert_eq!(probe.probe(&bytes), Some(Dimensions { width: 16, height: 32 }));
    }

    #[test]
    fn probe_rejects_garbage() {
        let probe = CodecImageProbe;
        assert_eq!(probe.probe(&[1, 2, 3, 4]), None);
    }

    #[test]
    fn transcode_rejects_out_of_range_quality() {
        let probe = CodecImageProbe;
        let bytes = png_bytes(4, 4);
        let err = probe.transcode(&bytes, "jpeg", Some(1.5)).unwrap_err();
        assert!(matches!(err, RetileError::Config(_)));
    }

    #[test]
    fn transcode_rejects_unsupported_format() {
        let probe = CodecImageProbe;
        let bytes = png_bytes(4, 4);
        let err = probe.transcode(&bytes, "tiff", None).unwrap_err();
        assert!(matches!(err, RetileError::Config(_)));
    }

    #[test]
    fn transcode_jpeg_round_trips_dimensions() {
        let probe = CodecImageProbe;
        let bytes = png_bytes(8, 8);
        let jpeg = probe.transcode(&bytes, "jpeg", Some(0.5)).unwrap();
        assert_eq!(probe.probe(&jpeg), Some(Dimensions { width: 8, height: 8 }));
    }
}
