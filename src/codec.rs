// src/codec.rs

//! Codec Service: decode a source into an RGBA raster and scale it to fit a
//! surface. Both operations are stateless; `Codec` exists so the render
//! pipeline can be driven by a fake in tests.

use crate::config::Config;
use crate::error::DecodeError;
use anyhow::{anyhow, Context};
use image::imageops::FilterType;
use image::RgbaImage;
use log::{debug, trace};
use std::io::Read;
use std::time::Duration;

#[cfg(test)]
pub mod mock;

/// Decoded pixels, always 8-bit RGBA.
pub type RasterImage = RgbaImage;

/// Returns true if `source` should be fetched over HTTP rather than opened.
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

pub trait Codec {
    /// Decodes a path or URL into a raster.
    fn decode(&self, source: &str) -> Result<RasterImage, DecodeError>;

    /// Aspect-preserving resize to fit within `max_width` x `max_height`.
    fn scale(&self, image: &RasterImage, max_width: u32, max_height: u32) -> RasterImage;
}

/// Computes the size of a `src` raster fitted into `max` bounds.
///
/// The scale factor is `min(max_w / src_w, max_h / src_h)`, capped at 1.0
/// unless `allow_upscale` is set. Both results are at least 1 and never exceed
/// the bounds.
pub fn fit_dimensions(
    (src_width, src_height): (u32, u32),
    (max_width, max_height): (u32, u32),
    allow_upscale: bool,
) -> (u32, u32) {
    if src_width == 0 || src_height == 0 {
        return (0, 0);
    }
    let max_width = max_width.max(1);
    let max_height = max_height.max(1);

    let mut factor = f64::min(
        max_width as f64 / src_width as f64,
        max_height as f64 / src_height as f64,
    );
    if !allow_upscale {
        factor = factor.min(1.0);
    }

    let width = ((src_width as f64 * factor).round() as u32).clamp(1, max_width);
    let height = ((src_height as f64 * factor).round() as u32).clamp(1, max_height);
    (width, height)
}

/// The production codec, backed by the `image` crate and `ureq`.
pub struct ImageCodec {
    allow_upscale: bool,
    max_download_bytes: u64,
    agent: ureq::Agent,
}

impl ImageCodec {
    pub fn new(config: &Config) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.network.timeout_secs)))
            .build()
            .into();
        ImageCodec {
            allow_upscale: config.render.allow_upscale,
            max_download_bytes: config.network.max_download_bytes,
            agent,
        }
    }

    fn decode_file(&self, path: &str) -> anyhow::Result<RasterImage> {
        let image = image::ImageReader::open(path)?
            .with_guessed_format()?
            .decode()?;
        Ok(image.to_rgba8())
    }

    fn decode_url(&self, url: &str) -> anyhow::Result<RasterImage> {
        let bytes = self.download(url)?;
        debug!("Fetched {} bytes from {}", bytes.len(), url);
        let image = image::load_from_memory(&bytes)?;
        Ok(image.to_rgba8())
    }

    /// Single best-effort GET; no retries.
    fn download(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let response = self.agent.get(url).call()?;
        let mut bytes = Vec::new();
        response
            .into_body()
            .into_reader()
            .take(self.max_download_bytes + 1)
            .read_to_end(&mut bytes)
            .context("Failed to read response body")?;
        if bytes.len() as u64 > self.max_download_bytes {
            return Err(anyhow!(
                "response exceeds the {} byte download limit",
                self.max_download_bytes
            ));
        }
        Ok(bytes)
    }
}

impl Codec for ImageCodec {
    fn decode(&self, source: &str) -> Result<RasterImage, DecodeError> {
        trace!("Decoding {}", source);
        let result = if is_url(source) {
            self.decode_url(source)
        } else {
            self.decode_file(source)
        };
        result.map_err(|cause| DecodeError::new(source, cause))
    }

    fn scale(&self, image: &RasterImage, max_width: u32, max_height: u32) -> RasterImage {
        let (width, height) = fit_dimensions(
            image.dimensions(),
            (max_width, max_height),
            self.allow_upscale,
        );
        if (width, height) == image.dimensions() {
            return image.clone();
        }
        trace!(
            "Scaling {}x{} -> {}x{}",
            image.width(),
            image.height(),
            width,
            height
        );
        image::imageops::resize(image, width, height, FilterType::Nearest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn codec(allow_upscale: bool) -> ImageCodec {
        let mut config = Config::default();
        config.render.allow_upscale = allow_upscale;
        ImageCodec::new(&config)
    }

    #[test]
    fn url_detection() {
        assert!(is_url("http://example.com/a.png"));
        assert!(is_url("https://example.com/a.png"));
        assert!(!is_url("/tmp/http://a.png"));
        assert!(!is_url("ftp://example.com/a.png"));
    }

    #[test]
    fn fit_preserves_aspect_ratio_within_bounds() {
        let sizes = [1u32, 2, 3, 7, 16, 100, 333, 1024, 4000];
        for &sw in &sizes {
            for &sh in &sizes {
                for &tw in &sizes {
                    for &th in &sizes {
                        for upscale in [false, true] {
                            let (w, h) = fit_dimensions((sw, sh), (tw, th), upscale);
                            assert!(w >= 1 && h >= 1);
                            assert!(w <= tw && h <= th, "{sw}x{sh} in {tw}x{th} gave {w}x{h}");
                            // w = sw*f + e1, h = sh*f + e2 with |e1| <= 0.5 and
                            // |e2| <= 1.0 (the clamp to one pixel).
                            let skew = (w as f64 * sh as f64 - h as f64 * sw as f64).abs();
                            assert!(
                                skew <= 1.0 * sw as f64 + 1.0 * sh as f64,
                                "{sw}x{sh} in {tw}x{th} gave {w}x{h}"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn fit_does_not_upscale_by_default() {
        assert_eq!(fit_dimensions((100, 50), (1000, 1000), false), (100, 50));
        assert_eq!(fit_dimensions((100, 50), (1000, 1000), true), (1000, 500));
    }

    #[test]
    fn fit_limits_on_dominant_axis() {
        assert_eq!(fit_dimensions((2000, 1000), (1024, 768), false), (1024, 512));
        assert_eq!(fit_dimensions((1000, 2000), (1024, 768), false), (384, 768));
    }

    #[test]
    fn scale_produces_fitted_dimensions() {
        let image = RgbaImage::from_pixel(400, 200, Rgba([1, 2, 3, 255]));
        let scaled = codec(false).scale(&image, 100, 100);
        assert_eq!(scaled.dimensions(), (100, 50));
        assert_eq!(scaled.get_pixel(10, 10), &Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn decode_missing_file_names_source() {
        let err = codec(false).decode("/nonexistent/missing.png").unwrap_err();
        assert_eq!(err.source_id, "/nonexistent/missing.png");
    }

    #[test]
    fn decode_reads_png_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("good.png");
        RgbaImage::from_pixel(3, 2, Rgba([9, 8, 7, 255]))
            .save(&path)
            .unwrap();
        let decoded = codec(false).decode(path.to_str().unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(0, 0), &Rgba([9, 8, 7, 255]));
    }
}
