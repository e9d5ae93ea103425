// src/codec/mock.rs

use super::{fit_dimensions, Codec, RasterImage};
use crate::error::DecodeError;
use anyhow::anyhow;
use image::Rgba;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// In-memory codec. Every source decodes to a solid raster of its registered
/// size unless it was marked as failing; unknown sources fail like a missing
/// file.
#[derive(Default)]
pub struct FakeCodec {
    images: HashMap<String, (u32, u32)>,
    failing: RefCell<Vec<String>>,
    pub decodes: Cell<usize>,
    pub scales: Cell<usize>,
    decoded: RefCell<Vec<String>>,
}

impl FakeCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `source` as decodable to a `width` x `height` raster.
    pub fn with_image(mut self, source: &str, width: u32, height: u32) -> Self {
        self.images.insert(source.to_string(), (width, height));
        self
    }

    /// Makes every later decode of `source` fail.
    pub fn fail(&self, source: &str) {
        self.failing.borrow_mut().push(source.to_string());
    }

    /// Sources passed to `decode`, in call order.
    pub fn decoded(&self) -> Vec<String> {
        self.decoded.borrow().clone()
    }
}

impl Codec for FakeCodec {
    fn decode(&self, source: &str) -> Result<RasterImage, DecodeError> {
        self.decodes.set(self.decodes.get() + 1);
        self.decoded.borrow_mut().push(source.to_string());
        if self.failing.borrow().iter().any(|s| s == source) {
            return Err(DecodeError::new(source, anyhow!("injected decode failure")));
        }
        match self.images.get(source) {
            Some(&(width, height)) => Ok(RasterImage::from_pixel(
                width,
                height,
                Rgba([200, 100, 50, 255]),
            )),
            None => Err(DecodeError::new(source, anyhow!("No such file or directory"))),
        }
    }

    fn scale(&self, image: &RasterImage, max_width: u32, max_height: u32) -> RasterImage {
        self.scales.set(self.scales.get() + 1);
        let (width, height) =
            fit_dimensions(image.dimensions(), (max_width, max_height), false);
        image::imageops::resize(image, width, height, image::imageops::FilterType::Nearest)
    }
}
