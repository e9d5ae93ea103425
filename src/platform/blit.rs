// src/platform/blit.rs

//! Software compositing into a linear pixel buffer.
//!
//! The X11, DRM and framebuffer backends all end up with a `&mut [u8]` of
//! known stride and pixel packing. [`compose`] clears it to the background and
//! copies the frame in at its placement, converting RGBA to the destination
//! packing on the way.

use crate::codec::RasterImage;
use crate::geometry::{Geometry, Placement};

/// Position and width of one color channel inside a packed pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub offset: u32,
    pub length: u32,
}

impl Channel {
    pub const fn new(offset: u32, length: u32) -> Self {
        Channel { offset, length }
    }

    /// Derives the channel from a contiguous bit mask such as X11's `red_mask`.
    pub fn from_mask(mask: u64) -> Self {
        if mask == 0 {
            return Channel::new(0, 0);
        }
        let offset = mask.trailing_zeros();
        let length = (mask >> offset).trailing_ones();
        Channel::new(offset, length)
    }

    #[inline]
    fn pack(self, value: u8) -> u32 {
        if self.length == 0 {
            return 0;
        }
        let length = self.length.min(8);
        ((value as u32) >> (8 - length)) << self.offset
    }
}

/// Describes how a destination buffer packs one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub bytes_per_pixel: usize,
    pub red: Channel,
    pub green: Channel,
    pub blue: Channel,
}

impl PixelLayout {
    /// 32-bit little-endian `0x00RRGGBB`, used by X11 TrueColor visuals and
    /// DRM dumb buffers.
    pub const XRGB8888: PixelLayout = PixelLayout {
        bytes_per_pixel: 4,
        red: Channel::new(16, 8),
        green: Channel::new(8, 8),
        blue: Channel::new(0, 8),
    };

    /// 16-bit `RRRRRGGGGGGBBBBB`.
    pub const RGB565: PixelLayout = PixelLayout {
        bytes_per_pixel: 2,
        red: Channel::new(11, 5),
        green: Channel::new(5, 6),
        blue: Channel::new(0, 5),
    };

    /// Builds a layout from a bit depth and per-channel bitfields, as reported
    /// by the framebuffer driver. Only 16, 24 and 32 bpp are supported.
    pub fn from_bitfields(
        bits_per_pixel: u32,
        red: Channel,
        green: Channel,
        blue: Channel,
    ) -> Option<Self> {
        match bits_per_pixel {
            16 | 24 | 32 => Some(PixelLayout {
                bytes_per_pixel: (bits_per_pixel / 8) as usize,
                red,
                green,
                blue,
            }),
            _ => None,
        }
    }

    /// Packs an RGB triple into a little-endian byte sequence.
    #[inline]
    pub fn encode(&self, [r, g, b]: [u8; 3]) -> [u8; 4] {
        let value = self.red.pack(r) | self.green.pack(g) | self.blue.pack(b);
        value.to_le_bytes()
    }
}

/// Alpha-blends `src` over `bg`.
#[inline]
fn blend(src: u8, alpha: u8, bg: u8) -> u8 {
    let alpha = alpha as u32;
    ((src as u32 * alpha + bg as u32 * (255 - alpha) + 127) / 255) as u8
}

/// Fills the buffer with `background`, then copies `image` in at `placement`.
///
/// `dst` holds `geometry.height` rows of `stride` bytes. Pixels of `image`
/// that fall outside the geometry or outside `dst` are clipped.
pub fn compose(
    dst: &mut [u8],
    stride: usize,
    geometry: Geometry,
    layout: &PixelLayout,
    image: &RasterImage,
    placement: Placement,
    background: [u8; 3],
) {
    let bpp = layout.bytes_per_pixel;
    let row_bytes = (geometry.width as usize * bpp).min(stride);
    let bg_pixel = layout.encode(background);

    for row in dst.chunks_mut(stride).take(geometry.height as usize) {
        let end = row_bytes.min(row.len());
        for pixel in row[..end].chunks_exact_mut(bpp) {
            pixel.copy_from_slice(&bg_pixel[..bpp]);
        }
    }

    let visible_width = image
        .width()
        .min(geometry.width.saturating_sub(placement.x));
    let visible_height = image
        .height()
        .min(geometry.height.saturating_sub(placement.y));

    for y in 0..visible_height {
        let row_start = (placement.y + y) as usize * stride;
        for x in 0..visible_width {
            let start = row_start + (placement.x + x) as usize * bpp;
            let Some(out) = dst.get_mut(start..start + bpp) else {
                return;
            };
            let [r, g, b, a] = image.get_pixel(x, y).0;
            let rgb = if a == u8::MAX {
                [r, g, b]
            } else {
                [
                    blend(r, a, background[0]),
                    blend(g, a, background[1]),
                    blend(b, a, background[2]),
                ]
            };
            out.copy_from_slice(&layout.encode(rgb)[..bpp]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn channel_from_x11_masks() {
        assert_eq!(Channel::from_mask(0xff0000), Channel::new(16, 8));
        assert_eq!(Channel::from_mask(0x07e0), Channel::new(5, 6));
        assert_eq!(Channel::from_mask(0), Channel::new(0, 0));
    }

    #[test]
    fn encode_xrgb_and_rgb565() {
        assert_eq!(
            PixelLayout::XRGB8888.encode([0x12, 0x34, 0x56]),
            [0x56, 0x34, 0x12, 0x00]
        );
        let white = PixelLayout::RGB565.encode([255, 255, 255]);
        assert_eq!(&white[..2], &[0xff, 0xff]);
        let red = PixelLayout::RGB565.encode([255, 0, 0]);
        assert_eq!(u16::from_le_bytes([red[0], red[1]]), 0xf800);
    }

    #[test]
    fn only_common_depths_are_supported() {
        let c = Channel::new(0, 8);
        assert!(PixelLayout::from_bitfields(8, c, c, c).is_none());
        assert_eq!(
            PixelLayout::from_bitfields(24, c, c, c).map(|l| l.bytes_per_pixel),
            Some(3)
        );
    }

    #[test]
    fn compose_centers_and_clears_background() {
        let geometry = Geometry::new(4, 2);
        let stride = 4 * 4;
        let mut dst = vec![0xaa; stride * 2];
        let image = RasterImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        let placement = Placement::centered(image.dimensions(), geometry);

        compose(
            &mut dst,
            stride,
            geometry,
            &PixelLayout::XRGB8888,
            &image,
            placement,
            [0, 0, 255],
        );

        let pixel = |x: usize, y: usize| &dst[y * stride + x * 4..y * stride + x * 4 + 4];
        assert_eq!(pixel(0, 0), &[255, 0, 0, 0]); // background blue
        assert_eq!(pixel(1, 0), &[0, 0, 255, 0]); // image red
        assert_eq!(pixel(2, 1), &[0, 0, 255, 0]);
        assert_eq!(pixel(3, 1), &[255, 0, 0, 0]);
    }

    #[test]
    fn compose_clips_oversized_images_and_respects_padding() {
        let geometry = Geometry::new(2, 2);
        let stride = 2 * 4 + 8; // padded rows
        let mut dst = vec![0x11; stride * 2];
        let image = RasterImage::from_pixel(5, 5, Rgba([1, 2, 3, 255]));

        compose(
            &mut dst,
            stride,
            geometry,
            &PixelLayout::XRGB8888,
            &image,
            Placement::default(),
            [0, 0, 0],
        );

        assert_eq!(&dst[0..4], &[3, 2, 1, 0]);
        // Row padding is left untouched.
        assert_eq!(&dst[8..16], &[0x11; 8]);
    }

    #[test]
    fn transparent_pixels_show_the_background() {
        let geometry = Geometry::new(1, 1);
        let mut dst = vec![0; 4];
        let image = RasterImage::from_pixel(1, 1, Rgba([255, 255, 255, 0]));
        compose(
            &mut dst,
            4,
            geometry,
            &PixelLayout::XRGB8888,
            &image,
            Placement::default(),
            [10, 20, 30],
        );
        assert_eq!(&dst, &[30, 20, 10, 0]);
    }
}
