//! Frame content rendering.
//!
//! The window session only needs "fill this W x H ARGB region";
//! [`Renderer`] is that seam. [`LabelRenderer`] is the production
//! implementation: a solid background with a centered text label,
//! rasterized through cairo.

use cairo::{Context, Format, FontSlant, FontWeight, ImageSurface, Operator};
use log::warn;
use thiserror::Error;

use crate::config::LabelConfig;
use crate::shm::BYTES_PER_PIXEL;

/// Fills pixel regions with window content.
pub trait Renderer {
    /// Fully overwrite `pixels`: ARGB8888, row-major, `stride` bytes per row.
    fn render(&mut self, pixels: &mut [u8], width: i32, height: i32, stride: i32);
}

/// Packed 0xAARRGGBB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argb(pub u32);

/// A configured color string does not parse as 0xAARRGGBB hex.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid ARGB color {value:?}: expected 8 hex digits")]
pub struct ColorParseError {
    pub value: String,
}

impl Argb {
    /// Parse `"AARRGGBB"`, optionally prefixed with `#` or `0x`.
    pub fn parse(value: &str) -> Result<Self, ColorParseError> {
        let digits = value.trim_start_matches('#');
        let digits = digits.strip_prefix("0x").unwrap_or(digits);
        if digits.len() != 8 {
            return Err(ColorParseError {
                value: value.to_string(),
            });
        }
        u32::from_str_radix(digits, 16)
            .map(Argb)
            .map_err(|_| ColorParseError {
                value: value.to_string(),
            })
    }

    /// Channels as 0.0..=1.0 in cairo's (r, g, b, a) order.
    fn channels(self) -> (f64, f64, f64, f64) {
        let c = self.0;
        (
            ((c >> 16) & 0xff) as f64 / 255.0,
            ((c >> 8) & 0xff) as f64 / 255.0,
            (c & 0xff) as f64 / 255.0,
            ((c >> 24) & 0xff) as f64 / 255.0,
        )
    }
}

/// Draws a centered text label over a solid background.
pub struct LabelRenderer {
    text: String,
    font_family: String,
    font_size: f64,
    font_scale: f64,
    foreground: Argb,
    background: Argb,
}

impl LabelRenderer {
    pub fn from_config(config: &LabelConfig) -> Result<Self, ColorParseError> {
        Ok(Self {
            text: config.text.clone(),
            font_family: config.font_family.clone(),
            font_size: config.font_size,
            font_scale: config.font_scale,
            foreground: Argb::parse(&config.foreground)?,
            background: Argb::parse(&config.background)?,
        })
    }

    fn paint(&self, width: i32, height: i32) -> Result<ImageSurface, cairo::Error> {
        let surface = ImageSurface::create(Format::ARgb32, width, height)?;
        {
            let cr = Context::new(&surface)?;
            cr.set_operator(Operator::Source);

            let (r, g, b, a) = self.background.channels();
            cr.set_source_rgba(r, g, b, a);
            cr.paint()?;

            let (r, g, b, a) = self.foreground.channels();
            cr.set_source_rgba(r, g, b, a);
            cr.select_font_face(&self.font_family, FontSlant::Normal, FontWeight::Normal);
            cr.set_font_size(self.font_size * self.font_scale);

            let extents = cr.text_extents(&self.text)?;
            cr.move_to(
                f64::from(width) / 2.0 - (extents.width() / 2.0 + extents.x_bearing()),
                f64::from(height) / 2.0 - (extents.height() / 2.0 + extents.y_bearing()),
            );
            cr.show_text(&self.text)?;
        }
        surface.flush();
        Ok(surface)
    }
}

impl Renderer for LabelRenderer {
    fn render(&mut self, pixels: &mut [u8], width: i32, height: i32, stride: i32) {
        let mut surface = match self.paint(width, height) {
            Ok(surface) => surface,
            Err(e) => {
                warn!("label rasterization failed ({e}); filling background only");
                fill_solid(pixels, width, height, stride, self.background);
                return;
            }
        };

        let src_stride = surface.stride() as usize;
        let data = match surface.data() {
            Ok(data) => data,
            Err(e) => {
                warn!("cannot read rasterized label ({e}); filling background only");
                fill_solid(pixels, width, height, stride, self.background);
                return;
            }
        };

        // Opaque colors only, so cairo's premultiplied output is plain
        // ARGB8888 byte for byte.
        let row_bytes = width as usize * BYTES_PER_PIXEL;
        let dst_stride = stride as usize;
        for y in 0..height as usize {
            let src = &data[y * src_stride..y * src_stride + row_bytes];
            let dst = &mut pixels[y * dst_stride..y * dst_stride + row_bytes];
            dst.copy_from_slice(src);
        }
    }
}

/// Write one color across the whole region, honoring the stride.
pub fn fill_solid(pixels: &mut [u8], width: i32, height: i32, stride: i32, color: Argb) {
    let row_bytes = width as usize * BYTES_PER_PIXEL;
    let dst_stride = stride as usize;
    let bytes = color.0.to_le_bytes();
    for y in 0..height as usize {
        let row = &mut pixels[y * dst_stride..y * dst_stride + row_bytes];
        for pixel in row.chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel.copy_from_slice(&bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_argb_hex() {
        assert_eq!(Argb::parse("ff000000"), Ok(Argb(0xff000000)));
        assert_eq!(Argb::parse("#FFFFFFFF"), Ok(Argb(0xffffffff)));
        assert_eq!(Argb::parse("0x80336699"), Ok(Argb(0x80336699)));
    }

    #[test]
    fn rejects_malformed_colors() {
        assert!(Argb::parse("fff").is_err());
        assert!(Argb::parse("not-a-color").is_err());
        assert!(Argb::parse("").is_err());
        assert!(Argb::parse("gg000000").is_err());
    }

    #[test]
    fn fill_solid_writes_little_endian_argb() {
        let mut pixels = vec![0u8; 2 * 2 * 4];
        fill_solid(&mut pixels, 2, 2, 8, Argb(0xff112233));
        assert_eq!(&pixels[..4], &[0x33, 0x22, 0x11, 0xff]);
        assert_eq!(&pixels[12..], &[0x33, 0x22, 0x11, 0xff]);
    }

    #[test]
    fn fill_solid_skips_stride_padding() {
        // 1 pixel wide rows with 8-byte stride: the padding must stay zero.
        let mut pixels = vec![0u8; 2 * 8];
        fill_solid(&mut pixels, 1, 2, 8, Argb(0xffffffff));
        assert_eq!(&pixels[..4], &[0xff; 4]);
        assert_eq!(&pixels[4..8], &[0u8; 4]);
    }

    #[test]
    fn label_renderer_fills_background() {
        let config = LabelConfig {
            text: "x".to_string(),
            font_size: 10.0,
            background: "ff336699".to_string(),
            ..LabelConfig::default()
        };
        let mut renderer = LabelRenderer::from_config(&config).unwrap();
        let (width, height, stride) = (64, 32, 64 * 4);
        let mut pixels = vec![0u8; (stride * height) as usize];
        renderer.render(&mut pixels, width, height, stride);
        // Corners are far from the glyph; they must carry the background.
        assert_eq!(&pixels[..4], &[0x99, 0x66, 0x33, 0xff]);
        let last = pixels.len() - 4;
        assert_eq!(&pixels[last..], &[0x99, 0x66, 0x33, 0xff]);
    }
}
