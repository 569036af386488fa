//! JPEG face frame decoder
//!
//! zune-jpeg decodes the whole frame to RGB888; the result is converted to
//! RGB565 and handed out in horizontal strips, centered on the panel.

use alloc::vec::Vec;
use embedded_graphics_core::geometry::{Point, Size};
use embedded_graphics_core::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics_core::primitives::Rectangle;
use zune_jpeg::JpegDecoder;
use zune_jpeg::zune_core::colorspace::ColorSpace;
use zune_jpeg::zune_core::options::DecoderOptions;

use crate::face::{DecodeError, FrameDecoder, Tile};

/// Rows per emitted rectangle
pub const STRIP_ROWS: usize = 16;

/// Largest accepted side length
const MAX_DIMENSION: usize = 1024;

pub struct JpegFrameDecoder {
    display_size: u32,
    strip: Vec<Rgb565>,
}

impl JpegFrameDecoder {
    pub fn new(display_size: u32) -> Self {
        Self {
            display_size,
            strip: Vec::new(),
        }
    }
}

impl FrameDecoder for JpegFrameDecoder {
    fn decode(&mut self, data: &[u8], sink: &mut dyn FnMut(&Tile<'_>)) -> Result<(), DecodeError> {
        let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGB);
        let mut decoder = JpegDecoder::new_with_options(data, options);

        decoder
            .decode_headers()
            .map_err(|_| DecodeError::InvalidImage)?;
        let (width, height) = decoder.dimensions().ok_or(DecodeError::InvalidImage)?;
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(DecodeError::UnsupportedDimensions);
        }

        let rgb = decoder.decode().map_err(|_| DecodeError::Rejected)?;
        if rgb.len() < width * height * 3 {
            return Err(DecodeError::Rejected);
        }

        let origin = Point::new(
            (self.display_size as i32 - width as i32) / 2,
            (self.display_size as i32 - height as i32) / 2,
        );
        emit_strips(&rgb, width, height, origin, &mut self.strip, sink);
        Ok(())
    }
}

/// Convert packed RGB888 rows to RGB565 strips of [`STRIP_ROWS`] rows
pub(crate) fn emit_strips(
    rgb: &[u8],
    width: usize,
    height: usize,
    origin: Point,
    strip: &mut Vec<Rgb565>,
    sink: &mut dyn FnMut(&Tile<'_>),
) {
    let row_bytes = width * 3;
    for (index, rows) in rgb[..row_bytes * height].chunks(row_bytes * STRIP_ROWS).enumerate() {
        strip.clear();
        strip.extend(
            rows.chunks_exact(3)
                .map(|px| Rgb565::from(Rgb888::new(px[0], px[1], px[2]))),
        );

        let strip_height = rows.len() / row_bytes;
        let area = Rectangle::new(
            origin + Point::new(0, (index * STRIP_ROWS) as i32),
            Size::new(width as u32, strip_height as u32),
        );
        sink(&Tile {
            area,
            pixels: strip.as_slice(),
        });
    }
}
