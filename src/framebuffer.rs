//! Face frame buffer for the 480x480 round panel
//!
//! Pixels are RGB565, row-major, one `Rgb565` per pixel (~450 KB at full
//! size). Allocation is fallible so that a device without enough PSRAM keeps
//! running in EYE mode instead of aborting.
//!
//! The buffer also implements `DrawTarget`, which lets the scene compositor
//! draw the whole screen into a second instance before handing it to the panel.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::convert::Infallible;
use core::fmt;
use embedded_graphics_core::Pixel;
use embedded_graphics_core::draw_target::DrawTarget;
use embedded_graphics_core::geometry::{OriginDimensions, Point, Size};
use embedded_graphics_core::pixelcolor::raw::{RawData, RawU16};
use embedded_graphics_core::pixelcolor::{Rgb565, RgbColor};
use embedded_graphics_core::primitives::Rectangle;

/// Frame buffer could not be allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationError {
    pub requested_bytes: usize,
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to allocate {} bytes", self.requested_bytes)
    }
}

/// Fixed-size RGB565 pixel grid
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Box<[Rgb565]>,
    /// Set once anything has been written or cleared explicitly
    dirty: bool,
}

impl FrameBuffer {
    /// Allocate a buffer pre-cleared to black
    pub fn allocate(width: u32, height: u32) -> Result<Self, AllocationError> {
        let len = (width as usize).saturating_mul(height as usize);
        let requested_bytes = len.saturating_mul(core::mem::size_of::<Rgb565>());

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|_| AllocationError { requested_bytes })?;
        pixels.resize(len, Rgb565::BLACK);

        Ok(Self {
            width,
            height,
            pixels: pixels.into_boxed_slice(),
            dirty: false,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// True after the first `write_rect` or `clear`
    pub fn has_content(&self) -> bool {
        self.dirty
    }

    /// Fill the entire buffer with a single color
    pub fn clear(&mut self, color: Rgb565) {
        self.pixels.fill(color);
        self.dirty = true;
    }

    /// Read a single pixel, `None` outside the buffer
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb565> {
        self.index(x as i32, y as i32).map(|idx| self.pixels[idx])
    }

    /// Get the raw pixels for blitting, row-major
    pub fn as_slice(&self) -> &[Rgb565] {
        &self.pixels
    }

    /// Serialize into a panel scan-out buffer, two little-endian bytes per
    /// pixel. Returns the number of pixels copied.
    pub fn copy_to_le_bytes(&self, out: &mut [u8]) -> usize {
        let mut copied = 0;
        for (dst, &pixel) in out.chunks_exact_mut(2).zip(self.pixels.iter()) {
            dst.copy_from_slice(&RawU16::from(pixel).into_inner().to_le_bytes());
            copied += 1;
        }
        copied
    }

    /// Write a `w` x `h` block of row-major pixels with its top-left at (x, y).
    ///
    /// Destination pixels outside the buffer are dropped. If `pixels` holds
    /// fewer than `w * h` entries only the supplied ones are written.
    /// Returns the number of pixels that landed in the buffer.
    pub fn write_rect(&mut self, x: i32, y: i32, w: u32, h: u32, pixels: &[Rgb565]) -> usize {
        self.dirty = true;
        if w == 0 {
            return 0;
        }

        let mut written = 0;
        for (row, src_row) in pixels.chunks(w as usize).take(h as usize).enumerate() {
            let dst_y = y.saturating_add(row as i32);
            if dst_y < 0 {
                continue;
            }
            if dst_y >= self.height as i32 {
                break;
            }

            // Clip the row horizontally
            let skip = if x < 0 { x.unsigned_abs() as usize } else { 0 };
            let dst_x = x.max(0);
            if skip >= src_row.len() || dst_x >= self.width as i32 {
                continue;
            }
            let room = (self.width as i32 - dst_x) as usize;
            let count = (src_row.len() - skip).min(room);

            let start = dst_y as usize * self.width as usize + dst_x as usize;
            self.pixels[start..start + count].copy_from_slice(&src_row[skip..skip + count]);
            written += count;
        }
        written
    }

    /// Fill a rectangular region with a color
    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgb565) {
        let area = Rectangle::new(Point::new(x, y), Size::new(w, h));
        let clipped = area.intersection(&self.bounds());
        if clipped.size.width == 0 || clipped.size.height == 0 {
            return;
        }

        let x0 = clipped.top_left.x as usize;
        let y0 = clipped.top_left.y as usize;
        let stride = self.width as usize;
        for row in y0..y0 + clipped.size.height as usize {
            let start = row * stride + x0;
            self.pixels[start..start + clipped.size.width as usize].fill(color);
        }
        self.dirty = true;
    }

    fn bounds(&self) -> Rectangle {
        Rectangle::new(Point::zero(), Size::new(self.width, self.height))
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if let Some(idx) = self.index(point.x, point.y) {
                self.pixels[idx] = color;
            }
        }
        self.dirty = true;
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        self.fill_rect(
            area.top_left.x,
            area.top_left.y,
            area.size.width,
            area.size.height,
            color,
        );
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        FrameBuffer::clear(self, color);
        Ok(())
    }
}
