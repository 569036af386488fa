//! Face frame fetching and decoding
//!
//! A frame is one compressed image fetched from the backend. The decoder turns
//! it into a stream of pixel rectangles, each handed to the caller as soon as
//! it is ready so the caller can take the render lock per rectangle instead of
//! for the whole decode.
//!
//! If the decoder fails partway, rectangles already handed out stay in the
//! frame buffer. The next good frame overwrites them; until then the panel can
//! show a mix of two frames. Nothing is ever written for an oversized or
//! failed fetch.

use alloc::vec::Vec;
use core::fmt;
use embedded_graphics_core::pixelcolor::Rgb565;
use embedded_graphics_core::primitives::Rectangle;

use crate::config::Config;
use crate::framebuffer::AllocationError;
use crate::transport::{Request, Transport, TransportError};

/// A decoded block of row-major pixels
#[derive(Debug, Clone, Copy)]
pub struct Tile<'a> {
    pub area: Rectangle,
    pub pixels: &'a [Rgb565],
}

/// Decoder rejected the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Not an image the decoder understands
    InvalidImage,
    /// Image dimensions are zero or not representable
    UnsupportedDimensions,
    /// Decoder gave up partway
    Rejected,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidImage => write!(f, "invalid image"),
            DecodeError::UnsupportedDimensions => write!(f, "unsupported dimensions"),
            DecodeError::Rejected => write!(f, "decode rejected"),
        }
    }
}

/// Image decoder collaborator
pub trait FrameDecoder {
    /// Decode `data`, calling `sink` once per rectangle in display order
    fn decode(&mut self, data: &[u8], sink: &mut dyn FnMut(&Tile<'_>)) -> Result<(), DecodeError>;
}

/// A face frame was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    Transport(TransportError),
    /// Body at or above the size limit, never decoded
    Oversized(usize),
    Decode(DecodeError),
    /// FACE mode is disabled for this process
    Unavailable,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Transport(e) => write!(f, "transport: {}", e),
            FrameError::Oversized(size) => write!(f, "frame too large ({} bytes)", size),
            FrameError::Decode(e) => write!(f, "decode: {}", e),
            FrameError::Unavailable => write!(f, "face mode unavailable"),
        }
    }
}

impl From<TransportError> for FrameError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::TooLarge(size) => FrameError::Oversized(size),
            other => FrameError::Transport(other),
        }
    }
}

impl From<DecodeError> for FrameError {
    fn from(e: DecodeError) -> Self {
        FrameError::Decode(e)
    }
}

/// Result of one successful frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub bytes: usize,
    pub tiles: usize,
    pub pixels: usize,
}

/// Owns the compressed-frame receive buffer
pub struct FrameFetcher {
    body: Vec<u8>,
    limit: usize,
    frames: u32,
    dropped: u32,
}

impl FrameFetcher {
    /// Allocate the receive buffer; one byte short of the limit so that a
    /// body of exactly `limit` bytes is already rejected by the transport.
    pub fn new(config: &Config) -> Result<Self, AllocationError> {
        let limit = config.frame_body_limit;
        let len = limit.saturating_sub(1);

        let mut body = Vec::new();
        body.try_reserve_exact(len)
            .map_err(|_| AllocationError { requested_bytes: len })?;
        body.resize(len, 0);

        Ok(Self {
            body,
            limit,
            frames: 0,
            dropped: 0,
        })
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Fetch and decode one frame, forwarding each rectangle to `write`
    pub async fn fetch<T, D>(
        &mut self,
        transport: &mut T,
        decoder: &mut D,
        config: &Config,
        write: &mut dyn FnMut(&Tile<'_>),
    ) -> Result<FrameStats, FrameError>
    where
        T: Transport,
        D: FrameDecoder,
    {
        let result = self.fetch_inner(transport, decoder, config, write).await;
        match &result {
            Ok(stats) => {
                self.frames = self.frames.wrapping_add(1);
                log::debug!(
                    "Face frame: {} bytes, {} tiles, {} pixels",
                    stats.bytes,
                    stats.tiles,
                    stats.pixels
                );
            }
            Err(e) => {
                self.dropped = self.dropped.wrapping_add(1);
                log::warn!("Dropped face frame: {}", e);
            }
        }
        result
    }

    async fn fetch_inner<T, D>(
        &mut self,
        transport: &mut T,
        decoder: &mut D,
        config: &Config,
        write: &mut dyn FnMut(&Tile<'_>),
    ) -> Result<FrameStats, FrameError>
    where
        T: Transport,
        D: FrameDecoder,
    {
        if !transport.is_connected() {
            return Err(FrameError::Transport(TransportError::NotConnected));
        }

        let path = config.face_frame_path();
        let request = Request::get(&path, config.frame_timeout);
        let response = transport.send(&request, &mut self.body).await?;

        if response.status != 200 {
            return Err(FrameError::Transport(TransportError::Status(response.status)));
        }
        if response.len >= self.limit {
            return Err(FrameError::Oversized(response.len));
        }

        let mut tiles = 0;
        let mut pixels = 0;
        decoder.decode(&self.body[..response.len], &mut |tile| {
            tiles += 1;
            pixels += tile.pixels.len();
            write(tile);
        })?;

        Ok(FrameStats {
            bytes: response.len,
            tiles,
            pixels,
        })
    }
}
