//! Fakes shared by the unit tests

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use embedded_graphics_core::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics_core::primitives::Rectangle;
use embedded_io::ErrorKind;

use crate::face::{DecodeError, FrameDecoder, Tile};
use crate::render::{LabelText, LayerId, LayerSpec, RenderBackend};
use crate::transport::{Method, Request, Response, Transport, TransportError};

/// One call made on a [`RecordingBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Create(LayerId, LayerSpec),
    Fill(LayerId, Rgb888),
    BorderColor(LayerId, Rgb888),
    Diameter(LayerId, u32),
    Visible(LayerId, bool),
    Label(LabelText),
    Invalidate(LayerId),
}

/// Render backend that only records what it was asked to do
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub events: Vec<BackendEvent>,
}

impl RecordingBackend {
    /// Last visibility set for `layer`, including at creation
    pub fn visible(&self, layer: LayerId) -> Option<bool> {
        self.events.iter().rev().find_map(|e| match e {
            BackendEvent::Visible(l, v) if *l == layer => Some(*v),
            BackendEvent::Create(l, spec) if *l == layer => Some(spec.visible),
            _ => None,
        })
    }

    /// Last label text
    pub fn label(&self) -> Option<&str> {
        self.events.iter().rev().find_map(|e| match e {
            BackendEvent::Label(text) => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn count(&self, pred: impl Fn(&BackendEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl RenderBackend for RecordingBackend {
    fn create_layer(&mut self, layer: LayerId, spec: &LayerSpec) {
        self.events.push(BackendEvent::Create(layer, *spec));
    }

    fn set_fill(&mut self, layer: LayerId, color: Rgb888) {
        self.events.push(BackendEvent::Fill(layer, color));
    }

    fn set_border_color(&mut self, layer: LayerId, color: Rgb888) {
        self.events.push(BackendEvent::BorderColor(layer, color));
    }

    fn set_diameter(&mut self, layer: LayerId, diameter: u32) {
        self.events.push(BackendEvent::Diameter(layer, diameter));
    }

    fn set_visible(&mut self, layer: LayerId, visible: bool) {
        self.events.push(BackendEvent::Visible(layer, visible));
    }

    fn set_label(&mut self, text: &str) {
        let mut label = LabelText::new();
        let _ = label.push_str(text);
        self.events.push(BackendEvent::Label(label));
    }

    fn invalidate(&mut self, layer: LayerId) {
        self.events.push(BackendEvent::Invalidate(layer));
    }
}

/// Request seen by a [`ScriptedTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Vec<u8>,
}

enum Scripted {
    Body(u16, Vec<u8>),
    /// Headers announce `len` bytes
    Declared(u16, usize),
    Fail(TransportError),
}

/// Transport answering from a queue of canned responses.
///
/// Applies the same size and status contract as the real transport. An empty
/// queue answers with [`TransportError::Io`].
pub struct ScriptedTransport {
    pub connected: bool,
    pub requests: Vec<RecordedRequest>,
    script: VecDeque<Scripted>,
}

impl ScriptedTransport {
    pub fn connected() -> Self {
        Self {
            connected: true,
            requests: Vec::new(),
            script: VecDeque::new(),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            connected: false,
            ..Self::connected()
        }
    }

    pub fn push_body(&mut self, status: u16, body: &[u8]) {
        self.script.push_back(Scripted::Body(status, body.to_vec()));
    }

    pub fn push_declared(&mut self, status: u16, len: usize) {
        self.script.push_back(Scripted::Declared(status, len));
    }

    pub fn push_error(&mut self, error: TransportError) {
        self.script.push_back(Scripted::Fail(error));
    }

    pub fn pending(&self) -> usize {
        self.script.len()
    }
}

impl Transport for ScriptedTransport {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send(&mut self, request: &Request<'_>, body: &mut [u8]) -> Result<Response, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        self.requests.push(RecordedRequest {
            method: request.method,
            path: String::from(request.path),
            body: request.body.map(|b| b.to_vec()).unwrap_or_default(),
        });

        match self.script.pop_front() {
            None => Err(TransportError::Io),
            Some(Scripted::Fail(e)) => Err(e),
            Some(Scripted::Body(status, _) | Scripted::Declared(status, _))
                if !(200..300).contains(&status) =>
            {
                Err(TransportError::Status(status))
            }
            Some(Scripted::Declared(status, len)) => {
                if len > body.len() {
                    return Err(TransportError::TooLarge(len));
                }
                body[..len].fill(0);
                Ok(Response { status, len })
            }
            Some(Scripted::Body(status, bytes)) => {
                if bytes.len() > body.len() {
                    return Err(TransportError::TooLarge(bytes.len()));
                }
                body[..bytes.len()].copy_from_slice(&bytes);
                Ok(Response {
                    status,
                    len: bytes.len(),
                })
            }
        }
    }
}

/// Decoder replaying a fixed list of rectangles
pub struct ScriptedDecoder {
    tiles: Vec<(Rectangle, Vec<Rgb565>)>,
    fail_after: Option<usize>,
    /// Every input handed to `decode`
    pub inputs: Vec<Vec<u8>>,
}

impl ScriptedDecoder {
    pub fn new(tiles: Vec<(Rectangle, Vec<Rgb565>)>) -> Self {
        Self {
            tiles,
            fail_after: None,
            inputs: Vec::new(),
        }
    }

    /// Emit `count` rectangles and then fail
    pub fn fail_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }
}

impl FrameDecoder for ScriptedDecoder {
    fn decode(&mut self, data: &[u8], sink: &mut dyn FnMut(&Tile<'_>)) -> Result<(), DecodeError> {
        self.inputs.push(data.to_vec());
        for (i, (area, pixels)) in self.tiles.iter().enumerate() {
            if self.fail_after == Some(i) {
                return Err(DecodeError::Rejected);
            }
            sink(&Tile {
                area: *area,
                pixels,
            });
        }
        Ok(())
    }
}

/// In-memory byte stream: reads from a canned response, records writes
pub struct MockConn {
    input: Vec<u8>,
    pos: usize,
    chunk: usize,
    pub written: Vec<u8>,
}

impl MockConn {
    pub fn new(input: &[u8]) -> Self {
        Self {
            input: input.to_vec(),
            pos: 0,
            chunk: usize::MAX,
            written: Vec::new(),
        }
    }

    /// Deliver at most `chunk` bytes per read
    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    pub fn written_str(&self) -> &str {
        core::str::from_utf8(&self.written).unwrap_or("")
    }
}

impl embedded_io::ErrorType for MockConn {
    type Error = ErrorKind;
}

impl embedded_io_async::Read for MockConn {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let remaining = &self.input[self.pos..];
        let n = remaining.len().min(buf.len()).min(self.chunk);
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl embedded_io_async::Write for MockConn {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
