//! Render layers, the backend trait and the render lock
//!
//! The screen is a fixed set of layers created once at startup: eight
//! concentric eye shapes, the face canvas and a status label. After creation
//! only style and visibility change, expressed as [`RenderCommand`]s so that
//! the animation and mode logic can be computed without touching the backend.

use core::cell::RefCell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_graphics_core::geometry::Point;
use embedded_graphics_core::pixelcolor::Rgb888;
use heapless::String;

/// Longest text shown on the status label (bytes)
pub const LABEL_CAPACITY: usize = 48;

pub type LabelText = String<LABEL_CAPACITY>;

/// Every layer on screen, in back-to-front order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerId {
    OuterGlow,
    Ring1,
    Ring2,
    Ring3,
    Ring4,
    MainEye,
    CenterGlow,
    Highlight,
    Face,
}

impl LayerId {
    pub const COUNT: usize = 9;

    /// Layers making up the eye, outermost first
    pub const EYE: [LayerId; 8] = [
        LayerId::OuterGlow,
        LayerId::Ring1,
        LayerId::Ring2,
        LayerId::Ring3,
        LayerId::Ring4,
        LayerId::MainEye,
        LayerId::CenterGlow,
        LayerId::Highlight,
    ];

    pub const ALL: [LayerId; Self::COUNT] = [
        LayerId::OuterGlow,
        LayerId::Ring1,
        LayerId::Ring2,
        LayerId::Ring3,
        LayerId::Ring4,
        LayerId::MainEye,
        LayerId::CenterGlow,
        LayerId::Highlight,
        LayerId::Face,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn is_eye(self) -> bool {
        !matches!(self, LayerId::Face)
    }
}

/// Border drawn inside a shape's outline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Border {
    pub color: Rgb888,
    pub width: u32,
}

/// Initial description of a layer.
///
/// Shapes are circles of `diameter` centered on the screen center plus
/// `offset`. The face canvas uses `diameter` as its side length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerSpec {
    pub diameter: u32,
    pub offset: Point,
    pub fill: Rgb888,
    /// 255 is fully opaque
    pub opacity: u8,
    pub border: Option<Border>,
    pub visible: bool,
}

impl LayerSpec {
    pub const fn circle(diameter: u32, fill: Rgb888) -> Self {
        Self {
            diameter,
            offset: Point::new(0, 0),
            fill,
            opacity: 255,
            border: None,
            visible: true,
        }
    }

    pub const fn with_border(mut self, color: Rgb888, width: u32) -> Self {
        self.border = Some(Border { color, width });
        self
    }

    pub const fn with_offset(mut self, x: i32, y: i32) -> Self {
        self.offset = Point::new(x, y);
        self
    }

    pub const fn with_opacity(mut self, opacity: u8) -> Self {
        self.opacity = opacity;
        self
    }

    pub const fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// A single mutation of the render tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCommand {
    Fill(LayerId, Rgb888),
    BorderColor(LayerId, Rgb888),
    Diameter(LayerId, u32),
    Visible(LayerId, bool),
    Label(LabelText),
    /// Layer content changed and must be redrawn
    Invalidate(LayerId),
}

/// Trait for the display toolkit that owns the real layers.
///
/// Calls are synchronous and must only be made while holding the
/// [`RenderLock`].
pub trait RenderBackend {
    fn create_layer(&mut self, layer: LayerId, spec: &LayerSpec);

    fn set_fill(&mut self, layer: LayerId, color: Rgb888);

    fn set_border_color(&mut self, layer: LayerId, color: Rgb888);

    fn set_diameter(&mut self, layer: LayerId, diameter: u32);

    fn set_visible(&mut self, layer: LayerId, visible: bool);

    fn set_label(&mut self, text: &str);

    fn invalidate(&mut self, layer: LayerId);

    /// Apply a precomputed command
    fn apply(&mut self, command: &RenderCommand) {
        match command {
            RenderCommand::Fill(layer, color) => self.set_fill(*layer, *color),
            RenderCommand::BorderColor(layer, color) => self.set_border_color(*layer, *color),
            RenderCommand::Diameter(layer, diameter) => self.set_diameter(*layer, *diameter),
            RenderCommand::Visible(layer, visible) => self.set_visible(*layer, *visible),
            RenderCommand::Label(text) => self.set_label(text),
            RenderCommand::Invalidate(layer) => self.invalidate(*layer),
        }
    }
}

/// Process-wide guard serializing every render tree mutation.
///
/// Acquisition blocks without a timeout. The guard is scoped to the closure
/// passed to [`RenderLock::with`], so it is released on every exit path.
/// Re-entering from inside the closure panics rather than deadlocking.
pub struct RenderLock<M: RawMutex, T> {
    inner: Mutex<M, RefCell<T>>,
}

impl<M: RawMutex, T> RenderLock<M, T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Run `f` with exclusive access to the guarded value
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }
}
