//! Software compositor for the render layers
//!
//! [`Scene`] is the device's [`RenderBackend`]: it keeps the current style of
//! every layer and draws the whole screen with embedded-graphics primitives
//! into any RGB565 `DrawTarget`, back to front. The firmware draws into a
//! full-screen [`FrameBuffer`] and hands that to the panel.

use embedded_graphics::Drawable;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_10X20;
use embedded_graphics::primitives::{Circle, Primitive, PrimitiveStyleBuilder, StrokeAlignment};
use embedded_graphics::text::{Alignment, Text};
use embedded_graphics_core::draw_target::DrawTarget;
use embedded_graphics_core::geometry::{Point, Size};
use embedded_graphics_core::pixelcolor::{Rgb565, Rgb888, RgbColor};
use embedded_graphics_core::primitives::Rectangle;

use crate::framebuffer::FrameBuffer;
use crate::render::{LabelText, LayerId, LayerSpec, RenderBackend};

/// Label color, a dim red that reads against the black bezel
pub const LABEL_COLOR: Rgb888 = Rgb888::new(200, 0, 0);

/// Distance from the bottom edge to the label baseline
pub const LABEL_MARGIN: i32 = 30;

pub struct Scene {
    size: u32,
    layers: [Option<LayerSpec>; LayerId::COUNT],
    label: LabelText,
    redraw: bool,
}

impl Scene {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            layers: [None; LayerId::COUNT],
            label: LabelText::new(),
            redraw: true,
        }
    }

    pub fn layer(&self, layer: LayerId) -> Option<&LayerSpec> {
        self.layers[layer.index()].as_ref()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// True once after any change since the last call
    pub fn take_redraw(&mut self) -> bool {
        core::mem::take(&mut self.redraw)
    }

    fn center(&self) -> Point {
        let half = (self.size / 2) as i32;
        Point::new(half, half)
    }

    fn update(&mut self, layer: LayerId, f: impl FnOnce(&mut LayerSpec)) {
        match self.layers[layer.index()].as_mut() {
            Some(spec) => {
                f(spec);
                self.redraw = true;
            }
            None => log::warn!("Update to missing layer {:?}", layer),
        }
    }

    /// Draw the full screen. `face` is shown when the face layer is visible
    /// and the buffer has been written at least once.
    pub fn draw<D>(&self, target: &mut D, face: Option<&FrameBuffer>) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        target.clear(Rgb565::BLACK)?;

        let center = self.center();
        let mut below = Rgb888::BLACK;
        for id in LayerId::EYE {
            let Some(spec) = self.layer(id) else {
                continue;
            };
            if !spec.visible {
                continue;
            }

            let fill = blend(spec.fill, below, spec.opacity);
            let mut style = PrimitiveStyleBuilder::new().fill_color(Rgb565::from(fill));
            if let Some(border) = spec.border {
                style = style
                    .stroke_color(Rgb565::from(border.color))
                    .stroke_width(border.width)
                    .stroke_alignment(StrokeAlignment::Inside);
            }

            Circle::with_center(center + spec.offset, spec.diameter)
                .into_styled(style.build())
                .draw(target)?;
            below = spec.fill;
        }

        if let (Some(spec), Some(frame)) = (self.layer(LayerId::Face), face)
            && spec.visible
            && frame.has_content()
        {
            let size = Size::new(frame.width(), frame.height());
            let top_left = center - Point::new(size.width as i32 / 2, size.height as i32 / 2);
            target.fill_contiguous(
                &Rectangle::new(top_left, size),
                frame.as_slice().iter().copied(),
            )?;
        }

        if !self.label.is_empty() {
            let style = MonoTextStyle::new(&FONT_10X20, Rgb565::from(LABEL_COLOR));
            let baseline = Point::new(center.x, self.size as i32 - LABEL_MARGIN);
            Text::with_alignment(&self.label, baseline, style, Alignment::Center).draw(target)?;
        }

        Ok(())
    }
}

/// Mix `top` over `bottom`; 255 is opaque
fn blend(top: Rgb888, bottom: Rgb888, opacity: u8) -> Rgb888 {
    if opacity == 255 {
        return top;
    }
    let a = opacity as u16;
    let mix = |t: u8, b: u8| ((t as u16 * a + b as u16 * (255 - a)) / 255) as u8;
    Rgb888::new(
        mix(top.r(), bottom.r()),
        mix(top.g(), bottom.g()),
        mix(top.b(), bottom.b()),
    )
}

impl RenderBackend for Scene {
    fn create_layer(&mut self, layer: LayerId, spec: &LayerSpec) {
        self.layers[layer.index()] = Some(*spec);
        self.redraw = true;
    }

    fn set_fill(&mut self, layer: LayerId, color: Rgb888) {
        self.update(layer, |spec| spec.fill = color);
    }

    fn set_border_color(&mut self, layer: LayerId, color: Rgb888) {
        self.update(layer, |spec| {
            if let Some(border) = spec.border.as_mut() {
                border.color = color;
            }
        });
    }

    fn set_diameter(&mut self, layer: LayerId, diameter: u32) {
        self.update(layer, |spec| spec.diameter = diameter);
    }

    fn set_visible(&mut self, layer: LayerId, visible: bool) {
        self.update(layer, |spec| spec.visible = visible);
    }

    fn set_label(&mut self, text: &str) {
        self.label.clear();
        // Callers hand in LabelText-sized strings
        let _ = self.label.push_str(text);
        self.redraw = true;
    }

    fn invalidate(&mut self, _layer: LayerId) {
        self.redraw = true;
    }
}
