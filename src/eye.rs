//! Procedural HAL 9000 eye
//!
//! The eye is a stack of flat-filled concentric circles. Each ring takes the
//! emotion's base hue scaled by a fixed coefficient (dim outside, bright
//! inside) and by a sinusoidal brightness pulse, which reads as a radial
//! gradient glow on the panel.

use core::f32::consts::TAU;
use embassy_time::Duration;
use embedded_graphics_core::pixelcolor::{Rgb888, RgbColor};
use heapless::Vec;

use crate::render::{LayerId, LayerSpec, RenderCommand};
use crate::state::{Emotion, Mode};

/// Pulse angular speed in radians per millisecond
pub const PULSE_SPEED_IDLE: f32 = 0.002;
pub const PULSE_SPEED_SPEAKING: f32 = 0.004;
pub const PULSE_SPEED_LISTENING: f32 = 0.006;

/// Brightness range driven by the pulse
pub const BRIGHTNESS_MIN: f32 = 0.7;
pub const BRIGHTNESS_SPAN: f32 = 0.3;

/// Per-ring brightness coefficients, outermost ring to main eye
pub const RING_COEFFICIENTS: [f32; 5] = [0.35, 0.50, 0.70, 0.85, 1.00];
pub const RING_LAYERS: [LayerId; 5] = [
    LayerId::Ring1,
    LayerId::Ring2,
    LayerId::Ring3,
    LayerId::Ring4,
    LayerId::MainEye,
];

// Layer diameters in pixels
pub const OUTER_GLOW_DIAMETER: u32 = 310;
pub const RING_DIAMETERS: [u32; 5] = [260, 236, 210, 180, 150];
pub const CENTER_GLOW_DIAMETER: u32 = 60;
pub const HIGHLIGHT_DIAMETER: u32 = 24;

/// Extra outer glow diameter at the top of the pulse
pub const GLOW_GROWTH: f32 = 20.0;

/// Red channel of the outer glow at full brightness
const GLOW_RED: u8 = 40;

/// Render commands produced by one animation tick
pub type EyeCommands = Vec<RenderCommand, 9>;

/// Pulse angular speed for an emotion (radians per millisecond)
pub fn pulse_speed(emotion: Emotion) -> f32 {
    match emotion {
        Emotion::Idle => PULSE_SPEED_IDLE,
        Emotion::Speaking => PULSE_SPEED_SPEAKING,
        Emotion::Listening => PULSE_SPEED_LISTENING,
    }
}

/// Red and green channels of the eye hue; blue is always zero
pub fn base_color(emotion: Emotion) -> (u8, u8) {
    match emotion {
        // #CC0000
        Emotion::Idle => (204, 0),
        // #FF3300
        Emotion::Speaking => (255, 51),
        // #FF0000
        Emotion::Listening => (255, 0),
    }
}

/// Map a pulse in [0, 1] onto [0.7, 1.0]
pub fn brightness(pulse: f32) -> f32 {
    BRIGHTNESS_MIN + BRIGHTNESS_SPAN * pulse.clamp(0.0, 1.0)
}

#[inline]
fn scale(channel: u8, factor: f32) -> u8 {
    (channel as f32 * factor).clamp(0.0, 255.0) as u8
}

/// Accumulated pulse angle.
///
/// Only advanced while the eye is animated and never reset after startup, so
/// leaving and re-entering EYE mode or changing speed never jumps the pulse.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnimationPhase {
    radians: f32,
}

impl AnimationPhase {
    pub const fn new() -> Self {
        Self { radians: 0.0 }
    }

    /// Advance by `dt` at `speed` radians per millisecond
    pub fn advance(&mut self, speed: f32, dt: Duration) {
        let step = speed * (dt.as_micros() as f32 / 1000.0);
        self.radians = libm::fmodf(self.radians + step, TAU);
    }

    pub fn radians(&self) -> f32 {
        self.radians
    }

    /// Current pulse value in [0, 1]
    pub fn pulse(&self) -> f32 {
        (libm::sinf(self.radians) * 0.5 + 0.5).clamp(0.0, 1.0)
    }
}

/// Colors and glow size for one animation tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeFrame {
    pub pulse: f32,
    pub brightness: f32,
    pub glow_diameter: u32,
    pub glow: Rgb888,
    /// Ring 1..4 then the main eye
    pub rings: [Rgb888; 5],
    pub border: Rgb888,
    pub center: Rgb888,
}

impl EyeFrame {
    pub fn compute(emotion: Emotion, pulse: f32) -> Self {
        let pulse = pulse.clamp(0.0, 1.0);
        let brightness = brightness(pulse);
        let (base_r, base_g) = base_color(emotion);

        let rings = RING_COEFFICIENTS.map(|k| {
            Rgb888::new(
                scale(base_r, k * brightness),
                scale(base_g, k * brightness),
                0,
            )
        });

        Self {
            pulse,
            brightness,
            glow_diameter: OUTER_GLOW_DIAMETER + (pulse * GLOW_GROWTH) as u32,
            glow: Rgb888::new(scale(GLOW_RED, brightness), 0, 0),
            rings,
            border: Rgb888::new(255, 50 + (pulse * 30.0) as u8, 0),
            center: Rgb888::new(255, 180 + (pulse * 40.0) as u8, 0),
        }
    }

    /// Layer writes for this frame, applied together under the render lock
    pub fn commands(&self) -> EyeCommands {
        let mut commands = EyeCommands::new();
        // Capacity matches the fixed layer count
        let _ = commands.push(RenderCommand::Diameter(LayerId::OuterGlow, self.glow_diameter));
        let _ = commands.push(RenderCommand::Fill(LayerId::OuterGlow, self.glow));
        for (layer, color) in RING_LAYERS.iter().zip(self.rings) {
            let _ = commands.push(RenderCommand::Fill(*layer, color));
        }
        let _ = commands.push(RenderCommand::BorderColor(LayerId::MainEye, self.border));
        let _ = commands.push(RenderCommand::Fill(LayerId::CenterGlow, self.center));
        commands
    }
}

/// Drives the eye from the current mode and emotion
#[derive(Debug, Default)]
pub struct EyeAnimator {
    phase: AnimationPhase,
    frames: u32,
}

impl EyeAnimator {
    pub const fn new() -> Self {
        Self {
            phase: AnimationPhase::new(),
            frames: 0,
        }
    }

    pub fn phase(&self) -> AnimationPhase {
        self.phase
    }

    /// Number of frames produced so far
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// One animation tick. Returns `None` without touching the phase while
    /// the face is shown.
    pub fn tick(&mut self, mode: Mode, emotion: Emotion, dt: Duration) -> Option<EyeFrame> {
        if mode == Mode::Face {
            return None;
        }

        self.phase.advance(pulse_speed(emotion), dt);
        self.frames = self.frames.wrapping_add(1);
        Some(EyeFrame::compute(emotion, self.phase.pulse()))
    }
}

/// Initial specs for the eye layers, outermost first
pub fn layer_specs() -> [(LayerId, LayerSpec); 8] {
    let idle = EyeFrame::compute(Emotion::Idle, 0.0);
    [
        (
            LayerId::OuterGlow,
            LayerSpec::circle(OUTER_GLOW_DIAMETER, Rgb888::new(GLOW_RED, 0, 0)),
        ),
        (LayerId::Ring1, LayerSpec::circle(RING_DIAMETERS[0], idle.rings[0])),
        (LayerId::Ring2, LayerSpec::circle(RING_DIAMETERS[1], idle.rings[1])),
        (LayerId::Ring3, LayerSpec::circle(RING_DIAMETERS[2], idle.rings[2])),
        (LayerId::Ring4, LayerSpec::circle(RING_DIAMETERS[3], idle.rings[3])),
        (
            LayerId::MainEye,
            LayerSpec::circle(RING_DIAMETERS[4], Rgb888::new(220, 0, 0))
                .with_border(Rgb888::new(255, 50, 0), 2),
        ),
        (
            LayerId::CenterGlow,
            LayerSpec::circle(CENTER_GLOW_DIAMETER, Rgb888::new(255, 180, 0)),
        ),
        (
            LayerId::Highlight,
            LayerSpec::circle(HIGHLIGHT_DIAMETER, Rgb888::WHITE)
                .with_offset(-4, -4)
                .with_opacity(204),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMOTIONS: [Emotion; 3] = [Emotion::Idle, Emotion::Listening, Emotion::Speaking];

    #[test]
    fn test_pulse_speed_ordering() {
        assert!(pulse_speed(Emotion::Listening) > pulse_speed(Emotion::Speaking));
        assert!(pulse_speed(Emotion::Speaking) > pulse_speed(Emotion::Idle));
    }

    #[test]
    fn test_brightness_bounds_and_monotonic() {
        let mut last = brightness(0.0);
        assert_eq!(last, BRIGHTNESS_MIN);
        for step in 1..=100 {
            let value = brightness(step as f32 / 100.0);
            assert!(value >= last);
            assert!((BRIGHTNESS_MIN..=1.0).contains(&value));
            last = value;
        }
        assert!((brightness(1.0) - 1.0).abs() < 1e-6);
        // Out-of-range pulses clamp
        assert_eq!(brightness(-3.0), BRIGHTNESS_MIN);
        assert!((brightness(7.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_palette_has_no_blue() {
        for emotion in EMOTIONS {
            for pulse in [0.0, 0.25, 0.5, 1.0] {
                let frame = EyeFrame::compute(emotion, pulse);
                assert!(frame.rings.iter().all(|c| c.b() == 0));
                assert_eq!(frame.glow.b(), 0);
            }
        }
    }

    #[test]
    fn test_rings_brighten_inward() {
        for emotion in EMOTIONS {
            let frame = EyeFrame::compute(emotion, 0.6);
            for pair in frame.rings.windows(2) {
                assert!(pair[0].r() < pair[1].r());
            }
        }
    }

    #[test]
    fn test_main_eye_matches_base_hue_at_peak() {
        let frame = EyeFrame::compute(Emotion::Speaking, 1.0);
        assert_eq!(frame.rings[4], Rgb888::new(255, 51, 0));

        let frame = EyeFrame::compute(Emotion::Idle, 0.0);
        // 204 * 0.7
        assert_eq!(frame.rings[4].r(), 142);
    }

    #[test]
    fn test_glow_grows_with_pulse() {
        let low = EyeFrame::compute(Emotion::Idle, 0.0);
        let high = EyeFrame::compute(Emotion::Idle, 1.0);
        assert_eq!(low.glow_diameter, OUTER_GLOW_DIAMETER);
        assert_eq!(high.glow_diameter, OUTER_GLOW_DIAMETER + GLOW_GROWTH as u32);
        assert!(high.center.g() > low.center.g());
    }

    #[test]
    fn test_tick_is_noop_in_face_mode() {
        let mut animator = EyeAnimator::new();
        let dt = Duration::from_millis(33);
        assert!(animator.tick(Mode::Eye, Emotion::Idle, dt).is_some());
        let phase = animator.phase();

        assert!(animator.tick(Mode::Face, Emotion::Idle, dt).is_none());
        assert_eq!(animator.phase(), phase);
        assert_eq!(animator.frames(), 1);
    }

    #[test]
    fn test_phase_continuous_across_mode_switch() {
        let dt = Duration::from_millis(33);
        let mut animator = EyeAnimator::new();
        for _ in 0..10 {
            animator.tick(Mode::Eye, Emotion::Idle, dt);
        }
        let before = animator.phase().pulse();

        for _ in 0..100 {
            animator.tick(Mode::Face, Emotion::Idle, dt);
        }
        let after = animator.tick(Mode::Eye, Emotion::Idle, dt).unwrap().pulse;

        // One tick at idle speed moves the pulse by at most 0.5 * 0.002 * 33
        assert!((after - before).abs() <= 0.5 * PULSE_SPEED_IDLE * 33.0 + 1e-4);
    }

    #[test]
    fn test_speed_change_does_not_jump() {
        let dt = Duration::from_millis(33);
        let mut animator = EyeAnimator::new();
        for _ in 0..50 {
            animator.tick(Mode::Eye, Emotion::Idle, dt);
        }
        let before = animator.phase().pulse();
        let after = animator.tick(Mode::Eye, Emotion::Listening, dt).unwrap().pulse;
        assert!((after - before).abs() <= 0.5 * PULSE_SPEED_LISTENING * 33.0 + 1e-4);
    }

    #[test]
    fn test_phase_wraps() {
        let mut phase = AnimationPhase::new();
        for _ in 0..10_000 {
            phase.advance(PULSE_SPEED_LISTENING, Duration::from_millis(33));
            assert!((0.0..TAU).contains(&phase.radians()));
        }
    }

    #[test]
    fn test_commands_cover_eye_layers() {
        let commands = EyeFrame::compute(Emotion::Listening, 0.5).commands();
        assert_eq!(commands.len(), 9);
        for layer in RING_LAYERS {
            assert!(commands.iter().any(|c| matches!(c, RenderCommand::Fill(l, _) if *l == layer)));
        }
        assert!(commands
            .iter()
            .all(|c| !matches!(c, RenderCommand::Visible(..) | RenderCommand::Label(_))));
    }

    #[test]
    fn test_layer_specs_nested() {
        let specs = layer_specs();
        assert_eq!(specs.len(), LayerId::EYE.len());
        for ((id, _), expected) in specs.iter().zip(LayerId::EYE) {
            assert_eq!(*id, expected);
        }
        for pair in specs.windows(2) {
            assert!(pair[0].1.diameter > pair[1].1.diameter);
        }
    }
}
