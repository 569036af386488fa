//! ST7701S panel controller setup
//!
//! The panel takes pixels over the parallel RGB interface; its registers are
//! only reachable through a write-only 3-wire SPI bus (CS, SCK, SDA) with
//! 9-bit words: a D/C bit (0 = command, 1 = parameter) followed by the byte,
//! MSB first, sampled on the rising clock edge. The bus is used once at boot,
//! so it is bit-banged on plain GPIOs.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

/// One register write and the settle time after it
struct Step {
    command: u8,
    params: &'static [u8],
    delay_ms: u32,
}

const fn step(command: u8, params: &'static [u8]) -> Step {
    Step {
        command,
        params,
        delay_ms: 0,
    }
}

/// Sleep out
pub const SLPOUT: u8 = 0x11;
/// Display on
pub const DISPON: u8 = 0x29;
/// Interface pixel format
pub const COLMOD: u8 = 0x3A;
/// Memory access control
pub const MADCTL: u8 = 0x36;
/// Command bank select
pub const CND2BKX_SEL: u8 = 0xFF;

/// 16 bits per pixel on the RGB interface
const COLMOD_RGB565: u8 = 0x55;

/// Vendor sequence for the 2.1" 480x480 round module
const INIT_SEQUENCE: &[Step] = &[
    // Bank 0: display line and porch control, gamma
    step(CND2BKX_SEL, &[0x77, 0x01, 0x00, 0x00, 0x10]),
    step(0xC0, &[0x3B, 0x00]),
    step(0xC1, &[0x0D, 0x02]),
    step(0xC2, &[0x31, 0x05]),
    step(0xCD, &[0x08]),
    step(
        0xB0,
        &[
            0x00, 0x11, 0x18, 0x0E, 0x11, 0x06, 0x07, 0x08, 0x07, 0x22, 0x04, 0x12, 0x0F, 0xAA,
            0x31, 0x18,
        ],
    ),
    step(
        0xB1,
        &[
            0x00, 0x11, 0x19, 0x0E, 0x12, 0x07, 0x08, 0x08, 0x08, 0x22, 0x04, 0x11, 0x11, 0xA9,
            0x32, 0x18,
        ],
    ),
    // Bank 1: power
    step(CND2BKX_SEL, &[0x77, 0x01, 0x00, 0x00, 0x11]),
    step(0xB0, &[0x60]),
    step(0xB1, &[0x32]),
    step(0xB2, &[0x07]),
    step(0xB3, &[0x80]),
    step(0xB5, &[0x49]),
    step(0xB7, &[0x85]),
    step(0xB8, &[0x21]),
    step(0xC1, &[0x78]),
    Step {
        command: 0xC2,
        params: &[0x78],
        delay_ms: 20,
    },
    // Gate timing
    step(0xE0, &[0x00, 0x1B, 0x02]),
    step(
        0xE1,
        &[0x08, 0xA0, 0x00, 0x00, 0x07, 0xA0, 0x00, 0x00, 0x00, 0x44, 0x44],
    ),
    step(
        0xE2,
        &[0x11, 0x11, 0x44, 0x44, 0xED, 0xA0, 0x00, 0x00, 0xEC, 0xA0, 0x00, 0x00],
    ),
    step(0xE3, &[0x00, 0x00, 0x11, 0x11]),
    step(0xE4, &[0x44, 0x44]),
    step(
        0xE5,
        &[
            0x0A, 0xE9, 0xD8, 0xA0, 0x0C, 0xEB, 0xD8, 0xA0, 0x0E, 0xED, 0xD8, 0xA0, 0x10, 0xEF,
            0xD8, 0xA0,
        ],
    ),
    step(0xE6, &[0x00, 0x00, 0x11, 0x11]),
    step(0xE7, &[0x44, 0x44]),
    step(
        0xE8,
        &[
            0x09, 0xE8, 0xD8, 0xA0, 0x0B, 0xEA, 0xD8, 0xA0, 0x0D, 0xEC, 0xD8, 0xA0, 0x0F, 0xEE,
            0xD8, 0xA0,
        ],
    ),
    step(0xEB, &[0x02, 0x00, 0xE4, 0xE4, 0x88, 0x00, 0x40]),
    step(0xEC, &[0x3C, 0x00]),
    step(
        0xED,
        &[
            0xAB, 0x89, 0x76, 0x54, 0x02, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x20, 0x45, 0x67,
            0x98, 0xBA,
        ],
    ),
    // Back to the user command set
    step(CND2BKX_SEL, &[0x77, 0x01, 0x00, 0x00, 0x00]),
    step(MADCTL, &[0x00]),
    step(COLMOD, &[COLMOD_RGB565]),
    Step {
        command: SLPOUT,
        params: &[],
        delay_ms: 120,
    },
    Step {
        command: DISPON,
        params: &[],
        delay_ms: 20,
    },
];

/// Write-only register bus of the panel
pub struct St7701<CS, SCK, SDA> {
    cs: CS,
    sck: SCK,
    sda: SDA,
}

impl<CS, SCK, SDA> St7701<CS, SCK, SDA>
where
    CS: OutputPin,
    SCK: OutputPin,
    SDA: OutputPin,
{
    /// Takes the pins and parks the bus idle (CS high, clock low)
    pub fn new(cs: CS, sck: SCK, sda: SDA) -> Self {
        let mut panel = Self { cs, sck, sda };
        let _ = panel.cs.set_high();
        let _ = panel.sck.set_low();
        let _ = panel.sda.set_low();
        panel
    }

    /// Run the full power-up sequence, ending with the display on
    pub fn init<DELAY: DelayNs>(&mut self, delay: &mut DELAY) {
        for step in INIT_SEQUENCE {
            self.write_command(step.command, step.params);
            if step.delay_ms > 0 {
                delay.delay_ms(step.delay_ms);
            }
        }
        log::info!("ST7701S initialized");
    }

    /// One command and its parameters inside a single CS frame
    pub fn write_command(&mut self, command: u8, params: &[u8]) {
        let _ = self.cs.set_low();
        self.write_word(false, command);
        for &param in params {
            self.write_word(true, param);
        }
        let _ = self.cs.set_high();
    }

    fn write_word(&mut self, data: bool, byte: u8) {
        self.write_bit(data);
        for bit in (0..8).rev() {
            self.write_bit(byte & (1 << bit) != 0);
        }
    }

    fn write_bit(&mut self, high: bool) {
        let _ = self.sck.set_low();
        let _ = if high {
            self.sda.set_high()
        } else {
            self.sda.set_low()
        };
        let _ = self.sck.set_high();
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use core::cell::RefCell;
    use core::convert::Infallible;
    use std::rc::Rc;
    use std::vec::Vec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Line {
        Cs,
        Sck,
        Sda,
    }

    /// Every level change on the bus, in order
    type Trace = Rc<RefCell<Vec<(Line, bool)>>>;

    struct Pin {
        line: Line,
        trace: Trace,
    }

    impl embedded_hal::digital::ErrorType for Pin {
        type Error = Infallible;
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.trace.borrow_mut().push((self.line, false));
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.trace.borrow_mut().push((self.line, true));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Delays(Vec<u32>);

    impl DelayNs for Delays {
        fn delay_ns(&mut self, ns: u32) {
            self.0.push(ns / 1_000_000);
        }

        fn delay_ms(&mut self, ms: u32) {
            self.0.push(ms);
        }
    }

    fn bus() -> (St7701<Pin, Pin, Pin>, Trace) {
        let trace = Trace::default();
        let pin = |line| Pin {
            line,
            trace: trace.clone(),
        };
        let panel = St7701::new(pin(Line::Cs), pin(Line::Sck), pin(Line::Sda));
        trace.borrow_mut().clear();
        (panel, trace)
    }

    /// Decode the trace into CS frames of (is_data, byte) words
    fn frames(trace: &[(Line, bool)]) -> Vec<Vec<(bool, u8)>> {
        let mut frames = Vec::new();
        let mut bits = Vec::new();
        let mut sda = false;
        for &(line, level) in trace {
            match (line, level) {
                (Line::Cs, false) => bits.clear(),
                (Line::Cs, true) => {
                    assert_eq!(bits.len() % 9, 0, "partial word on the bus");
                    frames.push(
                        bits.chunks(9)
                            .map(|word: &[bool]| {
                                let byte = word[1..].iter().fold(0u8, |acc, &b| acc << 1 | b as u8);
                                (word[0], byte)
                            })
                            .collect(),
                    );
                }
                (Line::Sda, level) => sda = level,
                (Line::Sck, true) => bits.push(sda),
                (Line::Sck, false) => {}
            }
        }
        frames
    }

    #[test]
    fn test_command_framing() {
        let (mut panel, trace) = bus();
        panel.write_command(COLMOD, &[0x55]);
        let frames = frames(&trace.borrow());
        assert_eq!(frames, [[(false, 0x3A), (true, 0x55)]]);
    }

    #[test]
    fn test_init_sequence() {
        let (mut panel, trace) = bus();
        let mut delay = Delays::default();
        panel.init(&mut delay);

        let frames = frames(&trace.borrow());
        assert_eq!(frames.len(), INIT_SEQUENCE.len());
        assert_eq!(
            frames[0],
            [
                (false, CND2BKX_SEL),
                (true, 0x77),
                (true, 0x01),
                (true, 0x00),
                (true, 0x00),
                (true, 0x10)
            ]
        );
        assert_eq!(frames[frames.len() - 2], [(false, SLPOUT)]);
        assert_eq!(frames[frames.len() - 1], [(false, DISPON)]);
        assert!(frames.iter().any(|f| f == &[(false, COLMOD), (true, COLMOD_RGB565)]));
        assert_eq!(delay.0, [20, 120, 20]);

        // Bus left idle
        assert_eq!(trace.borrow().last(), Some(&(Line::Cs, true)));
    }
}
