//! Touch and encoder input
//!
//! Interrupt handlers and the touch driver push discrete events into a
//! bounded queue; the network loop drains it once per pass. Nothing in the
//! core reads raw interrupt state.

use core::sync::atomic::{AtomicU32, Ordering};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;

/// Queue depth; events beyond this are dropped
pub const INPUT_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Press,
    Release,
    /// Encoder detents, positive is clockwise
    Rotate(i8),
}

/// Bounded event queue safe to feed from interrupt context (with a
/// critical-section mutex)
pub struct InputQueue<M: RawMutex> {
    channel: Channel<M, InputEvent, INPUT_QUEUE_DEPTH>,
    dropped: AtomicU32,
}

impl<M: RawMutex> InputQueue<M> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Enqueue without waiting; returns false if the event was dropped
    pub fn push(&self, event: InputEvent) -> bool {
        match self.channel.try_send(event) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn try_next(&self) -> Option<InputEvent> {
        self.channel.try_receive().ok()
    }

    /// Events lost to a full queue since startup
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<M: RawMutex> Default for InputQueue<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Quarter steps per encoder detent
const STEPS_PER_DETENT: i8 = 4;

/// Quadrature decoder for the rotary encoder's A/B lines
#[derive(Debug)]
pub struct Quadrature {
    last: u8,
    steps: i8,
}

impl Quadrature {
    pub const fn new(a: bool, b: bool) -> Self {
        Self {
            last: (a as u8) << 1 | b as u8,
            steps: 0,
        }
    }

    /// Feed the current line levels; yields one event per full detent
    pub fn update(&mut self, a: bool, b: bool) -> Option<InputEvent> {
        let state = (a as u8) << 1 | b as u8;
        if state == self.last {
            return None;
        }

        // Gray sequence 00 -> 01 -> 11 -> 10 is clockwise
        let step = match (self.last, state) {
            (0b00, 0b01) | (0b01, 0b11) | (0b11, 0b10) | (0b10, 0b00) => 1,
            (0b00, 0b10) | (0b10, 0b11) | (0b11, 0b01) | (0b01, 0b00) => -1,
            // Skipped a state, direction unknown
            _ => 0,
        };
        self.last = state;
        self.steps += step;

        if self.steps.abs() >= STEPS_PER_DETENT {
            let direction = self.steps.signum();
            self.steps = 0;
            Some(InputEvent::Rotate(direction))
        } else {
            None
        }
    }
}

/// Gesture decoded from the raw event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// Press followed by release
    Tap,
    /// Encoder moved; carries the new absolute position
    Turned(i32),
}

#[derive(Debug, Default)]
pub struct InputState {
    pressed: bool,
    position: i32,
    taps: u32,
}

impl InputState {
    pub const fn new() -> Self {
        Self {
            pressed: false,
            position: 0,
            taps: 0,
        }
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn taps(&self) -> u32 {
        self.taps
    }

    pub fn feed(&mut self, event: InputEvent) -> Option<Gesture> {
        match event {
            InputEvent::Press => {
                self.pressed = true;
                None
            }
            InputEvent::Release if self.pressed => {
                self.pressed = false;
                self.taps = self.taps.wrapping_add(1);
                Some(Gesture::Tap)
            }
            // Release without a press, e.g. after a dropped event
            InputEvent::Release => None,
            InputEvent::Rotate(0) => None,
            InputEvent::Rotate(delta) => {
                self.position = self.position.saturating_add(delta as i32);
                Some(Gesture::Turned(self.position))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    #[test]
    fn test_queue_drops_when_full() {
        let queue: InputQueue<CriticalSectionRawMutex> = InputQueue::new();
        for _ in 0..INPUT_QUEUE_DEPTH {
            assert!(queue.push(InputEvent::Rotate(1)));
        }
        assert!(!queue.push(InputEvent::Press));
        assert_eq!(queue.dropped(), 1);

        let mut drained = 0;
        while let Some(event) = queue.try_next() {
            assert_eq!(event, InputEvent::Rotate(1));
            drained += 1;
        }
        assert_eq!(drained, INPUT_QUEUE_DEPTH);
    }

    #[test]
    fn test_tap_detection() {
        let mut state = InputState::new();
        assert_eq!(state.feed(InputEvent::Release), None);
        assert_eq!(state.feed(InputEvent::Press), None);
        assert_eq!(state.feed(InputEvent::Release), Some(Gesture::Tap));
        assert_eq!(state.feed(InputEvent::Release), None);
        assert_eq!(state.taps(), 1);
    }

    fn turn(decoder: &mut Quadrature, sequence: &[(bool, bool)]) -> Vec<InputEvent> {
        sequence
            .iter()
            .filter_map(|&(a, b)| decoder.update(a, b))
            .collect()
    }

    #[test]
    fn test_quadrature_detents() {
        let clockwise = [(false, true), (true, true), (true, false), (false, false)];
        let counter = [(true, false), (true, true), (false, true), (false, false)];

        let mut decoder = Quadrature::new(false, false);
        assert_eq!(turn(&mut decoder, &clockwise), [InputEvent::Rotate(1)]);
        assert_eq!(turn(&mut decoder, &counter), [InputEvent::Rotate(-1)]);

        // Contact bounce back and forth cancels out
        let bounce = [(false, true), (false, false), (false, true), (false, false)];
        assert!(turn(&mut decoder, &bounce).is_empty());

        // Repeated levels are not steps
        assert_eq!(decoder.update(false, false), None);
    }

    #[test]
    fn test_rotation_accumulates() {
        let mut state = InputState::new();
        assert_eq!(state.feed(InputEvent::Rotate(3)), Some(Gesture::Turned(3)));
        assert_eq!(state.feed(InputEvent::Rotate(-5)), Some(Gesture::Turned(-2)));
        assert_eq!(state.feed(InputEvent::Rotate(0)), None);
        assert_eq!(state.position(), -2);
    }
}
