//! EYE/FACE mode state machine
//!
//! Owns the only writes to layer visibility. A transition is produced only
//! when the resolved mode differs from the current one, so re-asserting the
//! same mode every poll toggles nothing.

use heapless::Vec;

use crate::render::{LayerId, RenderCommand};
use crate::state::Mode;

/// A change of rendered content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Mode,
    pub to: Mode,
}

impl Transition {
    /// Visibility writes for every layer, applied together under the render lock
    pub fn commands(&self) -> Vec<RenderCommand, { LayerId::COUNT }> {
        let show_eye = self.to == Mode::Eye;
        LayerId::ALL
            .iter()
            .map(|&layer| {
                let visible = if layer.is_eye() { show_eye } else { !show_eye };
                RenderCommand::Visible(layer, visible)
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct ModeController {
    current: Mode,
    face_enabled: bool,
    transitions: u32,
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeController {
    pub const fn new() -> Self {
        Self {
            current: Mode::Eye,
            face_enabled: true,
            transitions: 0,
        }
    }

    pub fn current(&self) -> Mode {
        self.current
    }

    pub fn face_enabled(&self) -> bool {
        self.face_enabled
    }

    /// Number of transitions taken since startup
    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    /// Permanently refuse FACE, falling back to EYE if needed
    pub fn disable_face(&mut self) -> Option<Transition> {
        self.face_enabled = false;
        self.request(Mode::Eye)
    }

    /// The mode that would actually be shown for `requested`
    pub fn resolve(&self, requested: Mode) -> Mode {
        match requested {
            Mode::Face if !self.face_enabled => Mode::Eye,
            other => other,
        }
    }

    /// Move towards `requested`; `None` if nothing changes
    pub fn request(&mut self, requested: Mode) -> Option<Transition> {
        let to = self.resolve(requested);
        if to == self.current {
            return None;
        }

        let transition = Transition {
            from: self.current,
            to,
        };
        self.current = to;
        self.transitions = self.transitions.wrapping_add(1);
        log::info!(
            "Mode transition: {} -> {}",
            transition.from.as_str(),
            transition.to.as_str()
        );
        Some(transition)
    }
}
