//! Status label text

use crate::state::{DisplayState, Emotion, Mode};

pub const INITIALIZING: &str = "Initializing...";
pub const OFFLINE: &str = "Offline Mode";
pub const ONLINE: &str = "HAL 9000 Online";
pub const LISTENING: &str = "Listening...";
pub const SPEAKING: &str = "Speaking...";

/// Label for the current state; first matching rule wins
pub fn status_text(ever_connected: bool, state: &DisplayState) -> &str {
    if !ever_connected {
        return OFFLINE;
    }
    if state.mode() == Mode::Face
        && let Some(person) = state.person()
    {
        return person;
    }
    match state.emotion() {
        Emotion::Listening => LISTENING,
        Emotion::Speaking => SPEAKING,
        Emotion::Idle => ONLINE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_wins() {
        let state = DisplayState::new(Mode::Face, Emotion::Speaking, Some("Dave"));
        assert_eq!(status_text(false, &state), OFFLINE);
    }

    #[test]
    fn test_person_in_face_mode() {
        let state = DisplayState::new(Mode::Face, Emotion::Speaking, Some("Dave"));
        assert_eq!(status_text(true, &state), "Dave");

        let nobody = DisplayState::new(Mode::Face, Emotion::Speaking, None);
        assert_eq!(status_text(true, &nobody), SPEAKING);
    }

    #[test]
    fn test_emotion_text() {
        let listening = DisplayState::new(Mode::Eye, Emotion::Listening, None);
        assert_eq!(status_text(true, &listening), LISTENING);
        assert_eq!(status_text(true, &DisplayState::default()), ONLINE);
    }
}
