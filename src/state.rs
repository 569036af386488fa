//! Display state reported by the backend
//!
//! JSON format from `GET /api/hal/display`:
//! ```json
//! {"mode": "face", "state": "speaking", "person": "Dave"}
//! ```
//!
//! Unknown fields are ignored. A `mode` other than `"face"` means EYE, and the
//! free-text `state` token is folded into an [`Emotion`] by substring match.

use core::fmt;
use heapless::String;

use crate::config::STATUS_BODY_CAPACITY;
use serde::Deserialize;
use serde::de::{self, Deserializer, Visitor};

/// Longest person name kept for the status label (bytes)
pub const MAX_PERSON_LEN: usize = 32;

/// Scratch space for unescaping JSON strings; any string in a status body
/// fits
const UNESCAPE_BUF_SIZE: usize = STATUS_BODY_CAPACITY;

pub type PersonName = String<MAX_PERSON_LEN>;

/// Which content class is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Eye,
    Face,
}

impl Mode {
    /// Anything but an exact `"face"` falls back to EYE
    pub fn from_wire(value: &str) -> Self {
        if value == "face" { Mode::Face } else { Mode::Eye }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Eye => "eye",
            Mode::Face => "face",
        }
    }
}

/// Coarse behavioral state driving eye color and pulse rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Emotion {
    #[default]
    Idle,
    Listening,
    Speaking,
}

impl Emotion {
    /// Classify a backend status token.
    ///
    /// Case-sensitive substring match, first hit wins:
    /// `awaiting`/`listening` → Listening, then
    /// `asking`/`confirming`/`speaking` → Speaking, else Idle.
    /// The backend vocabulary (`awaiting_yes_no`, `asking_name`, ...) relies on
    /// this exact ordering.
    pub fn classify(token: &str) -> Self {
        if token.contains("awaiting") || token.contains("listening") {
            Emotion::Listening
        } else if token.contains("asking")
            || token.contains("confirming")
            || token.contains("speaking")
        {
            Emotion::Speaking
        } else {
            Emotion::Idle
        }
    }
}

/// Poll-refreshed status snapshot.
///
/// `person` is only ever set while `mode` is FACE.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayState {
    mode: Mode,
    emotion: Emotion,
    person: Option<PersonName>,
}

impl DisplayState {
    pub fn new(mode: Mode, emotion: Emotion, person: Option<&str>) -> Self {
        let person = match mode {
            Mode::Face => person.and_then(truncate_name),
            Mode::Eye => None,
        };
        Self {
            mode,
            emotion,
            person,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn emotion(&self) -> Emotion {
        self.emotion
    }

    pub fn person(&self) -> Option<&str> {
        self.person.as_deref()
    }

    /// Same state with the mode forced, clearing the person outside FACE
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        if mode != Mode::Face {
            self.person = None;
        }
        self
    }
}

/// Status body could not be turned into a [`DisplayState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Body was not UTF-8 text
    InvalidUtf8,
    /// Body was not valid JSON for the expected shape
    Json,
    /// Body exceeded the receive buffer
    Oversized,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidUtf8 => write!(f, "body is not UTF-8"),
            ParseError::Json => write!(f, "malformed JSON"),
            ParseError::Oversized => write!(f, "body too large"),
        }
    }
}

/// Parse a status response body
pub fn parse_display_state(body: &[u8]) -> Result<DisplayState, ParseError> {
    let mut scratch = [0u8; UNESCAPE_BUF_SIZE];
    let (response, _): (StatusResponse, usize) =
        serde_json_core::from_slice_escaped(body, &mut scratch).map_err(|_| ParseError::Json)?;

    let mode = response.mode.map(|m| m.0).unwrap_or_default();
    let emotion = response.state.map(|s| s.0).unwrap_or_default();
    let person = response.person.and_then(|p| p.0);

    Ok(DisplayState::new(mode, emotion, person.as_deref()))
}

/// Wire shape of the status endpoint
#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default)]
    mode: Option<WireMode>,
    #[serde(default)]
    state: Option<WireEmotion>,
    #[serde(default)]
    person: Option<WireName>,
}

/// Mode string of any length, mapped without allocation
struct WireMode(Mode);

/// Status token of any length, classified on the fly
struct WireEmotion(Emotion);

/// Person name, truncated to [`MAX_PERSON_LEN`]; empty or non-string means
/// absent
struct WireName(Option<PersonName>);

impl<'de> Deserialize<'de> for WireMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer
            .deserialize_str(TokenVisitor(Mode::from_wire))
            .map(WireMode)
    }
}

impl<'de> Deserialize<'de> for WireEmotion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer
            .deserialize_str(TokenVisitor(Emotion::classify))
            .map(WireEmotion)
    }
}

impl<'de> Deserialize<'de> for WireName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer
            .deserialize_ignored_any(NameVisitor)
            .map(WireName)
    }
}

/// Visits a JSON string and maps it without keeping the text
pub(crate) struct TokenVisitor<T>(pub(crate) fn(&str) -> T);

impl<'de, T> Visitor<'de> for TokenVisitor<T> {
    type Value = T;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<T, E> {
        Ok((self.0)(value))
    }

    fn visit_borrowed_str<E: de::Error>(self, value: &'de str) -> Result<T, E> {
        Ok((self.0)(value))
    }
}

/// Accepts a name of any JSON type, keeping only strings
struct NameVisitor;

impl<'de> Visitor<'de> for NameVisitor {
    type Value = Option<PersonName>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a name")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(truncate_name(value))
    }

    fn visit_borrowed_str<E: de::Error>(self, value: &'de str) -> Result<Self::Value, E> {
        Ok(truncate_name(value))
    }

    // Numbers, booleans and null
    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        while seq.next_element::<de::IgnoredAny>()?.is_some() {}
        Ok(None)
    }

    fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        while map.next_entry::<de::IgnoredAny, de::IgnoredAny>()?.is_some() {}
        Ok(None)
    }
}

/// Trimmed person name; empty means absent
fn truncate_name(name: &str) -> Option<PersonName> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(truncate_str(name))
}

/// Copy as much of `text` as fits into a bounded string, cutting at a char
/// boundary
pub(crate) fn truncate_str<const N: usize>(text: &str) -> String<N> {
    let mut end = text.len().min(N);
    while !text.is_char_boundary(end) {
        end -= 1;
    }

    let mut out = String::new();
    // Fits by construction
    let _ = out.push_str(&text[..end]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_priority() {
        assert_eq!(Emotion::classify("awaiting_wake_word"), Emotion::Listening);
        assert_eq!(Emotion::classify("listening"), Emotion::Listening);
        assert_eq!(Emotion::classify("asking_name"), Emotion::Speaking);
        assert_eq!(Emotion::classify("confirming"), Emotion::Speaking);
        assert_eq!(Emotion::classify("speaking"), Emotion::Speaking);
        assert_eq!(Emotion::classify("idle"), Emotion::Idle);
        assert_eq!(Emotion::classify("pulsing"), Emotion::Idle);
        assert_eq!(Emotion::classify(""), Emotion::Idle);

        // Listening wins over speaking when both appear
        assert_eq!(Emotion::classify("asking_then_awaiting"), Emotion::Listening);
        // Match is case-sensitive
        assert_eq!(Emotion::classify("LISTENING"), Emotion::Idle);
    }

    #[test]
    fn test_mode_from_wire() {
        assert_eq!(Mode::from_wire("face"), Mode::Face);
        assert_eq!(Mode::from_wire("eye"), Mode::Eye);
        assert_eq!(Mode::from_wire("FACE"), Mode::Eye);
        assert_eq!(Mode::from_wire("f\u{0}ce??"), Mode::Eye);
        assert_eq!(Mode::from_wire(""), Mode::Eye);
    }

    #[test]
    fn test_parse_face_with_person() {
        let json = br#"{"mode":"face","state":"speaking","person":"Dave"}"#;
        let state = parse_display_state(json).unwrap();
        assert_eq!(state.mode(), Mode::Face);
        assert_eq!(state.emotion(), Emotion::Speaking);
        assert_eq!(state.person(), Some("Dave"));
    }

    #[test]
    fn test_parse_eye_listening() {
        let json = br#"{"mode":"eye","state":"awaiting_wake_word"}"#;
        let state = parse_display_state(json).unwrap();
        assert_eq!(state.mode(), Mode::Eye);
        assert_eq!(state.emotion(), Emotion::Listening);
        assert_eq!(state.person(), None);
    }

    #[test]
    fn test_person_cleared_outside_face() {
        let json = br#"{"mode":"eye","state":"idle","person":"Dave"}"#;
        let state = parse_display_state(json).unwrap();
        assert_eq!(state.person(), None);

        let face = DisplayState::new(Mode::Face, Emotion::Idle, Some("Dave"));
        assert_eq!(face.with_mode(Mode::Eye).person(), None);
    }

    #[test]
    fn test_garbled_mode_is_eye() {
        let json = br#"{"mode":"face-ish-garbage-that-goes-on-for-a-long-long-while","state":"idle"}"#;
        let state = parse_display_state(json).unwrap();
        assert_eq!(state.mode(), Mode::Eye);
    }

    #[test]
    fn test_missing_fields_default() {
        let state = parse_display_state(b"{}").unwrap();
        assert_eq!(state, DisplayState::default());
    }

    #[test]
    fn test_extra_fields_ignored() {
        let json = br#"{"state":"idle","message":"hi","last_person":null,"known_faces":["a","b"],"mode":"face","person":"Ann"}"#;
        let state = parse_display_state(json).unwrap();
        assert_eq!(state.mode(), Mode::Face);
        assert_eq!(state.person(), Some("Ann"));
    }

    #[test]
    fn test_malformed_json() {
        assert_eq!(parse_display_state(b"{\"mode\":"), Err(ParseError::Json));
        assert_eq!(parse_display_state(b"<html>"), Err(ParseError::Json));
        assert_eq!(parse_display_state(b""), Err(ParseError::Json));
    }

    #[test]
    fn test_long_person_truncated() {
        let json = br#"{"mode":"face","state":"idle","person":"Bartholomew Maximilian Featherstonehaugh"}"#;
        let state = parse_display_state(json).unwrap();
        let person = state.person().unwrap();
        assert_eq!(person.len(), MAX_PERSON_LEN);
        assert!("Bartholomew Maximilian Featherstonehaugh".starts_with(person));
    }

    #[test]
    fn test_empty_person_is_absent() {
        let json = br#"{"mode":"face","state":"idle","person":""}"#;
        let state = parse_display_state(json).unwrap();
        assert_eq!(state.person(), None);
    }

    #[test]
    fn test_long_escaped_token() {
        let json = alloc::format!(
            r#"{{"mode":"face","state":"speaking{}
","person":"Dave"}}"#,
            "x".repeat(300)
        );
        let state = parse_display_state(json.as_bytes()).unwrap();
        assert_eq!(state.mode(), Mode::Face);
        assert_eq!(state.emotion(), Emotion::Speaking);
        assert_eq!(state.person(), Some("Dave"));
    }

    #[test]
    fn test_non_string_person_is_absent() {
        for person in ["42", "true", "null", "[1,\"a\"]", "{\"first\":\"Dave\"}"] {
            let json = alloc::format!(r#"{{"mode":"face","state":"speaking","person":{}}}"#, person);
            let state = parse_display_state(json.as_bytes()).unwrap();
            assert_eq!(state.mode(), Mode::Face, "person {}", person);
            assert_eq!(state.emotion(), Emotion::Speaking);
            assert_eq!(state.person(), None);
        }
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        // 31 ASCII bytes followed by a two-byte char straddling the limit
        let name = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\u{e9}";
        let cut = truncate_name(name).unwrap();
        assert_eq!(cut.len(), 31);
    }
}
