//! Controller configuration
//!
//! Defaults match the 2.1" round knob display and the cadence the backend
//! expects. Host and credentials are not part of this: the firmware binary
//! bakes them in at build time.

use core::fmt::Write as FmtWrite;
use embassy_time::Duration;
use heapless::String;

/// Display status endpoint
pub const DISPLAY_PATH: &str = "/api/hal/display";
/// Face frame endpoint (query string is appended per request)
pub const FACE_FRAME_PATH: &str = "/api/hal/face_frame";
/// Chat endpoint used by the touch path
pub const CHAT_PATH: &str = "/api/chat";

/// Side length of the square panel in pixels
pub const DISPLAY_SIZE: u32 = 480;

/// Face frame bodies at or above this size are rejected without decoding
pub const FRAME_BODY_LIMIT: usize = 200_000;

/// Receive buffer for the display status JSON
pub const STATUS_BODY_CAPACITY: usize = 1024;

/// Receive buffer for chat replies
pub const CHAT_BODY_CAPACITY: usize = 2048;

/// Message sent when the knob is tapped
pub const DEFAULT_CHAT_PROMPT: &str = "Hello, HAL.";

/// Runtime configuration for the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Panel side length, also sent as the face frame `size` parameter
    pub display_size: u32,
    /// Status poll cadence
    pub poll_period: Duration,
    /// Face frame fetch cadence (FACE mode only)
    pub frame_period: Duration,
    /// Eye animation tick
    pub animation_period: Duration,
    /// Timeout for a status poll request
    pub poll_timeout: Duration,
    /// Timeout for a face frame request
    pub frame_timeout: Duration,
    /// Timeout for a chat request
    pub chat_timeout: Duration,
    /// Exclusive upper bound on face frame body size
    pub frame_body_limit: usize,
    /// Message sent on tap
    pub chat_prompt: &'static str,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            display_size: DISPLAY_SIZE,
            poll_period: Duration::from_millis(1000),
            frame_period: Duration::from_millis(200),
            animation_period: Duration::from_millis(33),
            poll_timeout: Duration::from_secs(2),
            frame_timeout: Duration::from_secs(3),
            chat_timeout: Duration::from_secs(15),
            frame_body_limit: FRAME_BODY_LIMIT,
            chat_prompt: DEFAULT_CHAT_PROMPT,
        }
    }

    pub fn with_display_size(mut self, size: u32) -> Self {
        self.display_size = size;
        self
    }

    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    pub fn with_frame_period(mut self, period: Duration) -> Self {
        self.frame_period = period;
        self
    }

    pub fn with_frame_body_limit(mut self, limit: usize) -> Self {
        self.frame_body_limit = limit;
        self
    }

    pub fn with_chat_prompt(mut self, prompt: &'static str) -> Self {
        self.chat_prompt = prompt;
        self
    }

    /// Path and query for the face frame request
    pub fn face_frame_path(&self) -> String<64> {
        let mut path = String::new();
        // Longest possible value is well under 64 bytes
        let _ = write!(
            &mut path,
            "{}?red=true&size={}",
            FACE_FRAME_PATH, self.display_size
        );
        path
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
