//! Display status polling
//!
//! One poll is one `GET /api/hal/display`. Any failure leaves the caller's
//! state untouched; the next attempt happens on the next scheduled tick.

use core::fmt;
use core::str;

use crate::config::{Config, DISPLAY_PATH, STATUS_BODY_CAPACITY};
use crate::state::{DisplayState, ParseError, parse_display_state};
use crate::transport::{Request, Transport, TransportError};

/// A poll produced no new state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollError {
    Transport(TransportError),
    Parse(ParseError),
}

impl fmt::Display for PollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::Transport(e) => write!(f, "transport: {}", e),
            PollError::Parse(e) => write!(f, "parse: {}", e),
        }
    }
}

impl From<TransportError> for PollError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::TooLarge(_) => PollError::Parse(ParseError::Oversized),
            other => PollError::Transport(other),
        }
    }
}

impl From<ParseError> for PollError {
    fn from(e: ParseError) -> Self {
        PollError::Parse(e)
    }
}

/// What a single poll tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Transport reported no connectivity; nothing was sent
    Skipped,
    Updated(DisplayState),
    Failed(PollError),
}

#[derive(Debug, Default)]
pub struct StatePoller {
    consecutive_failures: u32,
    total_failures: u32,
    successes: u32,
}

impl StatePoller {
    pub const fn new() -> Self {
        Self {
            consecutive_failures: 0,
            total_failures: 0,
            successes: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn total_failures(&self) -> u32 {
        self.total_failures
    }

    pub fn successes(&self) -> u32 {
        self.successes
    }

    pub async fn poll<T: Transport>(&mut self, transport: &mut T, config: &Config) -> PollOutcome {
        if !transport.is_connected() {
            return PollOutcome::Skipped;
        }

        match fetch_state(transport, config).await {
            Ok(state) => {
                if self.consecutive_failures > 0 {
                    log::info!(
                        "Status poll recovered after {} failures",
                        self.consecutive_failures
                    );
                }
                self.consecutive_failures = 0;
                self.successes = self.successes.wrapping_add(1);
                log::debug!(
                    "Status: mode={} emotion={:?} person={:?}",
                    state.mode().as_str(),
                    state.emotion(),
                    state.person()
                );
                PollOutcome::Updated(state)
            }
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.total_failures = self.total_failures.wrapping_add(1);
                log::warn!(
                    "Status poll failed ({} in a row): {}",
                    self.consecutive_failures,
                    e
                );
                PollOutcome::Failed(e)
            }
        }
    }
}

async fn fetch_state<T: Transport>(transport: &mut T, config: &Config) -> Result<DisplayState, PollError> {
    let mut body = [0u8; STATUS_BODY_CAPACITY];
    let request = Request::get(DISPLAY_PATH, config.poll_timeout);
    let response = transport.send(&request, &mut body).await?;
    if response.status != 200 {
        return Err(PollError::Transport(TransportError::Status(response.status)));
    }

    let body = &body[..response.len];
    if str::from_utf8(body).is_err() {
        return Err(PollError::Parse(ParseError::InvalidUtf8));
    }
    Ok(parse_display_state(body)?)
}
