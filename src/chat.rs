//! Touch-triggered chat with the backend
//!
//! Request: `POST /api/chat` with `{"message": "...", "history": []}`.
//! Response: `{"response": "..."}`. The reply is cut to what fits on the
//! status label.

use core::fmt;
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};

use crate::config::{CHAT_BODY_CAPACITY, CHAT_PATH, Config};
use crate::render::{LABEL_CAPACITY, LabelText};
use crate::state::{ParseError, TokenVisitor, truncate_str};
use crate::transport::{Request, Transport, TransportError};

/// Serialized request size limit
const REQUEST_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatError {
    /// Message did not fit the request buffer
    Encode,
    Transport(TransportError),
    Parse(ParseError),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Encode => write!(f, "message too long"),
            ChatError::Transport(e) => write!(f, "transport: {}", e),
            ChatError::Parse(e) => write!(f, "parse: {}", e),
        }
    }
}

impl From<TransportError> for ChatError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::TooLarge(_) => ChatError::Parse(ParseError::Oversized),
            other => ChatError::Transport(other),
        }
    }
}

impl From<ParseError> for ChatError {
    fn from(e: ParseError) -> Self {
        ChatError::Parse(e)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    history: &'a [&'a str],
}

#[derive(Deserialize)]
struct ChatResponse {
    response: ReplyText,
}

struct ReplyText(LabelText);

impl<'de> Deserialize<'de> for ReplyText {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer
            .deserialize_str(TokenVisitor(truncate_str::<LABEL_CAPACITY>))
            .map(ReplyText)
    }
}

/// Encode a chat request with an empty history
pub fn encode_request<'b>(message: &str, buf: &'b mut [u8]) -> Result<&'b [u8], ChatError> {
    let request = ChatRequest {
        message,
        history: &[],
    };
    let len = serde_json_core::to_slice(&request, buf).map_err(|_| ChatError::Encode)?;
    Ok(&buf[..len])
}

/// Parse a chat reply body
pub fn parse_reply(body: &[u8]) -> Result<LabelText, ParseError> {
    let mut scratch = [0u8; CHAT_BODY_CAPACITY];
    let (reply, _): (ChatResponse, usize) =
        serde_json_core::from_slice_escaped(body, &mut scratch).map_err(|_| ParseError::Json)?;
    Ok(reply.response.0)
}

#[derive(Debug, Default)]
pub struct ChatClient {
    sent: u32,
    failed: u32,
}

impl ChatClient {
    pub const fn new() -> Self {
        Self { sent: 0, failed: 0 }
    }

    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn failed(&self) -> u32 {
        self.failed
    }

    /// Send `message` and return the (truncated) reply
    pub async fn ask<T: Transport>(
        &mut self,
        transport: &mut T,
        config: &Config,
        message: &str,
    ) -> Result<LabelText, ChatError> {
        self.sent = self.sent.wrapping_add(1);
        let result = self.ask_inner(transport, config, message).await;
        if let Err(e) = &result {
            self.failed = self.failed.wrapping_add(1);
            log::warn!("Chat request failed: {}", e);
        }
        result
    }

    async fn ask_inner<T: Transport>(
        &mut self,
        transport: &mut T,
        config: &Config,
        message: &str,
    ) -> Result<LabelText, ChatError> {
        if !transport.is_connected() {
            return Err(ChatError::Transport(TransportError::NotConnected));
        }

        let mut request_buf = [0u8; REQUEST_CAPACITY];
        let payload = encode_request(message, &mut request_buf)?;
        log::info!("Chat: {}", message);

        let mut body = [0u8; CHAT_BODY_CAPACITY];
        let request = Request::post_json(CHAT_PATH, payload, config.chat_timeout);
        let response = transport.send(&request, &mut body).await?;
        if response.status != 200 {
            return Err(ChatError::Transport(TransportError::Status(response.status)));
        }

        let reply = parse_reply(&body[..response.len])?;
        log::info!("Chat reply: {}", reply);
        Ok(reply)
    }
}
