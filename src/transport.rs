//! Request/response seam between the controller and the network
//!
//! Periodic tasks only see this trait: the firmware plugs in the embassy-net
//! transport, tests plug in a scripted one. Every call carries its own
//! timeout; a timed-out call is reported like any other transport failure.

use core::fmt;
use embassy_time::Duration;

use crate::http::HttpError;

/// HTTP method used by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// A single request against the configured server
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub method: Method,
    /// Path and query, starting with `/`
    pub path: &'a str,
    /// JSON body for POST
    pub body: Option<&'a [u8]>,
    pub timeout: Duration,
}

impl<'a> Request<'a> {
    pub fn get(path: &'a str, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            path,
            body: None,
            timeout,
        }
    }

    pub fn post_json(path: &'a str, body: &'a [u8], timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            path,
            body: Some(body),
            timeout,
        }
    }
}

/// Successful response; the body is in the caller's buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    /// Number of body bytes written to the buffer
    pub len: usize,
}

/// Request failed before a usable body was received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No link or no address; nothing was sent
    NotConnected,
    /// The request did not complete within its timeout
    Timeout,
    /// Server answered with a non-2xx status
    Status(u16),
    /// Connect, write or read failure
    Io,
    /// Body would not fit the caller's buffer (declared or observed size)
    TooLarge(usize),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotConnected => write!(f, "not connected"),
            TransportError::Timeout => write!(f, "timed out"),
            TransportError::Status(code) => write!(f, "HTTP status {}", code),
            TransportError::Io => write!(f, "I/O error"),
            TransportError::TooLarge(size) => write!(f, "body too large ({} bytes)", size),
        }
    }
}

impl From<HttpError> for TransportError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Status(code) => TransportError::Status(code),
            HttpError::TooLarge(size) => TransportError::TooLarge(size),
            HttpError::Timeout => TransportError::Timeout,
            HttpError::Connect
            | HttpError::Write
            | HttpError::Read
            | HttpError::InvalidUrl
            | HttpError::Parse => TransportError::Io,
        }
    }
}

/// Network collaborator
///
/// `send` writes the response body into `body` and must fail with
/// [`TransportError::TooLarge`] instead of truncating, checking a declared
/// `Content-Length` before reading any of the body.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Cheap local connectivity check, no network traffic
    fn is_connected(&self) -> bool;

    async fn send(&mut self, request: &Request<'_>, body: &mut [u8]) -> Result<Response, TransportError>;
}
