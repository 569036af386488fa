//! Simple HTTP/1.1 client for no_std environments
//!
//! Sends one request per connection (`Connection: close`) and reads the whole
//! response body into a caller-provided buffer. Works over anything that
//! implements `embedded_io_async::{Read, Write}`, so the same code runs on a
//! TCP socket and on an in-memory stream in tests.

use core::fmt::{self, Write as FmtWrite};
use core::str;
use embedded_io_async::{Read, Write};
use heapless::String;

use crate::transport::Method;

/// Headers larger than this are rejected
const HEADER_BUF_SIZE: usize = 1024;

/// Request line plus headers
const REQUEST_HEAD_SIZE: usize = 512;

/// HTTP client error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    /// Failed to connect to server
    Connect,
    /// Failed to write request
    Write,
    /// Failed to read response, or the body ended early
    Read,
    /// Invalid URL format
    InvalidUrl,
    /// Response parsing error
    Parse,
    /// HTTP error status code
    Status(u16),
    /// Response body larger than the buffer (declared or observed size)
    TooLarge(usize),
    /// Request did not finish in time
    Timeout,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::Connect => write!(f, "connect failed"),
            HttpError::Write => write!(f, "write failed"),
            HttpError::Read => write!(f, "read failed"),
            HttpError::InvalidUrl => write!(f, "invalid URL"),
            HttpError::Parse => write!(f, "malformed response"),
            HttpError::Status(code) => write!(f, "HTTP status {}", code),
            HttpError::TooLarge(size) => write!(f, "response too large ({} bytes)", size),
            HttpError::Timeout => write!(f, "timed out"),
        }
    }
}

/// Parsed URL components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Url<'a> {
    pub host: &'a str,
    pub port: u16,
    pub path: &'a str,
}

impl<'a> Url<'a> {
    /// Parse a URL string into components
    /// Supports: http://host:port/path
    pub fn parse(url: &'a str) -> Result<Self, HttpError> {
        let rest = url.strip_prefix("http://").ok_or(HttpError::InvalidUrl)?;

        // Find path separator
        let (host_port, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        // Parse host and optional port
        let (host, port) = match host_port.find(':') {
            Some(idx) => {
                let port = host_port[idx + 1..]
                    .parse()
                    .map_err(|_| HttpError::InvalidUrl)?;
                (&host_port[..idx], port)
            }
            None => (host_port, 80),
        };

        if host.is_empty() {
            return Err(HttpError::InvalidUrl);
        }

        Ok(Url { host, port, path })
    }
}

/// Response status and how much of the body buffer was filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_length: Option<usize>,
    pub body_len: usize,
}

/// Perform one request and read the response body into `body`.
///
/// Non-2xx responses fail with [`HttpError::Status`] without reading the
/// body. A `Content-Length` larger than `body` fails with
/// [`HttpError::TooLarge`] before any body byte is read; without a length
/// the body is read to EOF and fails the same way once it overflows.
pub async fn request<C>(
    conn: &mut C,
    method: Method,
    host: &str,
    path: &str,
    payload: Option<&[u8]>,
    body: &mut [u8],
) -> Result<HttpResponse, HttpError>
where
    C: Read + Write,
{
    // Build request
    let mut head: String<REQUEST_HEAD_SIZE> = String::new();
    write!(
        &mut head,
        "{} {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n",
        method.as_str(),
        path,
        host
    )
    .map_err(|_| HttpError::InvalidUrl)?;
    if let Some(payload) = payload {
        write!(
            &mut head,
            "Content-Type: application/json\r\nContent-Length: {}\r\n",
            payload.len()
        )
        .map_err(|_| HttpError::InvalidUrl)?;
    }
    head.push_str("\r\n").map_err(|_| HttpError::InvalidUrl)?;

    // Send request
    conn.write_all(head.as_bytes())
        .await
        .map_err(|_| HttpError::Write)?;
    if let Some(payload) = payload {
        conn.write_all(payload).await.map_err(|_| HttpError::Write)?;
    }
    conn.flush().await.map_err(|_| HttpError::Write)?;

    // Read until we find \r\n\r\n
    let mut head_buf = [0u8; HEADER_BUF_SIZE];
    let mut total_read = 0;
    let headers_end = loop {
        if total_read >= head_buf.len() {
            return Err(HttpError::Parse);
        }

        let n = conn
            .read(&mut head_buf[total_read..])
            .await
            .map_err(|_| HttpError::Read)?;
        if n == 0 {
            return Err(HttpError::Read);
        }
        total_read += n;

        if let Some(pos) = find_header_end(&head_buf[..total_read]) {
            break pos;
        }
    };

    let header_str = str::from_utf8(&head_buf[..headers_end]).map_err(|_| HttpError::Parse)?;
    let status = parse_status(header_str)?;
    if !(200..300).contains(&status) {
        return Err(HttpError::Status(status));
    }

    if parse_header(header_str, "transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    {
        return Err(HttpError::Parse);
    }

    let content_length = match parse_header(header_str, "content-length") {
        Some(value) => Some(value.parse::<usize>().map_err(|_| HttpError::Parse)?),
        None => None,
    };
    if let Some(len) = content_length
        && len > body.len()
    {
        return Err(HttpError::TooLarge(len));
    }
    let expected = content_length.unwrap_or(body.len());

    // Body bytes that arrived with the headers
    let body_start = headers_end + 4;
    let initial = &head_buf[body_start..total_read];
    if content_length.is_none() && initial.len() > body.len() {
        return Err(HttpError::TooLarge(initial.len()));
    }
    let initial_len = initial.len().min(expected);
    body[..initial_len].copy_from_slice(&initial[..initial_len]);
    let mut body_len = initial_len;

    // Continue reading body
    while body_len < expected {
        let n = conn
            .read(&mut body[body_len..expected])
            .await
            .map_err(|_| HttpError::Read)?;
        if n == 0 {
            break;
        }
        body_len += n;
    }

    match content_length {
        // Server closed before sending everything it announced
        Some(len) if body_len < len => return Err(HttpError::Read),
        // Undeclared body filled the buffer; anything more is an overflow
        None if body_len == body.len() => {
            let mut extra = [0u8; 1];
            let n = conn.read(&mut extra).await.map_err(|_| HttpError::Read)?;
            if n > 0 {
                return Err(HttpError::TooLarge(body_len + n));
            }
        }
        _ => {}
    }

    Ok(HttpResponse {
        status,
        content_length,
        body_len,
    })
}

/// Find the position of \r\n\r\n in the buffer
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Parse HTTP status code from status line
pub fn parse_status(headers: &str) -> Result<u16, HttpError> {
    // HTTP/1.1 200 OK
    let line = headers.lines().next().ok_or(HttpError::Parse)?;
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().ok_or(HttpError::Parse)?;
    if !version.starts_with("HTTP/") {
        return Err(HttpError::Parse);
    }
    parts
        .next()
        .ok_or(HttpError::Parse)?
        .parse()
        .map_err(|_| HttpError::Parse)
}

/// Parse a header value (case-insensitive)
pub fn parse_header<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    headers
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

/// Parse a dotted-quad IPv4 address
pub fn parse_ipv4(host: &str) -> Result<core::net::Ipv4Addr, HttpError> {
    host.parse().map_err(|_| HttpError::InvalidUrl)
}
