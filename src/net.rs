//! embassy-net transport
//!
//! One TCP connection per request against the server given at startup. The
//! whole exchange (DNS, connect, request, body) runs under the request's
//! timeout.

use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::Stack;
use embassy_time::with_timeout;

use crate::http::{self, HttpError, Url};
use crate::transport::{Request, Response, Transport, TransportError};

const SOCKET_RX_SIZE: usize = 4096;
const SOCKET_TX_SIZE: usize = 1024;

pub struct NetTransport<'a> {
    stack: Stack<'a>,
    host: &'a str,
    port: u16,
    rx_buf: [u8; SOCKET_RX_SIZE],
    tx_buf: [u8; SOCKET_TX_SIZE],
}

impl<'a> NetTransport<'a> {
    /// `server_url` is the base URL, e.g. `http://192.168.1.20:5000`
    pub fn new(stack: Stack<'a>, server_url: &'a str) -> Result<Self, HttpError> {
        let url = Url::parse(server_url)?;
        Ok(Self {
            stack,
            host: url.host,
            port: url.port,
            rx_buf: [0; SOCKET_RX_SIZE],
            tx_buf: [0; SOCKET_TX_SIZE],
        })
    }

    async fn exchange(&mut self, request: &Request<'_>, body: &mut [u8]) -> Result<Response, HttpError> {
        let stack = self.stack;
        let host = self.host;

        let ip = resolve_host(stack, host).await?;
        let mut socket = TcpSocket::new(stack, &mut self.rx_buf, &mut self.tx_buf);
        socket.set_timeout(Some(request.timeout));
        socket
            .connect((ip, self.port))
            .await
            .map_err(|_| HttpError::Connect)?;

        let result = http::request(
            &mut socket,
            request.method,
            host,
            request.path,
            request.body,
            body,
        )
        .await;
        socket.close();

        let response = result?;
        Ok(Response {
            status: response.status,
            len: response.body_len,
        })
    }
}

impl Transport for NetTransport<'_> {
    fn is_connected(&self) -> bool {
        self.stack.is_link_up() && self.stack.config_v4().is_some()
    }

    async fn send(&mut self, request: &Request<'_>, body: &mut [u8]) -> Result<Response, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        match with_timeout(request.timeout, self.exchange(request, body)).await {
            Ok(result) => result.map_err(TransportError::from),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

/// Resolve a hostname to an IPv4 address
/// Tries parsing as IPv4 first, falls back to DNS lookup
async fn resolve_host(stack: Stack<'_>, host: &str) -> Result<core::net::Ipv4Addr, HttpError> {
    if let Ok(ip) = http::parse_ipv4(host) {
        return Ok(ip);
    }

    log::debug!("Resolving hostname: {}", host);
    let addrs = stack
        .dns_query(host, DnsQueryType::A)
        .await
        .map_err(|_| HttpError::InvalidUrl)?;

    if let Some(embassy_net::IpAddress::Ipv4(v4)) = addrs.first() {
        let octets = v4.octets();
        return Ok(core::net::Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]));
    }

    Err(HttpError::InvalidUrl)
}
