//! Legacy estimator client: one blocking TCP or UDP round-trip per call.
//!
//! The legacy protocol has no framing.  Over TCP the server writes its reply
//! and closes; over UDP an empty datagram triggers exactly one reply
//! datagram.  Calls are never retried.

use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::request::Transport;

/// Default address of the legacy estimator.
pub const DEFAULT_LEGACY_ADDR: &str = "127.0.0.1:31416";

/// Connect/read/write timeout for one round-trip.  The estimator sleeps about
/// 0.5s before answering.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Replies longer than this are truncated.
pub const MAX_REPLY: usize = 1024;

#[derive(Debug, Error)]
pub enum LegacyError {
    #[error("Invalid legacy address: {0}")]
    Address(String),
    #[error("Timeout waiting for legacy estimator")]
    Timeout,
    #[error("Network error: {0}")]
    Network(String),
    #[error("Reply is not valid UTF-8")]
    Encoding,
}

impl From<std::io::Error> for LegacyError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => LegacyError::Timeout,
            _ => LegacyError::Network(e.to_string()),
        }
    }
}

/// Client for one legacy estimator endpoint.
#[derive(Debug, Clone)]
pub struct LegacyClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl LegacyClient {
    /// Resolve `addr` once up front so each query skips the lookup.
    pub fn new(addr: &str) -> Result<Self, LegacyError> {
        let addr = addr
            .to_socket_addrs()
            .map_err(|e| LegacyError::Address(format!("{}: {}", addr, e)))?
            .next()
            .ok_or_else(|| LegacyError::Address(addr.to_string()))?;
        Ok(Self::with_addr(addr))
    }

    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: QUERY_TIMEOUT,
        }
    }

    /// Override the per-round-trip timeout.  A zero duration is ignored since
    /// the socket APIs reject it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// One round-trip over `transport`, returning the raw reply text.
    pub fn query(&self, transport: Transport) -> Result<String, LegacyError> {
        let bytes = match transport {
            Transport::Tcp => query_tcp(self.addr, self.timeout)?,
            Transport::Udp => query_udp(self.addr, self.timeout)?,
        };
        String::from_utf8(bytes).map_err(|_| LegacyError::Encoding)
    }
}

/// Connect and read until the peer closes or [`MAX_REPLY`] bytes arrive.
///
/// `timeout` bounds the whole round-trip, not each read: a peer trickling
/// bytes still runs into the deadline.
pub fn query_tcp(addr: SocketAddr, timeout: Duration) -> Result<Vec<u8>, LegacyError> {
    let deadline = Instant::now() + timeout;
    let mut stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_write_timeout(Some(timeout))?;

    let mut reply = Vec::with_capacity(64);
    let mut buf = [0u8; MAX_REPLY];
    while reply.len() < MAX_REPLY {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(LegacyError::Timeout);
        }
        stream.set_read_timeout(Some(remaining))?;
        match stream.read(&mut buf[..MAX_REPLY - reply.len()]) {
            Ok(0) => break,
            Ok(n) => reply.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(reply)
}

/// Send an empty datagram and wait for one reply datagram.
pub fn query_udp(addr: SocketAddr, timeout: Duration) -> Result<Vec<u8>, LegacyError> {
    let local = if addr.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };

    let socket = UdpSocket::bind(local)?;
    socket.set_read_timeout(Some(timeout))?;
    socket.set_write_timeout(Some(timeout))?;
    socket.connect(addr)?;
    socket.send(b"")?;

    let mut buf = [0u8; MAX_REPLY];
    let len = socket.recv(&mut buf)?;
    Ok(buf[..len].to_vec())
}
