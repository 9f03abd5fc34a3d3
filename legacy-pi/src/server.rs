//! TCP + UDP listeners speaking the legacy estimator protocol.
//!
//! Both transports share one port.  The protocol has no framing and no
//! request body:
//!
//! - **TCP**: the peer connects; after the configured delay the server writes
//!   one payload and closes the connection.
//! - **UDP**: any datagram (normally empty) triggers one reply datagram to
//!   the sender after the configured delay.
//!
//! Every connection / datagram is served on its own tokio task, so slow
//! replies never hold up the accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;

use crate::noise::NoiseModel;

/// Default port of the legacy estimator.
pub const DEFAULT_PORT: u16 = 31416;

/// Artificial latency the legacy estimator adds before every reply.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// Incoming UDP datagrams are discarded after this many bytes.
const MAX_DATAGRAM: usize = 1024;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that prevent the emulator from starting.
#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("failed to bind TCP listener on {addr}: {source}")]
    BindTcp {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("failed to bind UDP socket on {addr}: {source}")]
    BindUdp {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Emulator settings.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Address for both listeners.  Port 0 lets the OS pick one port, which
    /// is then reused for UDP.
    pub bind: SocketAddr,
    /// Delay before each reply.
    pub delay: Duration,
    /// Fault model for reply payloads.
    pub noise: NoiseModel,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            delay: DEFAULT_DELAY,
            noise: NoiseModel::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A running emulator.  Dropping the handle does not stop it; call
/// [`EmulatorHandle::abort`].
#[derive(Debug)]
pub struct EmulatorHandle {
    /// Address both transports are served on.
    pub local_addr: SocketAddr,
    tcp_task: JoinHandle<()>,
    udp_task: JoinHandle<()>,
}

impl EmulatorHandle {
    /// Stop both listeners.  Replies already in flight are dropped.
    pub fn abort(&self) {
        self.tcp_task.abort();
        self.udp_task.abort();
    }

    /// Wait until both listener tasks finish.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.tcp_task.await?;
        self.udp_task.await
    }
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// Bind both transports and start serving in background tasks.
pub async fn start(config: EmulatorConfig) -> Result<EmulatorHandle, EmulatorError> {
    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|source| EmulatorError::BindTcp {
            addr: config.bind,
            source,
        })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| EmulatorError::BindTcp {
            addr: config.bind,
            source,
        })?;

    let udp = UdpSocket::bind(local_addr)
        .await
        .map_err(|source| EmulatorError::BindUdp {
            addr: local_addr,
            source,
        })?;

    let noise = Arc::new(config.noise);
    log::info!("legacy estimator listening on {local_addr} (tcp + udp)");

    let tcp_task = tokio::spawn(serve_tcp(listener, config.delay, Arc::clone(&noise)));
    let udp_task = tokio::spawn(serve_udp(Arc::new(udp), config.delay, noise));

    Ok(EmulatorHandle {
        local_addr,
        tcp_task,
        udp_task,
    })
}

async fn serve_tcp(listener: TcpListener, delay: Duration, noise: Arc<NoiseModel>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                log::info!("TCP client connected from {peer}");
                tokio::spawn(reply_tcp(stream, peer, delay, Arc::clone(&noise)));
            }
            Err(e) => log::warn!("TCP accept failed: {e}"),
        }
    }
}

async fn reply_tcp(mut stream: TcpStream, peer: SocketAddr, delay: Duration, noise: Arc<NoiseModel>) {
    tokio::time::sleep(delay).await;
    let payload = noise.render(&mut rand::rng());
    if let Err(e) = stream.write_all(payload.as_bytes()).await {
        log::warn!("TCP reply to {peer} failed: {e}");
        return;
    }
    if let Err(e) = stream.shutdown().await {
        log::debug!("TCP shutdown for {peer} failed: {e}");
    }
}

async fn serve_udp(socket: Arc<UdpSocket>, delay: Duration, noise: Arc<NoiseModel>) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((_, peer)) => {
                log::info!("UDP client request from {peer}");
                let socket = Arc::clone(&socket);
                let noise = Arc::clone(&noise);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let payload = noise.render(&mut rand::rng());
                    if let Err(e) = socket.send_to(payload.as_bytes(), peer).await {
                        log::warn!("UDP reply to {peer} failed: {e}");
                    }
                });
            }
            Err(e) => log::warn!("UDP receive failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_legacy_estimator() {
        let config = EmulatorConfig::default();
        assert_eq!(config.bind.port(), DEFAULT_PORT);
        assert_eq!(config.delay, Duration::from_millis(500));
        assert_eq!(config.noise, NoiseModel::default());
    }

    #[tokio::test]
    async fn binds_both_transports_on_one_port() {
        let handle = start(EmulatorConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            delay: Duration::ZERO,
            noise: NoiseModel::exact(),
        })
        .await
        .expect("start emulator");

        assert_ne!(handle.local_addr.port(), 0);
        // The UDP socket holds the same port, so a second UDP bind must fail.
        assert!(UdpSocket::bind(handle.local_addr).await.is_err());
        handle.abort();
    }
}
