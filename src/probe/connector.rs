// src/probe/connector.rs

//! Socket collaborator used by the [`Prober`](super::Prober).
//!
//! The prober only needs "can I open a TCP connection to host:port right
//! now?". Production code uses [`TcpConnector`]; tests swap in a connector
//! that fails or succeeds on a script.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// Boxed connect future, borrowed from the connector and the host string.
pub type ConnectFuture<'a> = Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>>;

pub trait SocketConnector: Send + Sync {
    /// Attempt one connection. The socket is released before the future
    /// resolves; only reachability is reported.
    fn connect<'a>(&'a self, host: &'a str, port: u16) -> ConnectFuture<'a>;
}

/// Real TCP connector with a per-attempt timeout.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl SocketConnector for TcpConnector {
    fn connect<'a>(&'a self, host: &'a str, port: u16) -> ConnectFuture<'a> {
        Box::pin(async move {
            let stream = timeout(self.connect_timeout, TcpStream::connect((host, port)))
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect to {host}:{port} timed out"),
                    )
                })??;
            trace!(host, port, local = ?stream.local_addr().ok(), "probe connection opened");
            drop(stream);
            Ok(())
        })
    }
}
