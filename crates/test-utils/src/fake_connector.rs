use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tandem::probe::SocketConnector;
use tandem::probe::connector::ConnectFuture;

/// A connector that refuses every connection, or accepts from the N-th
/// attempt on. Clones share the attempt counter.
#[derive(Debug, Clone)]
pub struct FakeConnector {
    succeed_on: Option<u32>,
    attempts: Arc<AtomicU32>,
}

impl FakeConnector {
    pub fn refusing() -> Self {
        Self {
            succeed_on: None,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Fail attempts `1..n`, succeed from attempt `n`.
    pub fn succeed_on(n: u32) -> Self {
        Self {
            succeed_on: Some(n),
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl SocketConnector for FakeConnector {
    fn connect<'a>(&'a self, host: &'a str, port: u16) -> ConnectFuture<'a> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let accept = self.succeed_on.is_some_and(|n| attempt >= n);
        Box::pin(async move {
            if accept {
                Ok(())
            } else {
                Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("connection refused ({host}:{port})"),
                ))
            }
        })
    }
}
