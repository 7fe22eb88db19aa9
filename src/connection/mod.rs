//! Outbound link to the collector.
//!
//! The [`Connection`] owns one TCP stream and an online flag. It never retries
//! by itself; the scheduler decides when to call [`Link::initialize`] again.

pub mod outbox;
pub mod types;

pub use outbox::*;
pub use types::*;

use crate::config::ServerSettings;
use crate::error::{ConfigError, LinkError};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

/// What the scheduler needs from a collector link.
pub trait Link {
    /// (Re)establishes the link. A no-op returning `true` when already online.
    fn initialize(&mut self) -> impl Future<Output = bool>;

    /// Last known state; cheap and non-blocking.
    fn is_online(&self) -> bool;

    /// Writes one action without blocking. `Ok` only once every byte of it
    /// has been handed to the socket; any `Err` means the caller still owns
    /// the action. A detected write failure marks the link offline.
    fn send(&mut self, action: &UserAction) -> Result<(), LinkError>;

    /// Pushes out bytes left over from an earlier partial write. `Ok` once
    /// nothing is left.
    fn flush(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}

/// Collector address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// TCP connection to the collector.
#[derive(Debug)]
pub struct Connection {
    endpoint: Endpoint,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
    /// Unwritten tail of the last line. `send` refuses new lines until this
    /// is empty, so it never holds more than one line.
    pending: Vec<u8>,
}

impl Connection {
    pub fn new(endpoint: Endpoint, connect_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
            stream: None,
            pending: Vec::new(),
        }
    }

    pub fn from_settings(server: &ServerSettings) -> Result<Self, ConfigError> {
        let endpoint = Endpoint {
            host: server.ip.trim().to_string(),
            port: server.port_number()?,
        };
        Ok(Self::new(
            endpoint,
            Duration::from_millis(server.connect_timeout),
        ))
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Unwritten tail of a partially written line.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    /// Writes as much of the pending buffer as the socket accepts right now.
    fn write_pending(&mut self) -> Result<(), LinkError> {
        let result = {
            let Some(stream) = self.stream.as_ref() else {
                return Err(LinkError::Offline);
            };

            let mut result = Ok(());
            while !self.pending.is_empty() {
                match stream.try_write(&self.pending) {
                    Ok(0) => {
                        result = Err(io::Error::new(
                            io::ErrorKind::WriteZero,
                            "collector accepted zero bytes",
                        ));
                        break;
                    }
                    Ok(n) => {
                        self.pending.drain(..n);
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
            }
            result
        };

        if let Err(e) = result {
            self.mark_offline(&e);
            return Err(LinkError::Write(e));
        }
        if !self.pending.is_empty() {
            return Err(LinkError::Backpressure {
                pending: self.pending.len(),
            });
        }
        Ok(())
    }

    fn mark_offline(&mut self, error: &io::Error) {
        let dropped = self.pending.len();
        self.stream = None;
        self.pending.clear();
        tracing::warn!(
            endpoint = %self.endpoint,
            error = %error,
            dropped_bytes = dropped,
            "Collector connection lost"
        );
    }
}

impl Link for Connection {
    async fn initialize(&mut self) -> bool {
        if self.stream.is_some() {
            return true;
        }

        let addr = (self.endpoint.host.as_str(), self.endpoint.port);
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
                }
                self.stream = Some(stream);
                self.pending.clear();
                tracing::info!(endpoint = %self.endpoint, "Connected to collector");
                true
            }
            Ok(Err(e)) => {
                tracing::debug!(endpoint = %self.endpoint, error = %e, "Connect failed");
                false
            }
            Err(_) => {
                tracing::debug!(
                    endpoint = %self.endpoint,
                    timeout_ms = self.connect_timeout.as_millis() as u64,
                    "Connect timed out"
                );
                false
            }
        }
    }

    fn is_online(&self) -> bool {
        self.stream.is_some()
    }

    fn send(&mut self, action: &UserAction) -> Result<(), LinkError> {
        if self.stream.is_none() {
            return Err(LinkError::Offline);
        }
        self.write_pending()?;

        let line = action.to_line()?;
        self.pending.extend_from_slice(&line);
        self.write_pending()
    }

    fn flush(&mut self) -> Result<(), LinkError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.write_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;

    fn action(message: &str) -> UserAction {
        UserAction::new(&Identity::default(), ActionKind::Process, message)
    }

    async fn listener() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (
            listener,
            Endpoint {
                host: "127.0.0.1".to_string(),
                port,
            },
        )
    }

    /// A port that was bound and released, so nothing listens on it.
    async fn closed_endpoint() -> Endpoint {
        let (listener, endpoint) = listener().await;
        drop(listener);
        endpoint
    }

    #[test]
    fn test_from_settings_defaults() {
        let conn = Connection::from_settings(&ServerSettings::default()).unwrap();
        assert_eq!(conn.endpoint().host, "localhost");
        assert_eq!(conn.endpoint().port, 30002);
        assert!(!conn.is_online());
    }

    #[tokio::test]
    async fn test_initialize_fails_when_nothing_listens() {
        let mut conn = Connection::new(closed_endpoint().await, Duration::from_secs(2));
        assert!(!conn.initialize().await);
        assert!(!conn.is_online());
    }

    #[tokio::test]
    async fn test_send_while_offline() {
        let mut conn = Connection::new(closed_endpoint().await, Duration::from_secs(1));
        assert!(matches!(conn.send(&action("x")), Err(LinkError::Offline)));
        assert_eq!(conn.pending_bytes(), 0);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent_when_online() {
        let (listener, endpoint) = listener().await;
        let mut conn = Connection::new(endpoint, Duration::from_secs(2));

        assert!(conn.initialize().await);
        let (_peer, _) = listener.accept().await.unwrap();
        assert!(conn.is_online());

        // A second call must not open another socket.
        assert!(conn.initialize().await);
        assert!(conn.is_online());
        let second = tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
        assert!(second.is_err(), "no second connection expected");
    }

    #[tokio::test]
    async fn test_send_delivers_json_lines() {
        let (listener, endpoint) = listener().await;
        let mut conn = Connection::new(endpoint, Duration::from_secs(2));
        assert!(conn.initialize().await);
        let (peer, _) = listener.accept().await.unwrap();

        conn.send(&action("first")).unwrap();
        conn.send(&action("second")).unwrap();

        let mut lines = tokio::io::BufReader::new(peer).lines();
        let first: UserAction =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let second: UserAction =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first.message, "first");
        assert_eq!(second.message, "second");
        assert_eq!(conn.pending_bytes(), 0);
    }

    #[tokio::test]
    async fn test_stalled_collector_applies_backpressure() {
        let (listener, endpoint) = listener().await;
        let mut conn = Connection::new(endpoint, Duration::from_secs(2));
        assert!(conn.initialize().await);
        // Accepted but never read from.
        let (_peer, _) = listener.accept().await.unwrap();

        let big = action(&"x".repeat(4096));
        let line_len = big.to_line().unwrap().len();

        let mut written = 0;
        let mut stalled = false;
        for _ in 0..20_000 {
            match conn.send(&big) {
                Ok(()) => written += 1,
                Err(LinkError::Backpressure { pending }) => {
                    assert!(pending <= line_len);
                    stalled = true;
                    break;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert!(stalled, "socket buffers never filled after {written} sends");
        assert!(conn.is_online());
        assert!(conn.pending_bytes() <= line_len);

        // Still stalled: nothing new is taken on.
        assert!(matches!(
            conn.send(&action("next")),
            Err(LinkError::Backpressure { .. })
        ));
        assert!(conn.pending_bytes() <= line_len);
        assert!(matches!(conn.flush(), Err(LinkError::Backpressure { .. })));
    }

    #[tokio::test]
    async fn test_write_failure_marks_offline() {
        let (listener, endpoint) = listener().await;
        let mut conn = Connection::new(endpoint, Duration::from_secs(2));
        assert!(conn.initialize().await);
        let (peer, _) = listener.accept().await.unwrap();
        drop(peer);

        let mut failed = false;
        for _ in 0..200 {
            match conn.send(&action("after close")) {
                Err(LinkError::Write(_)) => {
                    failed = true;
                    break;
                }
                Err(LinkError::Offline) => panic!("offline before a write failed"),
                _ => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }

        assert!(failed, "writes to a closed peer never failed");
        assert!(!conn.is_online());
        assert_eq!(conn.pending_bytes(), 0);
        assert!(matches!(conn.send(&action("x")), Err(LinkError::Offline)));
    }
}
