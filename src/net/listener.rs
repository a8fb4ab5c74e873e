//! TCP listener with backpressure.
//!
//! # Responsibilities
//! - Bind to an address
//! - Accept incoming TCP connections
//! - Enforce max_connections via a semaphore

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("Failed to accept: {0}")]
    Accept(std::io::Error),
    #[error("Listener closed")]
    Closed,
}

/// A bounded TCP listener.
///
/// When `max_connections` are open, `accept` waits until one closes.
pub struct Listener {
    inner: TcpListener,
    name: &'static str,
    connection_limit: Arc<Semaphore>,
}

impl Listener {
    /// Bind `addr`. `name` labels logs and metrics (`rpc`, `http`).
    pub async fn bind(
        name: &'static str,
        addr: SocketAddr,
        max_connections: usize,
    ) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        tracing::info!(
            listener = name,
            address = %local_addr,
            max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            name,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
        })
    }

    /// Accept a connection, waiting for a free slot first.
    ///
    /// The permit must live as long as the connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            listener = self.name,
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }
}

/// A connection slot, released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = Listener::bind("test", "127.0.0.1:0".parse().unwrap(), 4)
            .await
            .unwrap();
        let taken = first.local_addr().unwrap();
        let err = Listener::bind("test", taken, 4).await.err().unwrap();
        assert!(matches!(err, ListenerError::Bind { addr, .. } if addr == taken));
    }

    #[tokio::test]
    async fn permits_are_held_per_connection() {
        let listener = Listener::bind("test", "127.0.0.1:0".parse().unwrap(), 2)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();

        let (_stream, _peer, permit) = listener.accept().await.unwrap();
        assert_eq!(listener.available_permits(), 1);
        drop(permit);
        assert_eq!(listener.available_permits(), 2);
    }
}
