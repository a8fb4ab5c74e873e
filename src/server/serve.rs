//! Accept loop and per-connection serving with graceful drain.

use std::time::Duration;

use axum::{body::Body, extract::ConnectInfo, http::Request, Router};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use tokio::net::TcpStream;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use crate::net::{ConnectionGuard, ConnectionPermit, ConnectionTracker, Listener, ListenerError};

/// Time `on_timeout` gets to unwind in-flight work before the abort.
const ABORT_SETTLE: Duration = Duration::from_millis(100);

/// How a listener ended up stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every connection finished before the deadline.
    Graceful,
    /// The deadline passed; the worker and its connections were aborted.
    Forced,
    /// Nothing was serving.
    NotRunning,
}

/// A listener being served on its own task.
pub(crate) struct ServeHandle {
    name: &'static str,
    drain: CancellationToken,
    tracker: ConnectionTracker,
    task: JoinHandle<()>,
}

impl ServeHandle {
    /// Spawn the accept loop. A serve failure exits the process.
    pub(crate) fn spawn(listener: Listener, router: Router) -> Self {
        let name = listener.name();
        let drain = CancellationToken::new();
        let tracker = ConnectionTracker::new(name);
        let task = tokio::spawn({
            let drain = drain.clone();
            let tracker = tracker.clone();
            async move {
                if let Err(e) = serve(listener, router, tracker, drain).await {
                    tracing::error!(listener = name, error = %e, "Serve failed");
                    std::process::exit(1);
                }
            }
        });
        Self {
            name,
            drain,
            tracker,
            task,
        }
    }

    /// Stop accepting and let open connections finish, up to `timeout`.
    ///
    /// `on_timeout` runs before the worker is aborted, and the worker gets a
    /// short window to finish on its own.
    pub(crate) async fn drain(mut self, timeout: Duration, on_timeout: impl FnOnce()) -> DrainOutcome {
        self.drain.cancel();
        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(_) => {
                tracing::info!(listener = self.name, "Listener drained");
                DrainOutcome::Graceful
            }
            Err(_) => {
                tracing::warn!(
                    listener = self.name,
                    open_connections = self.tracker.active_count(),
                    "Drain timed out, aborting connections"
                );
                on_timeout();
                if tokio::time::timeout(ABORT_SETTLE, &mut self.task).await.is_err() {
                    self.task.abort();
                    let _ = self.task.await;
                }
                DrainOutcome::Forced
            }
        }
    }
}

async fn serve(
    listener: Listener,
    router: Router,
    tracker: ConnectionTracker,
    drain: CancellationToken,
) -> Result<(), ListenerError> {
    let mut connections = JoinSet::new();
    loop {
        let accepted = tokio::select! {
            biased;
            _ = drain.cancelled() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => continue,
            accepted = listener.accept() => accepted,
        };
        let (stream, peer, permit) = match accepted {
            Ok(conn) => conn,
            Err(ListenerError::Accept(e)) => {
                tracing::warn!(listener = listener.name(), error = %e, "Accept failed");
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }
            Err(e) => return Err(e),
        };
        let guard = tracker.track();
        tracing::trace!(listener = listener.name(), connection_id = %guard.id(), peer = %peer, "Serving connection");
        connections.spawn(serve_connection(
            stream,
            peer,
            permit,
            guard,
            router.clone(),
            drain.clone(),
        ));
    }

    drop(listener);
    while connections.join_next().await.is_some() {}
    Ok(())
}

async fn serve_connection(
    stream: TcpStream,
    peer: std::net::SocketAddr,
    _permit: ConnectionPermit,
    guard: ConnectionGuard,
    router: Router,
    drain: CancellationToken,
) {
    let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        router.clone().oneshot(request.map(Body::new))
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(stream), service);
    let mut conn = std::pin::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = drain.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };
    if let Err(e) = result {
        tracing::debug!(connection_id = %guard.id(), error = %e, "Connection ended with error");
    }
}
