//! Sub-service registry and lifecycle driver.
//!
//! # Phases
//! ```text
//! initiate(): Initializing, init() in registration order, fail fast
//! load():     Loading, load() in registration order, outcome ignored
//! delete():   Terminating, delete() on every service concurrently, bounded
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::oneshot;

use crate::lifecycle::state::{AppState, StateCell};
use crate::rpc::recovery;

/// Error type returned by service initialization.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A pluggable sub-service following the Init → Load → Delete lifecycle.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Name used in log records.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called once before the server starts. An error aborts startup.
    async fn init(&self) -> Result<(), BoxError>;

    /// Called before the server starts and again on every reload.
    ///
    /// Must not fail: problems are logged and the service stays usable,
    /// possibly degraded.
    async fn load(&self);

    /// Called at shutdown, concurrently with every other service.
    async fn delete(&self);
}

/// Result of a bounded teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// Every `delete` returned before the deadline.
    Completed,
    /// The deadline passed; unfinished deletions were abandoned.
    TimedOut,
}

/// Completion signal returned by [`LifecycleManager::delete`].
#[derive(Debug)]
pub struct Teardown {
    rx: oneshot::Receiver<TeardownOutcome>,
}

impl Teardown {
    /// Wait for the teardown to complete or time out.
    pub async fn wait(self) -> TeardownOutcome {
        // The supervisor always reports unless the runtime is shutting down.
        self.rx.await.unwrap_or(TeardownOutcome::TimedOut)
    }
}

/// Ordered registry of services.
///
/// Registration takes `&mut self`, so the list is fixed once the manager is
/// shared behind an `Arc`.
pub struct LifecycleManager {
    services: Vec<Arc<dyn Service>>,
    state: Arc<StateCell>,
}

impl LifecycleManager {
    pub fn new(state: Arc<StateCell>) -> Self {
        Self {
            services: Vec::new(),
            state,
        }
    }

    /// Append a service. Registration order is initialization order.
    pub fn register<S: Service>(&mut self, service: S) {
        self.register_arc(Arc::new(service));
    }

    pub fn register_arc(&mut self, service: Arc<dyn Service>) {
        tracing::debug!(service = service.name(), "Service registered");
        self.services.push(service);
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Initialize every service in order, stopping at the first error.
    ///
    /// Services initialized before the failure are not rolled back.
    pub async fn initiate(&self) -> Result<(), BoxError> {
        tracing::info!(act = "initiate", services = self.services.len(), "Service initiating");
        self.state.set(AppState::Initializing);
        for service in &self.services {
            if let Err(e) = service.init().await {
                tracing::error!(service = service.name(), error = %e, "Service init failed");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Load every service in order. Safe to call again at any time.
    ///
    /// A panicking `load` is logged and the remaining services still load.
    pub async fn load(&self) {
        tracing::info!(act = "load", services = self.services.len(), "Service loading");
        let previous = self.state.set(AppState::Loading);
        for service in &self.services {
            if let Err(report) = recovery::catch(|| service.load()).await {
                tracing::error!(
                    service = service.name(),
                    panic = %report.message,
                    location = report.location.as_deref(),
                    "Service load panicked, continuing degraded"
                );
            }
        }
        if previous != AppState::Loading && !self.state.restore(AppState::Loading, previous) {
            tracing::debug!(state = %self.state.get(), "State moved during load, not restoring");
        }
    }

    /// Delete every service concurrently, bounded by `timeout`.
    pub fn delete(&self, timeout: Duration) -> Teardown {
        tracing::info!(act = "delete", services = self.services.len(), "Service dropping");
        self.state.set(AppState::Terminating);

        let handles: Vec<_> = self
            .services
            .iter()
            .map(|service| {
                let service = Arc::clone(service);
                tokio::spawn(async move { service.delete().await })
            })
            .collect();
        let names: Vec<String> = self.services.iter().map(|s| s.name().to_string()).collect();

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, join_all(handles)).await {
                Ok(results) => {
                    for (name, result) in names.iter().zip(results) {
                        if let Err(e) = result {
                            tracing::error!(service = %name, error = %e, "Service delete panicked");
                        }
                    }
                    TeardownOutcome::Completed
                }
                Err(_) => {
                    // Dropping the join handles detaches the remaining deletions.
                    tracing::warn!(timeout = ?timeout, "Service teardown deadline reached");
                    TeardownOutcome::TimedOut
                }
            };
            let _ = tx.send(outcome);
        });

        Teardown { rx }
    }
}
