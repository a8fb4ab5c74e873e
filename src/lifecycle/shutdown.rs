//! Shutdown sequence.

use std::process::ExitCode;
use std::time::Duration;

use crate::lifecycle::service::{LifecycleManager, TeardownOutcome};
use crate::lifecycle::state::{AppState, StateCell};
use crate::server::{Server, StopReport};

/// How the shutdown went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownOutcome {
    pub server: StopReport,
    pub services: TeardownOutcome,
}

impl ShutdownOutcome {
    /// Anything cut off by a deadline counts as a forced termination.
    pub fn is_forced(&self) -> bool {
        !self.server.is_graceful() || self.services == TeardownOutcome::TimedOut
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_forced() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }
}

/// Terminating → stop the server → delete services.
pub async fn shutdown(
    state: &StateCell,
    server: &mut Server,
    services: &LifecycleManager,
    server_grace: Duration,
    services_grace: Duration,
) -> ShutdownOutcome {
    state.set(AppState::Terminating);
    let server_report = server.stop(server_grace).await;
    let teardown = services.delete(services_grace).wait().await;

    let outcome = ShutdownOutcome {
        server: server_report,
        services: teardown,
    };
    if outcome.is_forced() {
        tracing::error!(
            rpc = ?outcome.server.rpc,
            http = ?outcome.server.http,
            services = ?outcome.services,
            "Force terminated"
        );
    } else {
        tracing::info!("Shutdown complete");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::DrainOutcome;

    fn report(rpc: DrainOutcome, http: DrainOutcome) -> StopReport {
        StopReport { rpc, http }
    }

    #[test]
    fn any_deadline_forces() {
        let clean = ShutdownOutcome {
            server: report(DrainOutcome::Graceful, DrainOutcome::NotRunning),
            services: TeardownOutcome::Completed,
        };
        assert!(!clean.is_forced());

        let slow_services = ShutdownOutcome {
            services: TeardownOutcome::TimedOut,
            ..clean
        };
        assert!(slow_services.is_forced());

        let slow_rpc = ShutdownOutcome {
            server: report(DrainOutcome::Forced, DrainOutcome::Graceful),
            ..clean
        };
        assert!(slow_rpc.is_forced());
    }
}
