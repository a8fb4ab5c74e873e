//! OS signal handling.
//!
//! SIGTERM and SIGINT request shutdown; SIGHUP requests a reload.

/// What the process was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Reload,
}

#[cfg(unix)]
pub struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    pub fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the next signal.
    pub async fn recv(&mut self) -> Signal {
        tokio::select! {
            _ = self.interrupt.recv() => {
                tracing::info!(signal = "SIGINT", "Shutdown signal received");
                Signal::Terminate
            }
            _ = self.terminate.recv() => {
                tracing::info!(signal = "SIGTERM", "Shutdown signal received");
                Signal::Terminate
            }
            _ = self.hangup.recv() => {
                tracing::info!(signal = "SIGHUP", "Reload signal received");
                Signal::Reload
            }
        }
    }
}

#[cfg(not(unix))]
pub struct Signals;

#[cfg(not(unix))]
impl Signals {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self)
    }

    pub async fn recv(&mut self) -> Signal {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        tracing::info!(signal = "ctrl-c", "Shutdown signal received");
        Signal::Terminate
    }
}
