//! Application state machine.
//!
//! # States
//! ```text
//! Null → Preparing → Initializing → Loading → PreStart → Started → Terminating
//! ```
//! `Connecting` and `Migrating` are reserved for owners that bring up a
//! database before the server is prepared.
//!
//! # Design Decisions
//! - No transition validation: the orchestrator is the only writer
//! - Readers use a relaxed load; a request may observe a state that is one
//!   transition stale (accepted race)
//! - Traffic is refused while Loading or Terminating

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Process lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum AppState {
    Null = 0,
    /// Connecting to the database.
    Connecting,
    /// Migrating the database.
    Migrating,
    /// Preparing the rpc/http server.
    Preparing,
    /// Running service `init`.
    Initializing,
    /// Running service `load`.
    Loading,
    /// Services ready, listeners not yet serving.
    PreStart,
    Started,
    Terminating,
}

impl AppState {
    const ALL: [AppState; 9] = [
        AppState::Null,
        AppState::Connecting,
        AppState::Migrating,
        AppState::Preparing,
        AppState::Initializing,
        AppState::Loading,
        AppState::PreStart,
        AppState::Started,
        AppState::Terminating,
    ];

    fn from_u8(raw: u8) -> Self {
        Self::ALL.get(raw as usize).copied().unwrap_or(AppState::Null)
    }

    /// Whether inbound calls may be admitted in this state.
    pub fn admits_traffic(self) -> bool {
        !matches!(self, AppState::Loading | AppState::Terminating)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppState::Null => "null",
            AppState::Connecting => "connecting",
            AppState::Migrating => "migrating",
            AppState::Preparing => "preparing",
            AppState::Initializing => "initializing",
            AppState::Loading => "loading",
            AppState::PreStart => "pre_start",
            AppState::Started => "started",
            AppState::Terminating => "terminating",
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared cell holding the live [`AppState`].
///
/// One cell per application instance, handed out as `Arc<StateCell>`.
#[derive(Debug)]
pub struct StateCell {
    raw: AtomicU8,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            raw: AtomicU8::new(AppState::Null as u8),
        }
    }

    pub fn get(&self) -> AppState {
        AppState::from_u8(self.raw.load(Ordering::Relaxed))
    }

    /// Set the state and return the previous one.
    pub fn set(&self, state: AppState) -> AppState {
        let previous = AppState::from_u8(self.raw.swap(state as u8, Ordering::Relaxed));
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "App state changed");
        }
        previous
    }

    /// Move back to `previous` only if the cell still holds `expected`.
    ///
    /// Returns false when another writer moved the state in between.
    pub fn restore(&self, expected: AppState, previous: AppState) -> bool {
        self.raw
            .compare_exchange(
                expected as u8,
                previous as u8,
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_ok()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_ordered() {
        assert!(AppState::Null < AppState::Preparing);
        assert!(AppState::Loading < AppState::Started);
        assert!(AppState::Started < AppState::Terminating);
    }

    #[test]
    fn admission_closed_while_loading_or_terminating() {
        for state in AppState::ALL {
            let expected = !matches!(state, AppState::Loading | AppState::Terminating);
            assert_eq!(state.admits_traffic(), expected, "{state}");
        }
    }

    #[test]
    fn cell_set_returns_previous() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), AppState::Null);
        assert_eq!(cell.set(AppState::Started), AppState::Null);
        assert_eq!(cell.get(), AppState::Started);
    }

    #[test]
    fn restore_skips_when_state_moved() {
        let cell = StateCell::new();
        cell.set(AppState::Loading);
        cell.set(AppState::Terminating);
        assert!(!cell.restore(AppState::Loading, AppState::Started));
        assert_eq!(cell.get(), AppState::Terminating);

        cell.set(AppState::Loading);
        assert!(cell.restore(AppState::Loading, AppState::Started));
        assert_eq!(cell.get(), AppState::Started);
    }
}
