//! Worker lifecycle states and identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one worker instance (one deployed version being installed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    pub fn next() -> Self {
        Self(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Identifies one open client view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Lifecycle of a worker.
///
/// `Uninstalled → Installing → Installed → Activating → Active`, with
/// `Redundant` reachable from every non-terminal state after `Uninstalled`
/// (failed install, superseded by a newer version).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    #[default]
    Uninstalled,
    Installing,
    /// Installed and waiting to activate.
    Installed,
    Activating,
    Active,
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Uninstalled => "uninstalled",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Active => "active",
            WorkerState::Redundant => "redundant",
        }
    }

    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Uninstalled, Installing)
                | (Installing, Installed)
                | (Installed, Activating)
                | (Activating, Active)
                | (Installing | Installed | Activating | Active, Redundant)
        )
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkerState::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(Uninstalled.can_transition_to(Installing));
        assert!(Installing.can_transition_to(Installed));
        assert!(Installed.can_transition_to(Activating));
        assert!(Activating.can_transition_to(Active));
        assert!(Active.can_transition_to(Redundant));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!Uninstalled.can_transition_to(Active));
        assert!(!Installed.can_transition_to(Installing));
        assert!(!Active.can_transition_to(Installing));
        assert!(!Redundant.can_transition_to(Installing));
        assert!(!Uninstalled.can_transition_to(Redundant));
    }

    #[test]
    fn test_failure_paths_reach_redundant() {
        assert!(Installing.can_transition_to(Redundant));
        assert!(Installed.can_transition_to(Redundant));
        assert!(Activating.can_transition_to(Redundant));
    }

    #[test]
    fn test_ids_unique() {
        assert_ne!(WorkerId::next(), WorkerId::next());
        assert_ne!(ClientId::next(), ClientId::next());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(Active.to_string(), "active");
        assert_eq!(WorkerState::default(), Uninstalled);
    }
}
