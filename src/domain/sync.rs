use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the synchronization engine
///
/// `Idle` (no symbol) -> `Loading` (initial bulk fetch in flight) -> `Tracking`
/// (per-tick reconciliation). A symbol change re-enters `Loading`, an explicit
/// reset returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    Idle,
    Loading,
    Tracking,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Idle => write!(f, "Idle"),
            SyncPhase::Loading => write!(f, "Loading"),
            SyncPhase::Tracking => write!(f, "Tracking"),
        }
    }
}
