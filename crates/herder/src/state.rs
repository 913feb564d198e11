//! Herder synchronization state.

use std::fmt;

/// Where the node stands relative to the network.
///
/// The participation countdown (waiting a few ledgers before proposing)
/// only runs while `Synced`; a node that falls back to `Syncing` stops
/// counting until it catches up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HerderState {
    /// Initial state, before any network contact.
    Booting,
    /// Catching up with the network.
    Syncing,
    /// Following the network tip.
    Synced,
}

impl HerderState {
    /// Whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: HerderState) -> bool {
        use HerderState::*;
        matches!(
            (self, next),
            (Booting, Syncing) | (Booting, Synced) | (Syncing, Synced) | (Synced, Syncing)
        )
    }
}

impl fmt::Display for HerderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HerderState::Booting => "booting",
            HerderState::Syncing => "syncing",
            HerderState::Synced => "synced",
        };
        write!(f, "{s}")
    }
}
