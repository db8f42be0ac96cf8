//! Public types for the local data manager.

use crate::storage::{TierCapabilities, TierKind};

/// Manager lifecycle state.
///
/// Use [`super::LocalDataManager::state()`] to check the current state or
/// [`super::LocalDataManager::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Constructed, tiers not opened yet
    Created,
    /// Opening tiers in fallback order
    Initializing,
    /// Serving reads and writes
    Ready,
    /// Closing tier handles
    ShuttingDown,
    /// All handles released
    Closed,
}

impl std::fmt::Display for ManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Initializing => write!(f, "Initializing"),
            Self::Ready => write!(f, "Ready"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Snapshot of which tier is serving and what it can do.
///
/// For observability only; correctness never depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageInfo {
    /// Active tier, `None` before init
    pub active: Option<TierKind>,
    /// Stable name of the active tier ("transactional", "key-value", "volatile")
    pub type_name: &'static str,
    pub capabilities: TierCapabilities,
    /// Tiers below the active one that writes can degrade to
    pub fallbacks: Vec<TierKind>,
    /// Records whose latest write landed on a fallback tier
    pub spilled: usize,
    pub state: ManagerState,
}

impl StorageInfo {
    /// Whether the active tier survives a restart.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        self.capabilities.durable
    }
}

impl std::fmt::Display for StorageInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.type_name, self.state)?;
        if self.spilled > 0 {
            write!(f, ", {} spilled", self.spilled)?;
        }
        Ok(())
    }
}
