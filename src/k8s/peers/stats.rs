use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Where a synchronizer currently is in its list/watch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Listing,
    Watching,
    Backoff,
    Stopped,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    pub state: SyncState,
    pub peers: usize,
    pub lists: u64,
    pub watch_sessions: u64,
    pub events_delivered: u64,
    /// Relists caused by the resync timer or by a malformed event
    pub forced_relists: u64,
    pub consecutive_failures: u32,
    pub last_list: Option<DateTime<Utc>>,
}

/// Shared view of a synchronizer's counters
#[derive(Debug, Clone, Default)]
pub struct StatsHandle {
    inner: Arc<RwLock<SyncStats>>,
}

impl StatsHandle {
    #[must_use]
    pub fn snapshot(&self) -> SyncStats {
        self.inner
            .read()
            .map_or_else(|poisoned| poisoned.into_inner().clone(), |stats| stats.clone())
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut SyncStats)) {
        let mut stats = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut stats);
    }
}
