//! Sample timestamps
//!
//! Until the paired app sends a time sync, timestamps are seconds since boot.

use serde::{Deserialize, Serialize};

/// Maps monotonic milliseconds to sample timestamps in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallClock {
    sync: Option<(u32, u64)>,
}

impl WallClock {
    /// Unsynchronised clock.
    #[must_use]
    pub const fn new() -> Self {
        Self { sync: None }
    }

    /// Anchor `epoch_s` to the monotonic instant `now_ms`.
    pub fn sync(&mut self, epoch_s: u32, now_ms: u64) {
        tracing::info!(epoch_s, now_ms, "wall clock synchronised");
        self.sync = Some((epoch_s, now_ms));
    }

    /// Whether a sync has been applied.
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        self.sync.is_some()
    }

    /// Timestamp in seconds for the monotonic instant `now_ms`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn timestamp_s(&self, now_ms: u64) -> u32 {
        match self.sync {
            Some((epoch_s, at_ms)) => {
                let elapsed_s = (now_ms.saturating_sub(at_ms) / 1000) as u32;
                epoch_s.wrapping_add(elapsed_s)
            }
            None => (now_ms / 1000) as u32,
        }
    }
}
