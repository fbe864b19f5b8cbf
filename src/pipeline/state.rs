//! Shared loop statistics
//!
//! Written by the polling loop, read by the health checks and the shutdown
//! summary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared, async-readable loop statistics
pub type SharedStats = Arc<RwLock<LoopStats>>;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub enum LoopStatus {
    #[default]
    Stopped,
    Running,
    /// Running, but the controller link is down
    LinkDown,
}

impl std::fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopStatus::Stopped => write!(f, "STOPPED"),
            LoopStatus::Running => write!(f, "RUNNING"),
            LoopStatus::LinkDown => write!(f, "LINK DOWN"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopStats {
    pub status: LoopStatus,
    pub ticks: u64,
    /// Ticks skipped because the link was down
    pub skipped_ticks: u64,
    pub read_failures: u64,
    /// Sub-step errors logged and swallowed
    pub step_errors: u64,
    pub pieces_processed: u64,
    /// Pieces that arrived with no running order
    pub pieces_dropped: u64,
    pub bundles_completed: u64,
    pub bundles_printed: u64,
    pub acks_written: u64,
    pub last_good_read: Option<DateTime<Utc>>,
    pub last_tick: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
}

impl LoopStats {
    pub fn shared() -> SharedStats {
        Arc::new(RwLock::new(Self::default()))
    }

    /// Seconds since the last good controller read, if there was one
    pub fn secs_since_good_read(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_good_read.map(|t| (now - t).num_seconds())
    }
}
