//! Drain pass triggers and results

use serde::{Deserialize, Serialize};
use tipsync_domain::{impl_domain_status_conversions, SyncPhase};

/// Why a drain pass started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    ConnectivityRestored,
    Timer,
    Manual,
}

impl_domain_status_conversions!(SyncTrigger {
    ConnectivityRestored => "connectivity_restored",
    Timer => "timer",
    Manual => "manual",
});

/// Why a pass did no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadySyncing,
    Offline,
    EmptyQueue,
}

impl_domain_status_conversions!(SkipReason {
    AlreadySyncing => "already_syncing",
    Offline => "offline",
    EmptyQueue => "empty_queue",
});

/// Outcome of one drain pass. Counts are per queued operation unless noted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub trigger: SyncTrigger,
    pub skipped: Option<SkipReason>,
    /// Entity groups sent to the remote
    pub attempted_groups: usize,
    pub completed: usize,
    /// Groups that went through conflict resolution
    pub resolved_conflicts: usize,
    /// Left queued for a later pass
    pub retrying: usize,
    pub failed: usize,
    /// Dead-lettered for exceeding the retry window
    pub expired: usize,
    /// Skipped because the entity is backing off or blocked
    pub deferred: usize,
    pub cancelled: bool,
    /// Phase after the pass
    pub phase: SyncPhase,
}

impl SyncReport {
    /// Empty report for a pass that is about to run.
    pub fn new(trigger: SyncTrigger) -> Self {
        Self {
            trigger,
            skipped: None,
            attempted_groups: 0,
            completed: 0,
            resolved_conflicts: 0,
            retrying: 0,
            failed: 0,
            expired: 0,
            deferred: 0,
            cancelled: false,
            phase: SyncPhase::Idle,
        }
    }

    /// Report for a pass that did not run.
    pub fn skipped(trigger: SyncTrigger, reason: SkipReason, phase: SyncPhase) -> Self {
        Self { skipped: Some(reason), phase, ..Self::new(trigger) }
    }

    /// True when the pass did not run.
    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }

    /// True if at least one operation was confirmed or resolved.
    pub fn made_progress(&self) -> bool {
        self.completed > 0
    }
}
