//! Observable sync engine status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error_info::ErrorInfo;
use crate::impl_domain_status_conversions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    #[default]
    Idle,
    Syncing,
    Error,
}

impl_domain_status_conversions!(SyncPhase {
    Idle => "idle",
    Syncing => "syncing",
    Error => "error",
});

/// Snapshot of the engine state. Only the orchestrator writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub pending_count: u64,
    /// Dead-lettered operations
    pub failed_count: u64,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_failed_sync_time: Option<DateTime<Utc>>,
    pub last_error: Option<ErrorInfo>,
    pub is_online: bool,
    pub background_sync_enabled: bool,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            pending_count: 0,
            failed_count: 0,
            last_sync_time: None,
            last_failed_sync_time: None,
            last_error: None,
            is_online: true,
            background_sync_enabled: true,
        }
    }
}

impl SyncStatus {
    pub fn is_syncing(&self) -> bool {
        self.phase == SyncPhase::Syncing
    }

    pub fn has_pending_changes(&self) -> bool {
        self.pending_count > 0
    }

    /// Human-readable summary for status bars.
    pub fn status_message(&self, now: DateTime<Utc>) -> String {
        match self.phase {
            SyncPhase::Syncing => return "Syncing data...".to_string(),
            SyncPhase::Error => {
                let reason =
                    self.last_error.as_ref().map_or("Unknown error", |err| err.message.as_str());
                return format!("Sync error: {reason}");
            }
            SyncPhase::Idle => {}
        }

        if !self.is_online {
            return match self.pending_count {
                0 => "You're offline. Changes will sync when you reconnect.".to_string(),
                1 => "Offline - 1 change pending".to_string(),
                n => format!("Offline - {n} changes pending"),
            };
        }

        let Some(last_sync) = self.last_sync_time else {
            return "Not synced yet".to_string();
        };

        let elapsed = now.signed_duration_since(last_sync);
        let minutes = elapsed.num_minutes();
        let hours = elapsed.num_hours();

        if minutes < 1 {
            "Data synced just now".to_string()
        } else if hours < 1 {
            format!("Data synced {minutes} {} ago", plural(minutes, "minute"))
        } else if hours < 24 {
            format!("Data synced {hours} {} ago", plural(hours, "hour"))
        } else {
            format!("Data synced on {}", last_sync.format("%Y-%m-%d"))
        }
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        unit.to_string()
    } else {
        format!("{unit}s")
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::types::error_info::ErrorKind;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn starts_idle_and_online() {
        let status = SyncStatus::default();
        assert_eq!(status.phase, SyncPhase::Idle);
        assert!(status.is_online);
        assert_eq!(status.status_message(now()), "Not synced yet");
    }

    #[test]
    fn phase_messages_take_priority() {
        let mut status = SyncStatus { phase: SyncPhase::Syncing, ..SyncStatus::default() };
        assert_eq!(status.status_message(now()), "Syncing data...");

        status.phase = SyncPhase::Error;
        status.last_error = Some(ErrorInfo::new(ErrorKind::Network, "host unreachable"));
        assert_eq!(status.status_message(now()), "Sync error: host unreachable");
    }

    #[test]
    fn offline_reports_pending_changes() {
        let status = SyncStatus { is_online: false, pending_count: 3, ..SyncStatus::default() };
        assert_eq!(status.status_message(now()), "Offline - 3 changes pending");
    }

    #[test]
    fn relative_sync_times() {
        let mut status = SyncStatus { last_sync_time: Some(now()), ..SyncStatus::default() };
        assert_eq!(status.status_message(now()), "Data synced just now");

        status.last_sync_time = Some(now() - Duration::minutes(1));
        assert_eq!(status.status_message(now()), "Data synced 1 minute ago");

        status.last_sync_time = Some(now() - Duration::hours(5));
        assert_eq!(status.status_message(now()), "Data synced 5 hours ago");

        status.last_sync_time = Some(now() - Duration::days(3));
        assert_eq!(status.status_message(now()), "Data synced on 2024-03-07");
    }
}
