//! Conflict detection between queued writes and remote snapshots

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use tipsync_domain::constants::{DEFAULT_CONFLICT_TOLERANCE_MS, FIELD_VERSION, TIMESTAMP_FIELDS};
use tipsync_domain::{
    ConflictResult, ConflictType, Document, FieldConflict, OperationType, PendingOperation,
    SyncConfig,
};

/// Decides whether a queued update still applies cleanly to the remote.
///
/// Detection never fails. A case it cannot decide is reported as an
/// `unknown` conflict so the caller falls back to a conservative strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictDetector {
    tolerance: Duration,
    critical_fields: Vec<String>,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CONFLICT_TOLERANCE_MS)
    }
}

impl ConflictDetector {
    /// `tolerance_ms` widens the window in which a remote change counts as
    /// concurrent with the local one.
    pub fn new(tolerance_ms: i64) -> Self {
        Self { tolerance: Duration::milliseconds(tolerance_ms.max(0)), critical_fields: Vec::new() }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.conflict_tolerance_ms)
            .with_critical_fields(config.critical_fields.iter().cloned())
    }

    /// Fields compared on every detection, even when the payload omits them.
    #[must_use]
    pub fn with_critical_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.critical_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Only updates of an existing target can collide with remote state.
    pub fn needs_conflict_detection(&self, op: &PendingOperation) -> bool {
        op.operation_type == OperationType::Update && !op.target_id.is_empty()
    }

    pub fn detect_conflict(&self, op: &PendingOperation, remote: &Document) -> ConflictResult {
        let Some(local) = op.payload_object() else {
            return ConflictResult::unknown("Operation payload is not a JSON object");
        };

        if let Some((field, marker)) = timestamp_marker(remote) {
            return self.detect_by_timestamp(op, remote, field, marker);
        }

        let remote_version = remote.get(FIELD_VERSION).filter(|value| !value.is_null());
        let local_version = local
            .get(FIELD_VERSION)
            .or_else(|| op.base_snapshot.as_ref().and_then(|base| base.get(FIELD_VERSION)))
            .filter(|value| !value.is_null());
        if let (Some(remote_version), Some(local_version)) = (remote_version, local_version) {
            return match compare_versions(local_version, remote_version) {
                Some(Ordering::Less) => ConflictResult::conflict(
                    ConflictType::Version,
                    format!("Remote version {remote_version} is newer than local {local_version}"),
                )
                .with_fields(self.get_conflicting_fields(op, remote))
                .with_detail("localVersion", local_version.clone())
                .with_detail("remoteVersion", remote_version.clone()),
                Some(_) => ConflictResult::none(),
                None => ConflictResult::unknown(format!(
                    "Cannot compare local version {local_version} with remote {remote_version}"
                )),
            };
        }

        let base = op.base_snapshot.as_ref();
        let changed: BTreeMap<String, FieldConflict> = self
            .get_conflicting_fields(op, remote)
            .into_iter()
            .filter(|(field, conflict)| {
                base.map_or(true, |base| base.get(field) != Some(&conflict.remote))
            })
            .collect();

        if changed.is_empty() {
            ConflictResult::none()
        } else {
            let names: Vec<&str> = changed.keys().map(String::as_str).collect();
            ConflictResult::conflict(
                ConflictType::FieldValue,
                format!("Fields changed on both sides: {}", names.join(", ")),
            )
            .with_fields(changed)
        }
    }

    /// Payload and critical fields whose remote value differs from the local
    /// one. Timestamp and version markers are skipped.
    pub fn get_conflicting_fields(
        &self,
        op: &PendingOperation,
        remote: &Document,
    ) -> BTreeMap<String, FieldConflict> {
        let mut conflicts = BTreeMap::new();
        let Some(local) = op.payload_object() else {
            return conflicts;
        };
        let base = op.base_snapshot.as_ref();

        let payload_fields = local.keys().map(String::as_str).filter(|field| !is_marker(field));
        let critical_fields = self.critical_fields.iter().map(String::as_str);

        for field in payload_fields.chain(critical_fields) {
            if conflicts.contains_key(field) {
                continue;
            }
            let Some(local_value) = local.get(field).or_else(|| base.and_then(|b| b.get(field)))
            else {
                continue;
            };
            let Some(remote_value) = remote.get(field) else {
                continue;
            };
            if local_value != remote_value {
                conflicts.insert(
                    field.to_string(),
                    FieldConflict { local: local_value.clone(), remote: remote_value.clone() },
                );
            }
        }
        conflicts
    }

    fn detect_by_timestamp(
        &self,
        op: &PendingOperation,
        remote: &Document,
        field: &str,
        marker: &Value,
    ) -> ConflictResult {
        let Some(remote_ts) = parse_timestamp(marker) else {
            return ConflictResult::unknown(format!("Unreadable remote timestamp in '{field}'"))
                .with_detail("field", field);
        };

        let modified_after = remote_ts
            .checked_add_signed(self.tolerance)
            .map_or(true, |window_end| window_end > op.created_at);
        if !modified_after {
            return ConflictResult::none();
        }

        ConflictResult::conflict(
            ConflictType::Timestamp,
            format!(
                "Remote document modified at {} after local change at {}",
                remote_ts.to_rfc3339(),
                op.created_at.to_rfc3339()
            ),
        )
        .with_fields(self.get_conflicting_fields(op, remote))
        .with_detail("field", field)
        .with_detail("remoteTimestamp", remote_ts.to_rfc3339())
        .with_detail("localTimestamp", op.created_at.to_rfc3339())
    }
}

fn is_marker(field: &str) -> bool {
    field == FIELD_VERSION || TIMESTAMP_FIELDS.iter().any(|marker| *marker == field)
}

/// First non-null timestamp marker, in priority order.
fn timestamp_marker(remote: &Document) -> Option<(&'static str, &Value)> {
    TIMESTAMP_FIELDS.iter().find_map(|field| {
        remote.get(*field).filter(|value| !value.is_null()).map(|value| (*field, value))
    })
}

/// Epoch milliseconds, RFC 3339 text, or a `{seconds, nanoseconds}` object.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(number) => {
            let millis = number.as_i64().or_else(|| number.as_f64().map(|ms| ms as i64))?;
            Utc.timestamp_millis_opt(millis).single()
        }
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|ts| ts.with_timezone(&Utc))
            .ok()
            .or_else(|| text.parse::<i64>().ok().and_then(|ms| Utc.timestamp_millis_opt(ms).single())),
        Value::Object(fields) => {
            let seconds = fields.get("seconds").and_then(Value::as_i64)?;
            let nanos = fields
                .get("nanoseconds")
                .or_else(|| fields.get("nanos"))
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0);
            Utc.timestamp_opt(seconds, nanos).single()
        }
        _ => None,
    }
}

fn compare_versions(local: &Value, remote: &Value) -> Option<Ordering> {
    match (local, remote) {
        (Value::Number(local), Value::Number(remote)) => match (local.as_i64(), remote.as_i64()) {
            (Some(local), Some(remote)) => Some(local.cmp(&remote)),
            _ => local.as_f64()?.partial_cmp(&remote.as_f64()?),
        },
        (Value::String(local), Value::String(remote)) => Some(compare_dotted(local, remote)),
        _ => None,
    }
}

/// Numeric part-by-part comparison of "1.2.10"-style versions, falling back
/// to plain string order when a part is not a number.
fn compare_dotted(local: &str, remote: &str) -> Ordering {
    let parse = |version: &str| {
        version.split('.').map(|part| part.trim().parse::<u64>().ok()).collect::<Option<Vec<_>>>()
    };
    match (parse(local), parse(remote)) {
        (Some(mut local_parts), Some(mut remote_parts)) => {
            let len = local_parts.len().max(remote_parts.len());
            local_parts.resize(len, 0);
            remote_parts.resize(len, 0);
            local_parts.cmp(&remote_parts)
        }
        _ => local.cmp(remote),
    }
}
