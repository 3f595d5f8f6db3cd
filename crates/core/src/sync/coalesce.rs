//! Per-entity grouping and coalescing of queued operations
//!
//! Every queued operation stays recorded individually, but at apply time
//! the operations on one entity collapse into a single effective write so
//! that the last local state wins.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde_json::Value;
use tipsync_domain::{EntityKey, OperationId, OperationType, PendingOperation};

/// Operations on one entity and the single write they amount to.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationGroup {
    /// Keeps the first member's id, `created_at` and `base_snapshot`
    pub effective: PendingOperation,
    /// Queue order, oldest first
    pub members: Vec<PendingOperation>,
}

impl OperationGroup {
    pub fn key(&self) -> EntityKey {
        self.effective.entity_key()
    }

    pub fn ids(&self) -> Vec<OperationId> {
        self.members.iter().map(|op| op.id).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Split a page into per-entity runs, in first-seen order.
///
/// Operations without a target id cannot be matched to anything and always
/// form their own group.
pub fn group_by_entity(operations: Vec<PendingOperation>) -> Vec<Vec<PendingOperation>> {
    let mut groups: Vec<Vec<PendingOperation>> = Vec::new();
    let mut positions: HashMap<EntityKey, usize> = HashMap::new();

    for op in operations {
        if op.target_id.is_empty() {
            groups.push(vec![op]);
            continue;
        }
        match positions.entry(op.entity_key()) {
            Entry::Occupied(slot) => groups[*slot.get()].push(op),
            Entry::Vacant(slot) => {
                slot.insert(groups.len());
                groups.push(vec![op]);
            }
        }
    }
    groups
}

/// Fold a run of operations on one entity into one effective operation.
///
/// - update + update → update, payloads overlaid
/// - create + update → create, payloads overlaid
/// - anything + delete → delete
/// - delete + create/update → create with the later payload
pub fn coalesce(members: Vec<PendingOperation>) -> Option<OperationGroup> {
    let (head, rest) = members.split_first()?;
    let mut effective = head.clone();

    for next in rest {
        match (effective.operation_type, next.operation_type) {
            (_, OperationType::Delete) => {
                effective.operation_type = OperationType::Delete;
                effective.payload = next.payload.clone();
            }
            (OperationType::Delete, _) | (_, OperationType::Create) => {
                effective.operation_type = OperationType::Create;
                effective.payload = next.payload.clone();
            }
            (OperationType::Create | OperationType::Update, OperationType::Update) => {
                overlay(&mut effective.payload, &next.payload);
            }
        }
    }
    effective.retry_count = members.iter().map(|op| op.retry_count).max().unwrap_or(0);

    Some(OperationGroup { effective, members })
}

fn overlay(target: &mut Value, fields: &Value) {
    match (target.as_object_mut(), fields.as_object()) {
        (Some(target), Some(fields)) => {
            for (field, value) in fields {
                target.insert(field.clone(), value.clone());
            }
        }
        _ => *target = fields.clone(),
    }
}
