//! Pure conflict resolvers
//!
//! Each resolver takes the detected conflict, the local fields and the
//! remote document, and returns what the orchestrator should do. None of
//! them perform I/O.

use serde_json::Value;
use tipsync_domain::constants::FIELD_VERSION;
use tipsync_domain::{ConflictResult, Document, ResolutionStrategy};

/// What to do with a conflicting write.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Write this document to the remote
    Write(Document),
    /// Leave the remote as is and adopt it locally
    KeepRemote(Document),
}

impl Resolution {
    /// The document the cache should hold afterwards.
    pub fn document(&self) -> &Document {
        match self {
            Self::Write(document) | Self::KeepRemote(document) => document,
        }
    }
}

pub type Resolver = fn(&ConflictResult, &Document, &Document) -> Resolution;

pub fn resolver_for(strategy: ResolutionStrategy) -> Resolver {
    match strategy {
        ResolutionStrategy::ClientWins => client_wins,
        ResolutionStrategy::ServerWins => server_wins,
        ResolutionStrategy::Merge => merge,
    }
}

/// Run the resolver for `strategy`. Written documents get the remote's
/// integer version plus one.
pub fn resolve(
    strategy: ResolutionStrategy,
    conflict: &ConflictResult,
    local: &Document,
    remote: &Document,
) -> Resolution {
    match resolver_for(strategy)(conflict, local, remote) {
        Resolution::Write(document) => Resolution::Write(bump_version(document, remote)),
        keep => keep,
    }
}

/// Local fields overlaid on the remote document.
pub fn client_wins(_conflict: &ConflictResult, local: &Document, remote: &Document) -> Resolution {
    let mut document = remote.clone();
    for (field, value) in local {
        document.insert(field.clone(), value.clone());
    }
    Resolution::Write(document)
}

pub fn server_wins(_conflict: &ConflictResult, _local: &Document, remote: &Document) -> Resolution {
    Resolution::KeepRemote(remote.clone())
}

/// Field-by-field merge: arrays union, objects recurse, local scalars win.
pub fn merge(_conflict: &ConflictResult, local: &Document, remote: &Document) -> Resolution {
    Resolution::Write(merge_documents(remote, local))
}

pub fn merge_documents(remote: &Document, local: &Document) -> Document {
    let mut merged = remote.clone();
    for (field, local_value) in local {
        let value = match remote.get(field) {
            Some(remote_value) => merge_values(remote_value, local_value),
            None => local_value.clone(),
        };
        merged.insert(field.clone(), value);
    }
    merged
}

fn merge_values(remote: &Value, local: &Value) -> Value {
    match (remote, local) {
        (Value::Array(remote_items), Value::Array(local_items)) => {
            let mut items = remote_items.clone();
            for item in local_items {
                if !items.contains(item) {
                    items.push(item.clone());
                }
            }
            Value::Array(items)
        }
        (Value::Object(remote_fields), Value::Object(local_fields)) => {
            Value::Object(merge_documents(remote_fields, local_fields))
        }
        _ => local.clone(),
    }
}

fn bump_version(mut document: Document, remote: &Document) -> Document {
    if let Some(version) = remote.get(FIELD_VERSION).and_then(Value::as_i64) {
        document.insert(FIELD_VERSION.to_string(), Value::from(version.saturating_add(1)));
    }
    document
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tipsync_domain::{document_from_value, ConflictType};

    use super::*;

    fn doc(value: Value) -> Document {
        document_from_value(value).unwrap()
    }

    fn conflict() -> ConflictResult {
        ConflictResult::conflict(ConflictType::Timestamp, "remote changed")
    }

    #[test]
    fn client_wins_overlays_local_fields() {
        let resolution = resolve(
            ResolutionStrategy::ClientWins,
            &conflict(),
            &doc(json!({"tipAmount": 7.5})),
            &doc(json!({"tipAmount": 4.0, "store": "Kroger"})),
        );
        assert_eq!(
            resolution,
            Resolution::Write(doc(json!({"tipAmount": 7.5, "store": "Kroger"})))
        );
    }

    #[test]
    fn server_wins_keeps_remote_without_bump() {
        let remote = doc(json!({"tipAmount": 4.0, "version": 3}));
        let resolution =
            resolve(ResolutionStrategy::ServerWins, &conflict(), &doc(json!({"tipAmount": 7.5})), &remote);
        assert_eq!(resolution, Resolution::KeepRemote(remote));
    }

    #[test]
    fn merge_unions_arrays_and_recurses_into_objects() {
        let local = doc(json!({
            "orderIds": ["A2", "A3"],
            "geo": {"lat": 1.5},
            "label": "home"
        }));
        let remote = doc(json!({
            "orderIds": ["A1", "A2"],
            "geo": {"lat": 1.0, "lng": 2.0},
            "label": "old",
            "zip": "30301"
        }));

        let Resolution::Write(merged) = resolve(ResolutionStrategy::Merge, &conflict(), &local, &remote)
        else {
            panic!("merge must write");
        };

        assert_eq!(merged["orderIds"], json!(["A1", "A2", "A3"]));
        assert_eq!(merged["geo"], json!({"lat": 1.5, "lng": 2.0}));
        assert_eq!(merged["label"], json!("home"));
        assert_eq!(merged["zip"], json!("30301"));
    }

    #[test]
    fn written_documents_take_remote_version_plus_one() {
        let resolution = resolve(
            ResolutionStrategy::ClientWins,
            &conflict(),
            &doc(json!({"tipAmount": 7.5, "version": 1})),
            &doc(json!({"version": 6})),
        );
        assert_eq!(resolution.document()["version"], json!(7));
    }
}
