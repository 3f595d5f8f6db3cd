//! JSON documents exchanged with the remote store

use serde_json::{Map, Value};

use crate::{Result, TipSyncError};

/// A remote document or field delta.
pub type Document = Map<String, Value>;

/// Unwrap a JSON value that must be an object.
pub fn document_from_value(value: Value) -> Result<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(TipSyncError::InvalidInput(format!(
            "expected a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
