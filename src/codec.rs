//! Canonical JSON encoding of ledger documents
//!
//! Object keys are emitted in lexicographic order at every nesting level so the
//! bytes written for a document do not depend on struct declaration order.
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::booking::DocType;
use crate::error::BookingError;

pub fn to_canonical_json<T: Serialize>(key: &str, doc: &T) -> Result<Vec<u8>, BookingError> {
    let value = serde_json::to_value(doc).map_err(|e| BookingError::CorruptRecord {
        key: key.to_string(),
        reason: format!("failed to serialise: {e}"),
    })?;
    serde_json::to_vec(&sort_keys(value)).map_err(|e| BookingError::CorruptRecord {
        key: key.to_string(),
        reason: format!("failed to serialise: {e}"),
    })
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k, sort_keys(v)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

pub fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, BookingError> {
    serde_json::from_slice(bytes).map_err(|e| BookingError::CorruptRecord {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a stored document and report which kind it is.
pub fn decode_document(key: &str, bytes: &[u8]) -> Result<(DocType, Value), BookingError> {
    let value: Value = decode(key, bytes)?;
    let doc_type = value
        .get("docType")
        .cloned()
        .ok_or_else(|| BookingError::CorruptRecord {
            key: key.to_string(),
            reason: "document has no docType".into(),
        })?;
    let doc_type: DocType =
        serde_json::from_value(doc_type).map_err(|e| BookingError::CorruptRecord {
            key: key.to_string(),
            reason: format!("unknown docType: {e}"),
        })?;
    Ok((doc_type, value))
}

pub fn from_document<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, BookingError> {
    serde_json::from_value(value).map_err(|e| BookingError::CorruptRecord {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
