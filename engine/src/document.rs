//! The document type and the doc_id / body validation rules of the
//! external interface.

use crate::clock::VectorClock;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Validate a document identifier: non-empty, every byte printable
/// 7-bit ASCII (0x20-0x7E), and neither '/' nor '\\'.
pub fn validate_doc_id(doc_id: &str) -> Result<()> {
    if doc_id.is_empty() {
        return Err(Error::InvalidDocId("doc_id must not be empty".into()));
    }
    for &b in doc_id.as_bytes() {
        if !(0x20..=0x7E).contains(&b) || b == b'/' || b == b'\\' {
            return Err(Error::InvalidDocId(format!(
                "doc_id {doc_id:?} contains a disallowed byte"
            )));
        }
    }
    Ok(())
}

/// Validate a document body: it must parse as JSON and be a JSON
/// object at the top level. `None` (tombstone) is always valid.
pub fn validate_body(body: &Option<serde_json::Value>) -> Result<()> {
    match body {
        None => Ok(()),
        Some(serde_json::Value::Object(_)) => Ok(()),
        Some(other) => Err(Error::InvalidJson(format!(
            "document body must be a JSON object, got {other}"
        ))),
    }
}

/// A document as the caller sees it: its identity, causal revision,
/// and body. `has_conflicts` is derived from the conflict set, never
/// stored independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub doc_id: String,
    pub revision: VectorClock,
    /// `None` marks a tombstone.
    pub body: Option<serde_json::Value>,
    pub has_conflicts: bool,
}

impl Document {
    pub fn new(doc_id: impl Into<String>, revision: VectorClock, body: Option<serde_json::Value>) -> Self {
        Document {
            doc_id: doc_id.into(),
            revision,
            body,
            has_conflicts: false,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.body.is_none()
    }
}

/// Byte-equality of two document bodies, per the spec's explicit
/// instruction to compare content by serialized bytes rather than
/// semantic JSON equality (this changes outcomes for objects whose
/// keys were inserted in a different order upstream).
pub fn bodies_byte_equal(a: &Option<serde_json::Value>, b: &Option<serde_json::Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => canonical_bytes(a) == canonical_bytes(b),
        _ => false,
    }
}

fn canonical_bytes(v: &serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(v).unwrap_or_default()
}
