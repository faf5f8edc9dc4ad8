//! Conflict entries: alternative, concurrent revisions of a document
//! retained alongside its current revision.

use crate::clock::VectorClock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictEntry {
    pub revision: VectorClock,
    pub body: Option<serde_json::Value>,
}

impl ConflictEntry {
    pub fn new(revision: VectorClock, body: Option<serde_json::Value>) -> Self {
        ConflictEntry { revision, body }
    }
}
