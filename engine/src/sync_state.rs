//! Per-peer sync watermark (§4.4): the highest (generation,
//! transaction_id) of a remote replica that has been fully integrated
//! locally.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncWatermark {
    pub generation: u64,
    pub transaction_id: String,
}

impl SyncWatermark {
    pub fn none() -> Self {
        SyncWatermark {
            generation: 0,
            transaction_id: String::new(),
        }
    }
}

impl Default for SyncWatermark {
    fn default() -> Self {
        Self::none()
    }
}
