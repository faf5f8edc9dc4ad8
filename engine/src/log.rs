//! Transaction log entries and the `changes_since` query (§4.3).
//!
//! The log itself is append-only storage living behind a
//! [`crate::backend::StorageBackend`]; this module holds the entry type
//! and the pure query logic that interprets a sequence of entries,
//! independent of how they are stored.

use serde::{Deserialize, Serialize};

/// One row of the transaction log: every local mutation appends exactly
/// one of these, with `generation` allocated as `current_max + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub generation: u64,
    pub doc_id: String,
    pub transaction_id: String,
}

/// A single row of a `changes_since` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    pub doc_id: String,
    pub generation: u64,
    pub transaction_id: String,
}

/// For every doc_id with any entry of generation > `since_gen`, return
/// only the highest such entry, ordered by that generation ascending.
/// The overall trans_id returned alongside is that of the highest
/// emitted entry, or (preserved from the original implementation,
/// see DESIGN.md) the log head's trans_id if nothing changed.
pub fn changes_since(entries: &[LogEntry], since_gen: u64) -> (Vec<ChangeEntry>, String) {
    use std::collections::HashMap;

    let mut latest_by_doc: HashMap<&str, &LogEntry> = HashMap::new();
    for entry in entries {
        if entry.generation > since_gen {
            latest_by_doc
                .entry(entry.doc_id.as_str())
                .and_modify(|cur| {
                    if entry.generation > cur.generation {
                        *cur = entry;
                    }
                })
                .or_insert(entry);
        }
    }

    let mut changes: Vec<ChangeEntry> = latest_by_doc
        .into_values()
        .map(|e| ChangeEntry {
            doc_id: e.doc_id.clone(),
            generation: e.generation,
            transaction_id: e.transaction_id.clone(),
        })
        .collect();
    changes.sort_by_key(|c| c.generation);

    let trans_id = changes
        .last()
        .map(|c| c.transaction_id.clone())
        .unwrap_or_else(|| {
            entries
                .last()
                .map(|e| e.transaction_id.clone())
                .unwrap_or_default()
        });

    (changes, trans_id)
}

/// Highest generation and its transaction id, or `(0, "")` if empty.
pub fn current_generation(entries: &[LogEntry]) -> (u64, String) {
    entries
        .last()
        .map(|e| (e.generation, e.transaction_id.clone()))
        .unwrap_or((0, String::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(gen: u64, doc_id: &str, trans_id: &str) -> LogEntry {
        LogEntry {
            generation: gen,
            doc_id: doc_id.into(),
            transaction_id: trans_id.into(),
        }
    }

    #[test]
    fn changes_since_emits_only_latest_entry_per_doc() {
        let entries = vec![
            entry(1, "d1", "T-1"),
            entry(2, "d2", "T-2"),
            entry(3, "d1", "T-3"),
        ];
        let (changes, trans_id) = changes_since(&entries, 0);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].doc_id, "d2");
        assert_eq!(changes[0].generation, 2);
        assert_eq!(changes[1].doc_id, "d1");
        assert_eq!(changes[1].generation, 3);
        assert_eq!(trans_id, "T-3");
    }

    #[test]
    fn changes_since_excludes_entries_at_or_below_threshold() {
        let entries = vec![entry(1, "d1", "T-1"), entry(2, "d2", "T-2")];
        let (changes, _) = changes_since(&entries, 1);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].doc_id, "d2");
    }

    #[test]
    fn changes_since_falls_back_to_log_head_trans_id_when_empty() {
        let entries = vec![entry(1, "d1", "T-1"), entry(2, "d2", "T-2")];
        let (changes, trans_id) = changes_since(&entries, 2);
        assert!(changes.is_empty());
        assert_eq!(trans_id, "T-2");
    }

    #[test]
    fn current_generation_of_empty_log() {
        assert_eq!(current_generation(&[]), (0, String::new()));
    }
}
