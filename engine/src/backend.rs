//! The storage capability the core requires of its persistence backend
//! (§6.5): atomic multi-row transactions, an append-only
//! auto-incrementing log, ordered ranged scans, and conflict-free
//! upsert for single-row config/sync-state. The core is agnostic to
//! whether this is embedded relational storage, an on-disk B-tree, or
//! memory (§1, Out of scope).

use crate::clock::VectorClock;
use crate::conflict::ConflictEntry;
use crate::error::{Error, Result};
use crate::log::{self, ChangeEntry, LogEntry};
use crate::sync_state::SyncWatermark;
use std::cell::RefCell;
use std::collections::BTreeMap;

/// The current stored state of a document, independent of its
/// conflict set.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub revision: VectorClock,
    pub body: Option<serde_json::Value>,
}

/// A single atomic unit of work against the backend. All mutating
/// methods performed through one `StorageTxn` either all take effect
/// when the enclosing [`StorageBackend::transaction`] call returns
/// `Ok`, or none do.
///
/// This trait is object-safe by design: the put/resolve/delete state
/// machine and the sync exchange are written against `&mut dyn
/// StorageTxn` so they do not need to be generic over the concrete
/// backend.
pub trait StorageTxn {
    fn get_document(&mut self, doc_id: &str) -> Result<Option<StoredDocument>>;

    /// Overwrite (or create) the current entry for `doc_id`. Does not
    /// touch the conflict set or the log; callers combine this with
    /// `append_log`.
    fn put_document(&mut self, doc_id: &str, document: StoredDocument) -> Result<()>;

    fn get_conflicts(&mut self, doc_id: &str) -> Result<Vec<ConflictEntry>>;

    fn set_conflicts(&mut self, doc_id: &str, conflicts: Vec<ConflictEntry>) -> Result<()>;

    /// All doc_ids with a non-empty conflict set.
    fn doc_ids_with_conflicts(&mut self) -> Result<Vec<String>>;

    /// Allocate the next generation (current_max + 1) and append a log
    /// entry. Returns the newly allocated generation.
    fn append_log(&mut self, doc_id: &str, transaction_id: &str) -> Result<u64>;

    fn current_generation(&mut self) -> Result<(u64, String)>;

    fn changes_since(&mut self, generation: u64) -> Result<(Vec<ChangeEntry>, String)>;

    /// The log entry recorded at exactly `generation`, if any. Used by
    /// `validate` (§4.3) to check a claimed (generation, transaction_id)
    /// pair against the real log.
    fn log_entry_at(&mut self, generation: u64) -> Result<Option<LogEntry>>;

    fn get_sync_state(&mut self, peer_uid: &str) -> Result<SyncWatermark>;

    fn set_sync_state(&mut self, peer_uid: &str, watermark: SyncWatermark) -> Result<()>;

    /// All documents, each with its current revision/body. The caller
    /// is responsible for filtering tombstones and deriving
    /// `has_conflicts`.
    fn all_documents(&mut self) -> Result<Vec<(String, StoredDocument)>>;

    fn replica_uid(&mut self) -> Result<Option<String>>;

    fn set_replica_uid(&mut self, uid: &str) -> Result<()>;
}

/// Validate a claimed (generation, transaction_id) pair against the
/// log, per §4.3's `validate`. Generation 0 is always ok.
pub fn validate_generation(txn: &mut dyn StorageTxn, generation: u64, transaction_id: &str) -> Result<()> {
    if generation == 0 {
        return Ok(());
    }
    match txn.log_entry_at(generation)? {
        Some(entry) if entry.transaction_id == transaction_id => Ok(()),
        Some(_) => Err(Error::InvalidTransactionId),
        None => Err(Error::InvalidGeneration),
    }
}

/// The backend capability: run a closure inside a single atomic unit.
/// On `Err`, every mutation performed through the `StorageTxn` is
/// rolled back.
pub trait StorageBackend {
    fn transaction<T>(&self, f: impl FnOnce(&mut dyn StorageTxn) -> Result<T>) -> Result<T>;
}

#[derive(Debug, Default, Clone)]
struct MemoryState {
    documents: BTreeMap<String, StoredDocument>,
    conflicts: BTreeMap<String, Vec<ConflictEntry>>,
    log: Vec<LogEntry>,
    sync_state: BTreeMap<String, SyncWatermark>,
    replica_uid: Option<String>,
}

/// The default, in-memory [`StorageBackend`]. `!Sync` by construction
/// (via `RefCell`) — a `Replica` is meant to be owned by a single
/// thread at a time, per the concurrency model in §5.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RefCell<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }
}

struct MemoryTxn<'a> {
    state: &'a mut MemoryState,
}

impl StorageTxn for MemoryTxn<'_> {
    fn get_document(&mut self, doc_id: &str) -> Result<Option<StoredDocument>> {
        Ok(self.state.documents.get(doc_id).cloned())
    }

    fn put_document(&mut self, doc_id: &str, document: StoredDocument) -> Result<()> {
        self.state.documents.insert(doc_id.to_string(), document);
        Ok(())
    }

    fn get_conflicts(&mut self, doc_id: &str) -> Result<Vec<ConflictEntry>> {
        Ok(self.state.conflicts.get(doc_id).cloned().unwrap_or_default())
    }

    fn set_conflicts(&mut self, doc_id: &str, conflicts: Vec<ConflictEntry>) -> Result<()> {
        if conflicts.is_empty() {
            self.state.conflicts.remove(doc_id);
        } else {
            self.state.conflicts.insert(doc_id.to_string(), conflicts);
        }
        Ok(())
    }

    fn doc_ids_with_conflicts(&mut self) -> Result<Vec<String>> {
        Ok(self.state.conflicts.keys().cloned().collect())
    }

    fn append_log(&mut self, doc_id: &str, transaction_id: &str) -> Result<u64> {
        let generation = self.state.log.last().map(|e| e.generation).unwrap_or(0) + 1;
        self.state.log.push(LogEntry {
            generation,
            doc_id: doc_id.to_string(),
            transaction_id: transaction_id.to_string(),
        });
        Ok(generation)
    }

    fn current_generation(&mut self) -> Result<(u64, String)> {
        Ok(log::current_generation(&self.state.log))
    }

    fn changes_since(&mut self, generation: u64) -> Result<(Vec<ChangeEntry>, String)> {
        Ok(log::changes_since(&self.state.log, generation))
    }

    fn log_entry_at(&mut self, generation: u64) -> Result<Option<LogEntry>> {
        Ok(self
            .state
            .log
            .iter()
            .find(|e| e.generation == generation)
            .cloned())
    }

    fn get_sync_state(&mut self, peer_uid: &str) -> Result<SyncWatermark> {
        Ok(self
            .state
            .sync_state
            .get(peer_uid)
            .cloned()
            .unwrap_or_default())
    }

    fn set_sync_state(&mut self, peer_uid: &str, watermark: SyncWatermark) -> Result<()> {
        self.state.sync_state.insert(peer_uid.to_string(), watermark);
        Ok(())
    }

    fn all_documents(&mut self) -> Result<Vec<(String, StoredDocument)>> {
        Ok(self
            .state
            .documents
            .iter()
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect())
    }

    fn replica_uid(&mut self) -> Result<Option<String>> {
        Ok(self.state.replica_uid.clone())
    }

    fn set_replica_uid(&mut self, uid: &str) -> Result<()> {
        self.state.replica_uid = Some(uid.to_string());
        Ok(())
    }
}

impl StorageBackend for MemoryBackend {
    fn transaction<T>(&self, f: impl FnOnce(&mut dyn StorageTxn) -> Result<T>) -> Result<T> {
        let mut state = self.state.borrow_mut();
        let snapshot = state.clone();
        let mut txn = MemoryTxn { state: &mut state };
        match f(&mut txn) {
            Ok(value) => Ok(value),
            Err(err) => {
                *state = snapshot;
                Err(err)
            }
        }
    }
}
