//! The `Replica` facade: wires C1-C7 together behind the public API a
//! caller actually uses. Owns one [`StorageBackend`] and this
//! database's replica identity.

use crate::backend::{StorageBackend, StorageTxn};
use crate::clock::VectorClock;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::ids;
use crate::orchestrator::{self, SyncOutcome};
use crate::state_machine::{self, DeleteResult, PutResult, ResolveResult};
use crate::sync_target::SyncTarget;

/// A single local database instance identified by a unique
/// `replica_uid`, generated the first time its backend is opened (§3,
/// Replica Identity) and immutable thereafter.
///
/// `!Sync` by construction whenever `B` is (the default `MemoryBackend`
/// is): a replica is meant to be driven by one caller at a time (§5).
pub struct Replica<B: StorageBackend> {
    backend: B,
    replica_uid: String,
}

impl<B: StorageBackend> Replica<B> {
    /// Open a replica over `backend`, assigning it a fresh identity if
    /// none has been stored yet.
    pub fn open(backend: B) -> Result<Self> {
        let existing = backend.transaction(|txn| txn.replica_uid())?;
        let replica_uid = match existing {
            Some(uid) => uid,
            None => {
                let uid = ids::new_replica_uid();
                backend.transaction(|txn| txn.set_replica_uid(&uid))?;
                uid
            }
        };
        Ok(Replica { backend, replica_uid })
    }

    pub fn replica_uid(&self) -> &str {
        &self.replica_uid
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Local `put`: the caller supplies the revision it last observed
    /// (empty string for a brand-new document). A mismatch against the
    /// stored current revision fails with `revision_conflict`;
    /// otherwise the stored clock is incremented by this replica's uid
    /// and the shared put cascade (§4.5) runs from there.
    pub fn put(
        &self,
        doc_id: &str,
        expected_revision: &str,
        body: Option<serde_json::Value>,
    ) -> Result<PutResult> {
        self.backend.transaction(|txn| {
            let current = txn.get_document(doc_id)?;
            let current_rev = current.as_ref().map(|c| c.revision.serialize()).unwrap_or_default();
            if current_rev != expected_revision {
                return Err(Error::RevisionConflict);
            }
            let base = current.map(|c| c.revision).unwrap_or_default();
            let new_revision = base.increment(&self.replica_uid);
            state_machine::put(txn, &self.replica_uid, doc_id, new_revision, body.clone(), false, None)
        })
    }

    pub fn delete(&self, doc_id: &str, revision: &str) -> Result<DeleteResult> {
        let expected = VectorClock::parse(revision)?;
        self.backend
            .transaction(|txn| state_machine::delete(txn, &self.replica_uid, doc_id, &expected))
    }

    pub fn resolve(
        &self,
        doc_id: &str,
        body: Option<serde_json::Value>,
        superseded_revs: &[String],
    ) -> Result<ResolveResult> {
        self.backend
            .transaction(|txn| state_machine::resolve(txn, &self.replica_uid, doc_id, body.clone(), superseded_revs))
    }

    pub fn get(&self, doc_id: &str, include_deleted: bool) -> Result<Option<Document>> {
        self.backend.transaction(|txn| {
            let Some(stored) = txn.get_document(doc_id)? else {
                return Ok(None);
            };
            if stored.body.is_none() && !include_deleted {
                return Ok(None);
            }
            let has_conflicts = !txn.get_conflicts(doc_id)?.is_empty();
            let mut doc = Document::new(doc_id, stored.revision, stored.body);
            doc.has_conflicts = has_conflicts;
            Ok(Some(doc))
        })
    }

    pub fn get_many(
        &self,
        doc_ids: &[String],
        check_conflicts: bool,
        include_deleted: bool,
    ) -> Result<Vec<Document>> {
        self.backend.transaction(|txn| {
            let mut out = Vec::new();
            for doc_id in doc_ids {
                let Some(stored) = txn.get_document(doc_id)? else {
                    continue;
                };
                if stored.body.is_none() && !include_deleted {
                    continue;
                }
                let mut doc = Document::new(doc_id.clone(), stored.revision, stored.body);
                if check_conflicts {
                    doc.has_conflicts = !txn.get_conflicts(doc_id)?.is_empty();
                }
                out.push(doc);
            }
            Ok(out)
        })
    }

    /// Every stored document plus the generation read before the scan.
    pub fn get_all(&self, include_deleted: bool) -> Result<(Vec<Document>, u64)> {
        self.backend.transaction(|txn| {
            let (generation, _) = txn.current_generation()?;
            let mut out = Vec::new();
            for (doc_id, stored) in txn.all_documents()? {
                if stored.body.is_none() && !include_deleted {
                    continue;
                }
                let has_conflicts = !txn.get_conflicts(&doc_id)?.is_empty();
                let mut doc = Document::new(doc_id, stored.revision, stored.body);
                doc.has_conflicts = has_conflicts;
                out.push(doc);
            }
            Ok((out, generation))
        })
    }

    /// The current revision (if any conflicts exist) followed by every
    /// conflict entry; empty if the document has no conflicts.
    pub fn conflicts_of(&self, doc_id: &str) -> Result<Vec<Document>> {
        self.backend.transaction(|txn| {
            let conflicts = txn.get_conflicts(doc_id)?;
            if conflicts.is_empty() {
                return Ok(Vec::new());
            }
            let mut out = Vec::new();
            if let Some(stored) = txn.get_document(doc_id)? {
                let mut doc = Document::new(doc_id, stored.revision, stored.body);
                doc.has_conflicts = true;
                out.push(doc);
            }
            for entry in conflicts {
                out.push(Document::new(doc_id, entry.revision, entry.body));
            }
            Ok(out)
        })
    }

    pub fn sync(&self, target: &dyn SyncTarget) -> Result<SyncOutcome> {
        orchestrator::sync(&self.backend, &self.replica_uid, target)
    }
}
