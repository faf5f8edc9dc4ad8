//! The put/resolve/delete state machine (C5): the central arbitrator
//! that reconciles an incoming document against the stored one using
//! vector-clock comparisons (C1) against the document store (C2) and
//! transaction log (C3).
//!
//! Grounded in `u1db.c`'s `u1db__put_doc_if_newer` / `prune_conflicts`
//! / `u1db_resolve_doc` / `u1db_delete_doc`; generalized from the
//! teacher's `Reconciler` orchestration shape.

use crate::backend::{validate_generation, StorageTxn, StoredDocument};
use crate::clock::VectorClock;
use crate::conflict::ConflictEntry;
use crate::document::{bodies_byte_equal, validate_body, validate_doc_id};
use crate::error::{Error, Result};
use crate::ids::new_transaction_id;
use crate::sync_state::SyncWatermark;

/// The outcome of a `put`, as named in §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Superseded,
    Converged,
    Conflicted,
}

/// Attribution carried by a put that originates from a remote sync
/// peer, as opposed to a local write.
#[derive(Debug, Clone)]
pub struct Attribution {
    pub peer_uid: String,
    pub peer_generation: u64,
    pub peer_transaction_id: String,
}

#[derive(Debug, Clone)]
pub struct PutResult {
    pub outcome: PutOutcome,
    pub generation: u64,
    pub revision: VectorClock,
}

#[derive(Debug, Clone)]
pub struct DeleteResult {
    pub generation: u64,
    pub revision: VectorClock,
}

#[derive(Debug, Clone)]
pub struct ResolveResult {
    pub generation: u64,
    pub revision: VectorClock,
    pub has_conflicts: bool,
}

/// Arbitrate an incoming `(doc_id, new_revision, body)` against the
/// stored document and conflict set. See §4.5 for the full algorithm.
pub fn put(
    txn: &mut dyn StorageTxn,
    replica_uid: &str,
    doc_id: &str,
    new_revision: VectorClock,
    body: Option<serde_json::Value>,
    save_conflict: bool,
    attribution: Option<Attribution>,
) -> Result<PutResult> {
    validate_doc_id(doc_id)?;
    validate_body(&body)?;

    if let Some(attr) = &attribution {
        let known = txn.get_sync_state(&attr.peer_uid)?;
        if attr.peer_generation < known.generation {
            let stored = txn.get_document(doc_id)?;
            let (gen, _) = txn.current_generation()?;
            return match &stored {
                Some(s) if s.revision.is_newer(&new_revision) => Ok(PutResult {
                    outcome: PutOutcome::Superseded,
                    generation: gen,
                    revision: s.revision.clone(),
                }),
                _ => Err(Error::InvalidGeneration),
            };
        } else if attr.peer_generation == known.generation {
            if attr.peer_transaction_id != known.transaction_id {
                return Err(Error::InvalidTransactionId);
            }
            let stored = txn.get_document(doc_id)?;
            let (gen, _) = txn.current_generation()?;
            return Ok(PutResult {
                outcome: PutOutcome::Superseded,
                generation: gen,
                revision: stored.map(|s| s.revision).unwrap_or_default(),
            });
        }
        // peer_generation > known.generation: proceed.
    }

    let stored = txn.get_document(doc_id)?;
    let mut nv = new_revision;
    let outcome;
    let should_write;

    match &stored {
        None => {
            outcome = PutOutcome::Inserted;
            should_write = true;
        }
        Some(current) if nv.serialize() == current.revision.serialize() => {
            outcome = PutOutcome::Converged;
            should_write = false;
        }
        Some(current) if nv.is_newer(&current.revision) => {
            let auto_resolved = prune_conflicts(txn, replica_uid, doc_id, &mut nv, &body)?;
            outcome = if auto_resolved {
                PutOutcome::Superseded
            } else {
                PutOutcome::Inserted
            };
            should_write = true;
        }
        Some(current) if current.revision.is_newer(&nv) => {
            outcome = PutOutcome::Superseded;
            should_write = false;
        }
        Some(current) => {
            // Concurrent.
            if bodies_byte_equal(&body, &current.body) {
                nv = nv.maximize(&current.revision).increment(replica_uid);
                outcome = PutOutcome::Superseded;
                should_write = true;
            } else if save_conflict {
                let mut conflicts = txn.get_conflicts(doc_id)?;
                conflicts.push(ConflictEntry::new(current.revision.clone(), current.body.clone()));
                txn.set_conflicts(doc_id, conflicts)?;
                outcome = PutOutcome::Conflicted;
                should_write = true;
            } else {
                outcome = PutOutcome::Conflicted;
                should_write = false;
            }
        }
    }

    let generation = if should_write {
        txn.put_document(
            doc_id,
            StoredDocument {
                revision: nv.clone(),
                body,
            },
        )?;
        let trans_id = new_transaction_id();
        txn.append_log(doc_id, &trans_id)?
    } else {
        txn.current_generation()?.0
    };

    if let Some(attr) = attribution {
        txn.set_sync_state(
            &attr.peer_uid,
            SyncWatermark {
                generation: attr.peer_generation,
                transaction_id: attr.peer_transaction_id,
            },
        )?;
    }

    let revision = if should_write {
        nv
    } else {
        stored.map(|s| s.revision).unwrap_or_default()
    };

    Ok(PutResult {
        outcome,
        generation,
        revision,
    })
}

/// Conflict pruning (when `nv` is strictly newer than the stored
/// current revision). Returns whether an auto-resolve merge happened,
/// in which case `nv` has already been bumped by `replica_uid` and the
/// caller should treat the outcome as superseded rather than inserted.
fn prune_conflicts(
    txn: &mut dyn StorageTxn,
    replica_uid: &str,
    doc_id: &str,
    nv: &mut VectorClock,
    body: &Option<serde_json::Value>,
) -> Result<bool> {
    let existing = txn.get_conflicts(doc_id)?;
    let mut kept = Vec::new();
    let mut auto_resolved = false;

    for entry in existing {
        if nv.is_newer(&entry.revision) {
            // Superseded by the new revision; drop it.
        } else if bodies_byte_equal(body, &entry.body) {
            *nv = nv.maximize(&entry.revision);
            auto_resolved = true;
        } else {
            kept.push(entry);
        }
    }

    if auto_resolved {
        *nv = nv.increment(replica_uid);
    }

    txn.set_conflicts(doc_id, kept)?;
    Ok(auto_resolved)
}

/// `delete(doc)` per §4.5: requires a live (non-tombstone) current
/// entry with no conflicts and an exactly matching revision.
pub fn delete(
    txn: &mut dyn StorageTxn,
    replica_uid: &str,
    doc_id: &str,
    expected_revision: &VectorClock,
) -> Result<DeleteResult> {
    validate_doc_id(doc_id)?;
    let stored = txn.get_document(doc_id)?.ok_or(Error::DocumentDoesNotExist)?;
    if stored.body.is_none() {
        return Err(Error::DocumentAlreadyDeleted);
    }
    if !txn.get_conflicts(doc_id)?.is_empty() {
        return Err(Error::Conflicted);
    }
    if &stored.revision != expected_revision {
        return Err(Error::RevisionConflict);
    }

    let new_revision = stored.revision.increment(replica_uid);
    txn.put_document(
        doc_id,
        StoredDocument {
            revision: new_revision.clone(),
            body: None,
        },
    )?;
    let trans_id = new_transaction_id();
    let generation = txn.append_log(doc_id, &trans_id)?;

    Ok(DeleteResult {
        generation,
        revision: new_revision,
    })
}

/// `resolve(doc, superseded_revs)` per §4.5.
pub fn resolve(
    txn: &mut dyn StorageTxn,
    replica_uid: &str,
    doc_id: &str,
    body: Option<serde_json::Value>,
    superseded_revs: &[String],
) -> Result<ResolveResult> {
    validate_doc_id(doc_id)?;
    validate_body(&body)?;

    let stored = txn.get_document(doc_id)?;
    let mut new_vc = stored.as_ref().map(|s| s.revision.clone()).unwrap_or_default();
    for rev_str in superseded_revs {
        new_vc = new_vc.maximize(&VectorClock::parse(rev_str)?);
    }
    new_vc = new_vc.increment(replica_uid);

    let stored_listed = match &stored {
        Some(current) => superseded_revs
            .iter()
            .any(|r| r == &current.revision.serialize()),
        None => true,
    };

    if stored_listed {
        txn.put_document(
            doc_id,
            StoredDocument {
                revision: new_vc.clone(),
                body: body.clone(),
            },
        )?;
    }

    let mut remaining: Vec<ConflictEntry> = txn
        .get_conflicts(doc_id)?
        .into_iter()
        .filter(|c| !superseded_revs.contains(&c.revision.serialize()))
        .collect();

    if !stored_listed {
        remaining.push(ConflictEntry::new(new_vc.clone(), body));
    }

    let has_conflicts = !remaining.is_empty();
    txn.set_conflicts(doc_id, remaining)?;

    let trans_id = new_transaction_id();
    let generation = txn.append_log(doc_id, &trans_id)?;

    Ok(ResolveResult {
        generation,
        revision: new_vc,
        has_conflicts,
    })
}

/// Validate a claimed local-generation watermark against the log;
/// re-exported here since both the orchestrator and the replica facade
/// need it.
pub fn validate(txn: &mut dyn StorageTxn, generation: u64, transaction_id: &str) -> Result<()> {
    validate_generation(txn, generation, transaction_id)
}
