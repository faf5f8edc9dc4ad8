//! Sync exchange (C6): a one-shot object scoped to a single directional
//! session with a peer — documents flow in via [`SyncExchange::insert_from_source`]
//! and a return set is computed and streamed back out.
//!
//! Grounded in `u1db_sync_target.c`'s `st_sync_exchange_doc_ids` (minus
//! the noted realloc bug in DESIGN.md, which is not replicated).

use crate::backend::StorageBackend;
use crate::clock::VectorClock;
use crate::error::Result;
use crate::state_machine::{self, Attribution, PutOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One document as it travels over the sync wire protocol (§6.4):
/// identity, revision, body, and the generation/transaction_id of the
/// sender's log entry that produced this revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocWire {
    pub doc_id: String,
    pub revision: VectorClock,
    pub body: Option<serde_json::Value>,
    pub generation: u64,
    pub transaction_id: String,
}

/// Drives one directional sync session into `backend`, from the peer
/// identified by `source_uid`.
pub struct SyncExchange<'b, B: StorageBackend> {
    backend: &'b B,
    local_replica_uid: String,
    source_uid: String,
    target_gen: u64,
    target_trans_id: String,
    seen: HashMap<String, u64>,
    return_list: Vec<String>,
    return_meta: HashMap<String, (u64, String)>,
}

impl<'b, B: StorageBackend> SyncExchange<'b, B> {
    pub fn new(
        backend: &'b B,
        local_replica_uid: impl Into<String>,
        source_uid: impl Into<String>,
        target_gen_known_by_source: u64,
    ) -> Self {
        SyncExchange {
            backend,
            local_replica_uid: local_replica_uid.into(),
            source_uid: source_uid.into(),
            target_gen: target_gen_known_by_source,
            target_trans_id: String::new(),
            seen: HashMap::new(),
            return_list: Vec::new(),
            return_meta: HashMap::new(),
        }
    }

    /// Feed one document sent by the source into the local put state
    /// machine, attributed to `source_uid`. Tracks it in the seen set
    /// if it was inserted or converged, so `compute_return_set` does
    /// not echo it back.
    pub fn insert_from_source(
        &mut self,
        doc_id: &str,
        revision: VectorClock,
        body: Option<serde_json::Value>,
        source_gen: u64,
        source_trans_id: &str,
    ) -> Result<PutOutcome> {
        let attribution = Attribution {
            peer_uid: self.source_uid.clone(),
            peer_generation: source_gen,
            peer_transaction_id: source_trans_id.to_string(),
        };
        let result = self.backend.transaction(|txn| {
            state_machine::put(
                txn,
                &self.local_replica_uid,
                doc_id,
                revision.clone(),
                body.clone(),
                false,
                Some(attribution.clone()),
            )
        })?;
        if matches!(result.outcome, PutOutcome::Inserted | PutOutcome::Converged) {
            self.seen.insert(doc_id.to_string(), result.generation);
        }
        Ok(result.outcome)
    }

    /// Compute which doc_ids need to be sent back to the source: every
    /// doc changed since `target_gen` (as this session started),
    /// except those the source just sent us an equivalent-or-newer
    /// version of. Advances `target_gen`/`target_trans_id` to the log
    /// head.
    pub fn compute_return_set(&mut self) -> Result<()> {
        let (changes, _) = self.backend.transaction(|txn| txn.changes_since(self.target_gen))?;
        for change in changes {
            if let Some(&seen_gen) = self.seen.get(&change.doc_id) {
                if seen_gen >= change.generation {
                    continue;
                }
            }
            self.return_meta
                .insert(change.doc_id.clone(), (change.generation, change.transaction_id));
            self.return_list.push(change.doc_id);
        }
        let (head_gen, head_trans_id) = self.backend.transaction(|txn| txn.current_generation())?;
        self.target_gen = head_gen;
        self.target_trans_id = head_trans_id;
        Ok(())
    }

    /// Fetch the return set's documents, in order, and hand each to
    /// `cb`.
    pub fn return_docs(&self, mut cb: impl FnMut(DocWire) -> Result<()>) -> Result<()> {
        for doc_id in &self.return_list {
            let stored = self.backend.transaction(|txn| txn.get_document(doc_id))?;
            let Some(stored) = stored else { continue };
            let (generation, transaction_id) = self
                .return_meta
                .get(doc_id)
                .cloned()
                .unwrap_or((0, String::new()));
            cb(DocWire {
                doc_id: doc_id.clone(),
                revision: stored.revision,
                body: stored.body,
                generation,
                transaction_id,
            })?;
        }
        Ok(())
    }

    pub fn target_generation(&self) -> u64 {
        self.target_gen
    }

    pub fn target_transaction_id(&self) -> &str {
        &self.target_trans_id
    }
}
