//! The sync orchestrator (C7, §4.7): drives a full bidirectional sync
//! against a [`SyncTarget`] — discover the peer's view of us, send what
//! it's missing, absorb what it sends back, and record the new
//! watermark.
//!
//! Grounded in `u1db_sync_target.c`'s `u1db__sync_db_to_target`.

use crate::backend::StorageBackend;
use crate::exchange::DocWire;
use crate::error::Result;
use crate::state_machine::{self, Attribution, PutOutcome};
use crate::sync_state::SyncWatermark;
use crate::sync_target::{SyncExchangeRequest, SyncTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub docs_sent: usize,
    pub docs_received: usize,
    pub local_generation: u64,
}

/// Run one bidirectional sync of `backend` (as replica `local_replica_uid`)
/// against `target`.
pub fn sync<B: StorageBackend>(
    backend: &B,
    local_replica_uid: &str,
    target: &dyn SyncTarget,
) -> Result<SyncOutcome> {
    // 1. Ask target for its view of us.
    let info = target.get_sync_info(local_replica_uid)?;

    // 2. Validate the generation/trans_id the target claims to know
    // about us against our own log.
    backend.transaction(|txn| {
        state_machine::validate(txn, info.local_gen_known_by_target, &info.local_trans_known_by_target)
    })?;

    // 3. Our own view of the target.
    let target_watermark = backend.transaction(|txn| txn.get_sync_state(&info.target_uid))?;

    // 4. What's changed locally since the target last saw us.
    let (changes, _) = backend.transaction(|txn| txn.changes_since(info.local_gen_known_by_target))?;
    let (local_gen, _) = backend.transaction(|txn| txn.current_generation())?;

    // 5. Nothing to do.
    if local_gen == info.local_gen_known_by_target && info.target_gen == target_watermark.generation {
        return Ok(SyncOutcome {
            docs_sent: 0,
            docs_received: 0,
            local_generation: local_gen,
        });
    }

    // 6. Remember where we started, to detect "every local write this
    // sync originated from the target" at the end.
    let local_gen_before_sync = local_gen;

    let mut source_docs = Vec::with_capacity(changes.len());
    for change in &changes {
        if let Some(stored) = backend.transaction(|txn| txn.get_document(&change.doc_id))? {
            source_docs.push(DocWire {
                doc_id: change.doc_id.clone(),
                revision: stored.revision,
                body: stored.body,
                generation: change.generation,
                transaction_id: change.transaction_id.clone(),
            });
        }
    }
    let docs_sent = source_docs.len();

    // 7. One round-trip exchange.
    let response = target.sync_exchange_doc_ids(SyncExchangeRequest {
        source_uid: local_replica_uid.to_string(),
        source_docs,
        target_gen_known_by_source: target_watermark.generation,
        target_trans_known_by_source: target_watermark.transaction_id.clone(),
    })?;

    let docs_received = response.docs.len();
    let mut applied = 0u64;
    for doc in response.docs {
        let attribution = Attribution {
            peer_uid: info.target_uid.clone(),
            peer_generation: doc.generation,
            peer_transaction_id: doc.transaction_id.clone(),
        };
        let result = backend.transaction(|txn| {
            state_machine::put(
                txn,
                local_replica_uid,
                &doc.doc_id,
                doc.revision.clone(),
                doc.body.clone(),
                true,
                Some(attribution.clone()),
            )
        })?;
        if matches!(result.outcome, PutOutcome::Inserted | PutOutcome::Conflicted) {
            applied += 1;
        }
    }

    // 8. Re-read local generation/trans_id after absorbing the target's docs.
    let (new_local_gen, new_local_trans) = backend.transaction(|txn| txn.current_generation())?;

    // 9. Record the target's new watermark for us.
    backend.transaction(|txn| {
        txn.set_sync_state(
            &info.target_uid,
            SyncWatermark {
                generation: response.new_generation,
                transaction_id: response.new_transaction_id.clone(),
            },
        )
    })?;

    // 10. If every local write this sync came from the target, tell it
    // so it can skip us next time. Zero-write syncs never report a
    // watermark (u1db_sync_target.c:662's num_inserted > 0 gate).
    if applied > 0 && applied == new_local_gen.saturating_sub(local_gen_before_sync) {
        target.record_sync_info(local_replica_uid, new_local_gen, &new_local_trans)?;
    }

    Ok(SyncOutcome {
        docs_sent,
        docs_received,
        local_generation: new_local_gen,
    })
}
