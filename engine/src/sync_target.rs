//! The sync target abstraction (§4.8): the collaborator surface a
//! replica synchronizes against, with two implementors in this
//! workspace — [`LocalSyncTarget`] here (an in-process peer, no
//! serialization) and `HttpSyncTarget` in the server crate (speaks the
//! §6.4 wire protocol over `reqwest`).
//!
//! Grounded in `u1db_sync_target.c`'s vtable of the same name; the
//! trace hook waypoints are preserved verbatim from
//! `u1db__sync_target_set_trace_hook`.

use crate::backend::StorageBackend;
use crate::exchange::{DocWire, SyncExchange};
use crate::error::Result;
use crate::state_machine::PutOutcome;
use crate::sync_state::SyncWatermark;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    pub target_uid: String,
    pub target_gen: u64,
    pub local_gen_known_by_target: u64,
    pub local_trans_known_by_target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncExchangeRequest {
    pub source_uid: String,
    pub source_docs: Vec<DocWire>,
    pub target_gen_known_by_source: u64,
    pub target_trans_known_by_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncExchangeResponse {
    pub new_generation: u64,
    pub new_transaction_id: String,
    pub docs: Vec<DocWire>,
}

/// An observer invoked at named waypoints during a local sync
/// exchange, used to inject deterministic interleavings in tests.
/// Returning `Err` aborts the sync with that error.
pub type TraceHook = Box<dyn Fn(&str) -> Result<()>>;

/// The low-level session handle behind [`SyncTarget::get_sync_exchange`],
/// mirroring the original's two-phase (insert many, then finalize)
/// shape. The orchestrator (§4.7) never uses this directly; it is
/// exposed for callers that want to drive an exchange incrementally.
pub trait SyncExchangeSession {
    fn insert_doc_from_source(&mut self, doc: DocWire) -> Result<PutOutcome>;
    fn finish(&mut self) -> Result<SyncExchangeResponse>;
}

/// The collaborator surface a replica synchronizes against.
pub trait SyncTarget {
    fn get_sync_info(&self, source_uid: &str) -> Result<SyncInfo>;

    fn record_sync_info(&self, source_uid: &str, source_gen: u64, source_trans_id: &str) -> Result<()>;

    /// Perform one full directional exchange in a single call — the
    /// shape the §6.4 wire protocol actually uses.
    fn sync_exchange_doc_ids(&self, request: SyncExchangeRequest) -> Result<SyncExchangeResponse>;

    fn get_sync_exchange(&self, source_uid: &str, target_gen_known_by_source: u64) -> Result<Box<dyn SyncExchangeSession + '_>>;

    fn finalize_sync_exchange(&self, exchange: Box<dyn SyncExchangeSession + '_>) -> Result<()>;

    fn set_trace_hook(&mut self, hook: Option<TraceHook>);
}

/// An in-process sync target: wraps a second backend directly, with no
/// serialization. Lets two `Replica`s in the same process synchronize,
/// and lets tests exercise the orchestrator/exchange without a network.
pub struct LocalSyncTarget<'b, B: StorageBackend> {
    backend: &'b B,
    replica_uid: String,
    trace_hook: RefCell<Option<TraceHook>>,
}

impl<'b, B: StorageBackend> LocalSyncTarget<'b, B> {
    pub fn new(backend: &'b B, replica_uid: impl Into<String>) -> Self {
        LocalSyncTarget {
            backend,
            replica_uid: replica_uid.into(),
            trace_hook: RefCell::new(None),
        }
    }

    fn fire(&self, waypoint: &str) -> Result<()> {
        if let Some(hook) = self.trace_hook.borrow().as_ref() {
            hook(waypoint)?;
        }
        Ok(())
    }
}

impl<'b, B: StorageBackend> SyncTarget for LocalSyncTarget<'b, B> {
    fn get_sync_info(&self, source_uid: &str) -> Result<SyncInfo> {
        let (target_gen, _) = self.backend.transaction(|txn| txn.current_generation())?;
        let watermark = self.backend.transaction(|txn| txn.get_sync_state(source_uid))?;
        Ok(SyncInfo {
            target_uid: self.replica_uid.clone(),
            target_gen,
            local_gen_known_by_target: watermark.generation,
            local_trans_known_by_target: watermark.transaction_id,
        })
    }

    fn record_sync_info(&self, source_uid: &str, source_gen: u64, source_trans_id: &str) -> Result<()> {
        self.fire("record_sync_info")?;
        self.backend.transaction(|txn| {
            txn.set_sync_state(
                source_uid,
                SyncWatermark {
                    generation: source_gen,
                    transaction_id: source_trans_id.to_string(),
                },
            )
        })
    }

    fn sync_exchange_doc_ids(&self, request: SyncExchangeRequest) -> Result<SyncExchangeResponse> {
        let mut exchange = SyncExchange::new(
            self.backend,
            self.replica_uid.clone(),
            request.source_uid,
            request.target_gen_known_by_source,
        );
        self.fire("before whats_changed")?;
        for doc in request.source_docs {
            exchange.insert_from_source(&doc.doc_id, doc.revision, doc.body, doc.generation, &doc.transaction_id)?;
        }
        exchange.compute_return_set()?;
        self.fire("after whats_changed")?;
        self.fire("before get_docs")?;
        let mut docs = Vec::new();
        exchange.return_docs(|doc| {
            docs.push(doc);
            Ok(())
        })?;
        Ok(SyncExchangeResponse {
            new_generation: exchange.target_generation(),
            new_transaction_id: exchange.target_transaction_id().to_string(),
            docs,
        })
    }

    fn get_sync_exchange(&self, source_uid: &str, target_gen_known_by_source: u64) -> Result<Box<dyn SyncExchangeSession + '_>> {
        Ok(Box::new(LocalSyncExchangeSession {
            target: self,
            exchange: SyncExchange::new(self.backend, self.replica_uid.clone(), source_uid.to_string(), target_gen_known_by_source),
        }))
    }

    fn finalize_sync_exchange(&self, _exchange: Box<dyn SyncExchangeSession + '_>) -> Result<()> {
        Ok(())
    }

    fn set_trace_hook(&mut self, hook: Option<TraceHook>) {
        self.trace_hook = RefCell::new(hook);
    }
}

struct LocalSyncExchangeSession<'a, 'b, B: StorageBackend> {
    target: &'a LocalSyncTarget<'b, B>,
    exchange: SyncExchange<'b, B>,
}

impl<'a, 'b, B: StorageBackend> SyncExchangeSession for LocalSyncExchangeSession<'a, 'b, B> {
    fn insert_doc_from_source(&mut self, doc: DocWire) -> Result<PutOutcome> {
        self.exchange
            .insert_from_source(&doc.doc_id, doc.revision, doc.body, doc.generation, &doc.transaction_id)
    }

    fn finish(&mut self) -> Result<SyncExchangeResponse> {
        self.target.fire("before whats_changed")?;
        self.exchange.compute_return_set()?;
        self.target.fire("after whats_changed")?;
        self.target.fire("before get_docs")?;
        let mut docs = Vec::new();
        self.exchange.return_docs(|doc| {
            docs.push(doc);
            Ok(())
        })?;
        Ok(SyncExchangeResponse {
            new_generation: self.exchange.target_generation(),
            new_transaction_id: self.exchange.target_transaction_id().to_string(),
            docs,
        })
    }
}
