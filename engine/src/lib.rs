//! # Replikit Engine
//!
//! A small, embeddable, JSON-document replication engine: vector-clock
//! revisions, conflict-closure semantics, and bidirectional
//! peer-to-peer sync.
//!
//! This crate provides the core logic only. It handles documents,
//! conflicts, and sync exchange with guaranteed determinism — the same
//! inputs always produce the same outputs.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of files, network, or platform
//! - **Deterministic**: same inputs always produce the same outputs
//! - **Testable**: pure logic behind a `StorageTxn` trait object, no mocks needed
//! - **Single-threaded per handle**: a [`Replica`] is `!Sync` whenever its
//!   backend is; concurrent access across threads is the caller's problem
//!
//! ## Core Concepts
//!
//! ### Documents
//!
//! Data is stored as [`Document`]s, keyed by an opaque doc_id, each
//! carrying a [`VectorClock`] revision and an optional JSON body (absent
//! means tombstoned).
//!
//! ### Vector clocks
//!
//! [`VectorClock`] provides causal ordering across replicas: a map from
//! replica_uid to a monotonically increasing generation counter.
//!
//! ### The put/resolve/delete state machine
//!
//! [`state_machine::put`] is the central arbitrator: it compares an
//! incoming revision against the stored one and produces one of
//! inserted, superseded, converged, or conflicted.
//!
//! ### Sync
//!
//! [`SyncExchange`] drives one directional session against a peer;
//! [`orchestrator::sync`] drives a full bidirectional sync against any
//! [`SyncTarget`] — including [`LocalSyncTarget`], an in-process peer
//! used by this crate's own tests.
//!
//! ## Quick Start
//!
//! ```rust
//! use replikit_engine::{Replica, MemoryBackend};
//! use serde_json::json;
//!
//! let replica = Replica::open(MemoryBackend::new()).unwrap();
//! let result = replica.put("doc-1", "", Some(json!({"name": "Alice"}))).unwrap();
//! assert_eq!(result.revision.serialize(), format!("{}:1", replica.replica_uid()));
//!
//! let doc = replica.get("doc-1", false).unwrap().unwrap();
//! assert_eq!(doc.body, Some(json!({"name": "Alice"})));
//! ```

pub mod backend;
pub mod clock;
pub mod conflict;
pub mod document;
pub mod error;
pub mod exchange;
pub mod ids;
pub mod log;
pub mod orchestrator;
pub mod replica;
pub mod state_machine;
pub mod sync_state;
pub mod sync_target;

pub use backend::{MemoryBackend, StorageBackend, StorageTxn, StoredDocument};
pub use clock::{ClockOrdering, VectorClock};
pub use conflict::ConflictEntry;
pub use document::Document;
pub use error::{Error, Result};
pub use exchange::{DocWire, SyncExchange};
pub use log::{ChangeEntry, LogEntry};
pub use orchestrator::SyncOutcome;
pub use replica::Replica;
pub use state_machine::{Attribution, DeleteResult, PutOutcome, PutResult, ResolveResult};
pub use sync_state::SyncWatermark;
pub use sync_target::{
    LocalSyncTarget, SyncExchangeRequest, SyncExchangeResponse, SyncExchangeSession, SyncInfo,
    SyncTarget, TraceHook,
};
