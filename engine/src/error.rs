//! Error taxonomy for the replication engine.
//!
//! Every variant corresponds to one of the stable error codes named by
//! the external interface: invalid_parameter, invalid_doc_id,
//! invalid_json, revision_conflict, conflicted, document_already_deleted,
//! document_does_not_exist, invalid_generation, invalid_transaction_id,
//! broken_sync_stream, invalid_http_response, not_implemented, nomem,
//! internal_error.

use thiserror::Error;

/// Result type used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid document id: {0}")]
    InvalidDocId(String),

    #[error("invalid json: {0}")]
    InvalidJson(String),

    #[error("revision conflict")]
    RevisionConflict,

    #[error("document has unresolved conflicts")]
    Conflicted,

    #[error("document already deleted")]
    DocumentAlreadyDeleted,

    #[error("document does not exist")]
    DocumentDoesNotExist,

    #[error("invalid generation")]
    InvalidGeneration,

    #[error("invalid transaction id")]
    InvalidTransactionId,

    #[error("broken sync stream: {0}")]
    BrokenSyncStream(String),

    #[error("invalid http response: {0}")]
    InvalidHttpResponse(String),

    /// An optional trait method a `StorageBackend` or `SyncTarget`
    /// implementor chose not to support.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Surfaced by backend implementors that want to report allocator
    /// exhaustion through this taxonomy rather than panicking.
    #[error("out of memory")]
    Nomem,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The stable error code string, as named in the external interface.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidParameter(_) => "invalid_parameter",
            Error::InvalidDocId(_) => "invalid_doc_id",
            Error::InvalidJson(_) => "invalid_json",
            Error::RevisionConflict => "revision_conflict",
            Error::Conflicted => "conflicted",
            Error::DocumentAlreadyDeleted => "document_already_deleted",
            Error::DocumentDoesNotExist => "document_does_not_exist",
            Error::InvalidGeneration => "invalid_generation",
            Error::InvalidTransactionId => "invalid_transaction_id",
            Error::BrokenSyncStream(_) => "broken_sync_stream",
            Error::InvalidHttpResponse(_) => "invalid_http_response",
            Error::NotImplemented(_) => "not_implemented",
            Error::Nomem => "nomem",
            Error::Internal(_) => "internal_error",
        }
    }
}
