//! Sync endpoint routes: the §6.4 wire protocol over this server's one
//! `Replica<PgBackend>`.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use replikit_engine::{LocalSyncTarget, SyncExchangeRequest, SyncExchangeResponse, SyncInfo, SyncTarget};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync/{replica_uid}", post(sync_exchange_handler))
        .route("/sync/{replica_uid}/info", get(get_sync_info_handler))
        .route("/sync/{replica_uid}/record", post(record_sync_info_handler))
}

/// Every handler below addresses this server's own replica by path, so
/// a mismatched `replica_uid` means the client has the wrong peer.
fn check_replica_uid(state: &AppState, replica_uid: &str) -> Result<()> {
    if state.replica.replica_uid() != replica_uid {
        return Err(AppError::NotFound(format!("no such replica: {replica_uid}")));
    }
    Ok(())
}

/// POST /sync/{replica_uid} - one full sync-exchange round trip (§4.6).
async fn sync_exchange_handler(
    State(state): State<AppState>,
    Path(replica_uid): Path<String>,
    _auth: AuthUser,
    Json(request): Json<SyncExchangeRequest>,
) -> Result<Json<SyncExchangeResponse>> {
    check_replica_uid(&state, &replica_uid)?;
    let replica = state.replica.clone();
    let response = tokio::task::spawn_blocking(move || {
        let target = LocalSyncTarget::new(replica.backend(), replica.replica_uid().to_string());
        target.sync_exchange_doc_ids(request)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(response))
}

#[derive(Deserialize)]
struct GetSyncInfoQuery {
    source_uid: String,
}

/// GET /sync/{replica_uid}/info?source_uid=... - this replica's view of
/// `source_uid` (§4.8 `get_sync_info`).
async fn get_sync_info_handler(
    State(state): State<AppState>,
    Path(replica_uid): Path<String>,
    Query(query): Query<GetSyncInfoQuery>,
    _auth: AuthUser,
) -> Result<Json<SyncInfo>> {
    check_replica_uid(&state, &replica_uid)?;
    let replica = state.replica.clone();
    let info = tokio::task::spawn_blocking(move || {
        let target = LocalSyncTarget::new(replica.backend(), replica.replica_uid().to_string());
        target.get_sync_info(&query.source_uid)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(info))
}

#[derive(Deserialize)]
struct RecordSyncInfoBody {
    source_uid: String,
    source_gen: u64,
    source_trans_id: String,
}

/// POST /sync/{replica_uid}/record - record that `source_uid` has fully
/// integrated this replica up to (source_gen, source_trans_id) (§4.8
/// `record_sync_info`).
async fn record_sync_info_handler(
    State(state): State<AppState>,
    Path(replica_uid): Path<String>,
    _auth: AuthUser,
    Json(body): Json<RecordSyncInfoBody>,
) -> Result<Json<serde_json::Value>> {
    check_replica_uid(&state, &replica_uid)?;
    let replica = state.replica.clone();
    tokio::task::spawn_blocking(move || {
        let target = LocalSyncTarget::new(replica.backend(), replica.replica_uid().to_string());
        target.record_sync_info(&body.source_uid, body.source_gen, &body.source_trans_id)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(serde_json::json!({"ok": true})))
}
