//! Document CRUD over this server's own replica (§3, Data Model) — the
//! local surface a client talks to before/after a sync exchange.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use replikit_engine::Document;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/documents", get(list_documents_handler))
        .route(
            "/documents/{doc_id}",
            get(get_document_handler)
                .put(put_document_handler)
                .delete(delete_document_handler),
        )
        .route("/documents/{doc_id}/conflicts", get(get_conflicts_handler))
        .route("/documents/{doc_id}/resolve", axum::routing::post(resolve_document_handler))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentResponse {
    doc_id: String,
    revision: String,
    body: Option<serde_json::Value>,
    has_conflicts: bool,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        DocumentResponse {
            doc_id: doc.doc_id,
            revision: doc.revision.serialize(),
            body: doc.body,
            has_conflicts: doc.has_conflicts,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetQuery {
    #[serde(default)]
    include_deleted: bool,
}

async fn get_document_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    Query(query): Query<GetQuery>,
    _auth: AuthUser,
) -> Result<Json<DocumentResponse>> {
    let replica = state.replica.clone();
    let doc = tokio::task::spawn_blocking(move || replica.get(&doc_id, query.include_deleted))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    match doc {
        Some(doc) => Ok(Json(doc.into())),
        None => Err(AppError::NotFound("document not found".into())),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    #[serde(default)]
    include_deleted: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    documents: Vec<DocumentResponse>,
    generation: u64,
}

async fn list_documents_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    _auth: AuthUser,
) -> Result<Json<ListDocumentsResponse>> {
    let replica = state.replica.clone();
    let (docs, generation) = tokio::task::spawn_blocking(move || replica.get_all(query.include_deleted))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(ListDocumentsResponse {
        documents: docs.into_iter().map(Into::into).collect(),
        generation,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutDocumentBody {
    #[serde(default)]
    expected_revision: String,
    body: Option<serde_json::Value>,
}

async fn put_document_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    _auth: AuthUser,
    Json(request): Json<PutDocumentBody>,
) -> Result<Json<DocumentResponse>> {
    let replica = state.replica.clone();
    let doc_id_for_blocking = doc_id.clone();
    let result = tokio::task::spawn_blocking(move || {
        replica.put(&doc_id_for_blocking, &request.expected_revision, request.body.clone())
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(DocumentResponse {
        doc_id,
        revision: result.revision.serialize(),
        body: None,
        has_conflicts: false,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteQuery {
    revision: String,
}

async fn delete_document_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    Query(query): Query<DeleteQuery>,
    _auth: AuthUser,
) -> Result<Json<serde_json::Value>> {
    let replica = state.replica.clone();
    let result = tokio::task::spawn_blocking(move || replica.delete(&doc_id, &query.revision))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(serde_json::json!({"revision": result.revision.serialize()})))
}

async fn get_conflicts_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    _auth: AuthUser,
) -> Result<Json<Vec<DocumentResponse>>> {
    let replica = state.replica.clone();
    let conflicts = tokio::task::spawn_blocking(move || replica.conflicts_of(&doc_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(conflicts.into_iter().map(Into::into).collect()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveDocumentBody {
    body: Option<serde_json::Value>,
    superseded_revisions: Vec<String>,
}

async fn resolve_document_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    _auth: AuthUser,
    Json(request): Json<ResolveDocumentBody>,
) -> Result<Json<serde_json::Value>> {
    let replica = state.replica.clone();
    let result = tokio::task::spawn_blocking(move || {
        replica.resolve(&doc_id, request.body.clone(), &request.superseded_revisions)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(serde_json::json!({
        "revision": result.revision.serialize(),
        "hasConflicts": result.has_conflicts,
    })))
}
