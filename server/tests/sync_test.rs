//! Integration tests for the document CRUD and sync HTTP surface.
//!
//! These drive two real in-process `replikit-server` routers against
//! each other over HTTP, each backed by its own Postgres schema inside
//! the database at `DATABASE_URL` so the two replicas are genuinely
//! independent. Skipped (not failed) when `DATABASE_URL` is unset.

use replikit_server::config::Config;
use replikit_server::{build_router, AppState};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::Executor;
use std::net::SocketAddr;

/// Spins up one in-process server against a fresh, isolated schema.
/// Returns its base URL and the `AppState` (for the replica_uid).
async fn spawn_server(schema: &str) -> Option<(String, AppState)> {
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let bootstrap = PgPoolOptions::new().max_connections(1).connect(&database_url).await.unwrap();
    bootstrap
        .execute(format!("DROP SCHEMA IF EXISTS {schema} CASCADE").as_str())
        .await
        .unwrap();
    bootstrap
        .execute(format!("CREATE SCHEMA {schema}").as_str())
        .await
        .unwrap();
    drop(bootstrap);

    let schema_owned = schema.to_string();
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .after_connect(move |conn, _meta| {
            let schema = schema_owned.clone();
            Box::pin(async move {
                conn.execute(format!("SET search_path TO {schema}").as_str()).await?;
                Ok(())
            })
        })
        .connect(&database_url)
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let config = Config {
        host: "127.0.0.1".into(),
        port: 0,
        database_url,
        auth_secret: None,
    };
    let state = replikit_server::db::PgBackend::new(pool);
    let replica = tokio::task::spawn_blocking(move || replikit_engine::Replica::open(state))
        .await
        .unwrap()
        .unwrap();
    let state = AppState {
        replica: std::sync::Arc::new(replica),
        config: std::sync::Arc::new(config),
    };

    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Some((format!("http://{addr}"), state))
}

#[tokio::test]
async fn documents_crud_roundtrip_over_http() {
    let Some((base_url, _state)) = spawn_server("test_documents_crud").await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };
    let client = reqwest::Client::new();

    let put: Value = client
        .put(format!("{base_url}/documents/doc-1"))
        .json(&json!({"expectedRevision": "", "body": {"name": "Alice"}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let revision = put["revision"].as_str().unwrap().to_string();
    assert!(!revision.is_empty());

    let got: Value = client
        .get(format!("{base_url}/documents/doc-1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(got["body"], json!({"name": "Alice"}));
    assert_eq!(got["hasConflicts"], json!(false));

    let list: Value = client
        .get(format!("{base_url}/documents"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["documents"].as_array().unwrap().len(), 1);

    let delete_resp = client
        .delete(format!("{base_url}/documents/doc-1?revision={revision}"))
        .send()
        .await
        .unwrap();
    assert!(delete_resp.status().is_success());

    let not_found = client.get(format!("{base_url}/documents/doc-1")).send().await.unwrap();
    assert_eq!(not_found.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn put_with_stale_revision_returns_conflict_status() {
    let Some((base_url, _state)) = spawn_server("test_documents_conflict").await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };
    let client = reqwest::Client::new();

    client
        .put(format!("{base_url}/documents/doc-1"))
        .json(&json!({"expectedRevision": "", "body": {"n": 1}}))
        .send()
        .await
        .unwrap();

    let resp = client
        .put(format!("{base_url}/documents/doc-1"))
        .json(&json!({"expectedRevision": "", "body": {"n": 2}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CONFLICT);
}

#[tokio::test]
async fn sync_exchange_propagates_a_document_between_two_servers() {
    let Some((url_a, state_a)) = spawn_server("test_sync_a").await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };
    let Some((url_b, state_b)) = spawn_server("test_sync_b").await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };
    let client = reqwest::Client::new();

    client
        .put(format!("{url_a}/documents/shared-doc"))
        .json(&json!({"expectedRevision": "", "body": {"from": "a"}}))
        .send()
        .await
        .unwrap();

    // A's replica drives a real sync against B's HTTP surface.
    let target_b = replikit_server::HttpSyncTarget::new(url_b.clone(), state_b.replica.replica_uid().to_string());
    let replica_a = state_a.replica.clone();
    tokio::task::spawn_blocking(move || replica_a.sync(&target_b))
        .await
        .unwrap()
        .unwrap();

    let got: Value = client
        .get(format!("{url_b}/documents/shared-doc"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(got["body"], json!({"from": "a"}));

    let info: Value = client
        .get(format!(
            "{url_b}/sync/{}/info?source_uid={}",
            state_b.replica.replica_uid(),
            state_a.replica.replica_uid()
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(info["targetGen"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn resolve_clears_conflicts_after_concurrent_sync() {
    let Some((url_a, state_a)) = spawn_server("test_resolve_a").await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };
    let Some((url_b, state_b)) = spawn_server("test_resolve_b").await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };
    let client = reqwest::Client::new();

    client
        .put(format!("{url_a}/documents/d1"))
        .json(&json!({"expectedRevision": "", "body": {"x": 1}}))
        .send()
        .await
        .unwrap();
    client
        .put(format!("{url_b}/documents/d1"))
        .json(&json!({"expectedRevision": "", "body": {"x": 2}}))
        .send()
        .await
        .unwrap();

    let target_b = replikit_server::HttpSyncTarget::new(url_b.clone(), state_b.replica.replica_uid().to_string());
    let replica_a = state_a.replica.clone();
    tokio::task::spawn_blocking(move || replica_a.sync(&target_b)).await.unwrap().unwrap();

    let conflicts: Value = client
        .get(format!("{url_a}/documents/d1/conflicts"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let revs: Vec<String> = conflicts
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["revision"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(revs.len(), 2);

    let resolved: Value = client
        .post(format!("{url_a}/documents/d1/resolve"))
        .json(&json!({"body": {"x": 3}, "supersededRevisions": revs}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resolved["hasConflicts"], json!(false));
}
