//! Read API over in-memory and SQLite stores.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use stats::{create_router, AppState};
use store::{
    EventStore, InsertReport, MemoryStore, MinuteCount, RepoCount, SqliteStore, StoreError,
};
use tower::ServiceExt;
use types::event::Event;

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

fn event(id: usize, kind: &str, login: &str, repo: &str, minute: u32, size: u64) -> Event {
    Event::parse_line(&format!(
        r#"{{"id":"{id}","type":"{kind}","actor":{{"login":"{login}"}},"repo":{{"name":"{repo}"}},"payload":{{"size":{size}}},"created_at":"2024-01-01T15:{minute:02}:30Z"}}"#
    ))
    .unwrap()
}

#[tokio::test]
async fn test_overview_on_empty_store_is_all_zero() {
    let app = create_router(AppState::new(Arc::new(MemoryStore::new())));
    let (status, body) = get(app, "/api/overview").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "total_events": 0, "total_users": 0, "total_commits": 0 })
    );
}

#[tokio::test]
async fn test_aggregates_over_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("events.db")).unwrap();
    store
        .insert_many(&[
            event(1, "PushEvent", "alice", "rust-lang/rust", 4, 3),
            event(2, "PushEvent", "bob", "rust-lang/rust", 4, 1),
            event(3, "IssuesEvent", "alice", "tokio-rs/tokio", 17, 0),
        ])
        .await
        .unwrap();
    let app = create_router(AppState::new(Arc::new(store)));

    let (_, overview) = get(app.clone(), "/api/overview").await;
    assert_eq!(
        overview,
        json!({ "total_events": 3, "total_users": 2, "total_commits": 4 })
    );

    let (_, top) = get(app.clone(), "/api/top-repos").await;
    assert_eq!(
        top,
        json!([
            { "_id": "rust-lang/rust", "count": 2 },
            { "_id": "tokio-rs/tokio", "count": 1 }
        ])
    );

    let (_, activity) = get(app, "/api/activity").await;
    assert_eq!(
        activity,
        json!([{ "_id": 4, "count": 2 }, { "_id": 17, "count": 1 }])
    );
}

#[tokio::test]
async fn test_top_repos_at_most_ten_descending() {
    let store = MemoryStore::new();
    let mut events = Vec::new();
    let mut id = 0;
    for repo in 0..14usize {
        for _ in 0..(repo % 5 + 1) {
            events.push(event(id, "WatchEvent", "viewer", &format!("o/r{repo}"), 0, 0));
            id += 1;
        }
    }
    store.insert_many(&events).await.unwrap();
    let app = create_router(AppState::new(Arc::new(store)));

    let (_, body) = get(app, "/api/top-repos").await;
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 10);
    let counts: Vec<u64> = rows.iter().map(|r| r["count"].as_u64().unwrap()).collect();
    assert!(counts.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(counts[0], 5);
}

struct BrokenStore;

#[async_trait]
impl EventStore for BrokenStore {
    async fn insert_many(&self, _events: &[Event]) -> Result<InsertReport, StoreError> {
        Err(StoreError::Unavailable("down".into()))
    }
    async fn count_events(&self) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("secret connection detail".into()))
    }
    async fn distinct_actor_count(&self) -> Result<u64, StoreError> {
        Ok(0)
    }
    async fn total_commits(&self) -> Result<u64, StoreError> {
        Ok(0)
    }
    async fn top_repos(&self, _limit: usize) -> Result<Vec<RepoCount>, StoreError> {
        Err(StoreError::Unavailable("down".into()))
    }
    async fn activity_by_minute(&self) -> Result<Vec<MinuteCount>, StoreError> {
        Err(StoreError::Unavailable("down".into()))
    }
}

#[tokio::test]
async fn test_query_failure_returns_generic_500() {
    let app = create_router(AppState::new(Arc::new(BrokenStore)));

    let (status, body) = get(app.clone(), "/api/overview").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Failed to fetch overview" }));

    let (status, body) = get(app.clone(), "/api/top-repos").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Failed to fetch top repos" }));

    let (status, body) = get(app, "/api/activity").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Failed to fetch activity" }));
}

#[tokio::test]
async fn test_health_and_unknown_route() {
    let app = create_router(AppState::new(Arc::new(MemoryStore::new())));

    let (status, body) = get(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "stats");

    let (status, body) = get(app, "/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let app = create_router(AppState::new(Arc::new(MemoryStore::new())));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/overview")
                .header(header::ORIGIN, "http://dashboard.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}
