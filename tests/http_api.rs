//! HTTP front-end tests driven through the router without binding a socket
//!
//! Run with: cargo test --test http_api

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::tempdir;
use tower::ServiceExt;

use chronicle::config::ChronicleConfig;
use chronicle::remote::{Collaborators, DisabledSummarizer, MemoryRemote};
use chronicle::server::ChronicleServer;
use chronicle::session::SessionManager;

fn app(remote: &MemoryRemote) -> (SessionManager, Router) {
    let collaborators = Collaborators::in_memory(remote.clone(), Arc::new(DisabledSummarizer));
    let manager = SessionManager::new(collaborators, ChronicleConfig::default());
    let router = ChronicleServer::router(manager.clone());
    (manager, router)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn form(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/start")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

fn json_start(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/start")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let (_manager, router) = app(&MemoryRemote::new());

    let (status, body) = send(
        &router,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn test_missing_parameters_is_bad_request() {
    let (manager, router) = app(&MemoryRemote::new());

    let (status, body) = send(&router, form("repoName=notes".to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("missing parameter"));
    assert!(manager.is_empty());
}

#[tokio::test]
async fn test_missing_repository_is_not_found() {
    let dir = tempdir().unwrap();
    let (_manager, router) = app(&MemoryRemote::new());

    let (status, _) = send(
        &router,
        json_start(json!({
            "directoryPath": dir.path(),
            "repoId": "absent",
            "repoAction": "use-existing",
            "visibility": "private",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_form_start_list_and_stop() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
    let remote = MemoryRemote::new();
    let (manager, router) = app(&remote);

    let folder = dir.path().display().to_string();
    let body = format!(
        "folderToMonitor={}&repoName=notes&repoAction=create&repoVisibility=private&pushAllData=on",
        folder.replace('/', "%2F")
    );
    let (status, body) = send(&router, form(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().starts_with("Monitoring "));
    assert!(remote.has_repo("notes"));
    assert_eq!(remote.file("notes", "a.txt").as_deref(), Some("hello"));
    assert_eq!(manager.len(), 1);

    let id = body["session"]["id"].as_str().unwrap().to_string();

    let (status, sessions) = send(
        &router,
        Request::builder().uri("/sessions").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sessions.as_array().unwrap().len(), 1);
    assert_eq!(sessions[0]["repo_id"], "notes");

    let stop = || {
        Request::builder()
            .method("DELETE")
            .uri(format!("/sessions/{}", id))
            .body(Body::empty())
            .unwrap()
    };
    let (status, body) = send(&router, stop()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stopped"], id.as_str());
    assert!(manager.is_empty());

    let (status, _) = send(&router, stop()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
