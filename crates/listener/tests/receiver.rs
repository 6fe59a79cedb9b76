//! End-to-end tests: HTTP request → pipeline → real child process.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use launcher::{PayloadDelivery, ProcessLauncher};
use listener::{router, ReceiverState, DEFAULT_MAX_BODY_BYTES};
use pipeline::{ConfigStore, HookConvention, HookPipeline, RequestParser};
use tempfile::TempDir;
use tower::ServiceExt;

fn app(config: &str, convention: HookConvention) -> Router {
    let store = ConfigStore::from_yaml_str(config).expect("valid config");
    let pipeline = HookPipeline::new(
        Arc::new(store),
        RequestParser::new(convention),
        Arc::new(ProcessLauncher::new(PayloadDelivery::Stdin, None)),
    );
    router(ReceiverState::new(pipeline, DEFAULT_MAX_BODY_BYTES))
}

fn hook(body: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-length", body.len().to_string());
    if let Some(token) = token {
        builder = builder.header("X-Gitlab-Token", token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Config whose single project touches `marker` after `delay` seconds.
fn marker_config(marker: &Path, delay: &str, background: bool) -> String {
    format!(
        r#"
proj-a:
  command: ["/bin/sh", "-c", "sleep {delay}; echo ran >> '{}'"]
  secret: s3cr3t
  background: {background}
"#,
        marker.display()
    )
}

async fn eventually_exists(path: &Path) -> bool {
    for _ in 0..100 {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn echo_hi_in_foreground_succeeds() {
    let app = app(
        "proj-a:\n  command: echo hi\n  secret: s3cr3t\n  background: false\n",
        HookConvention::gitlab(),
    );
    let response = app
        .oneshot(hook(r#"{"project":{"name":"proj-a"}}"#, Some("s3cr3t")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn foreground_responds_after_command_exits() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("marker");
    let app = app(&marker_config(&marker, "0.3", false), HookConvention::gitlab());

    let response = app
        .oneshot(hook(r#"{"project":{"name":"proj-a"}}"#, Some("s3cr3t")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(std::fs::read_to_string(&marker).unwrap(), "ran\n");
}

#[tokio::test]
async fn background_responds_before_command_exits() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("marker");
    let app = app(&marker_config(&marker, "0.5", true), HookConvention::gitlab());

    let response = app
        .oneshot(hook(r#"{"project":{"name":"proj-a"}}"#, Some("s3cr3t")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!marker.exists());
    assert!(eventually_exists(&marker).await);
}

#[tokio::test]
async fn wrong_token_spawns_nothing() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("marker");
    let app = app(&marker_config(&marker, "0", false), HookConvention::gitlab());

    let response = app
        .oneshot(hook(r#"{"project":{"name":"proj-a"}}"#, Some("wrong")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!marker.exists());
}

#[tokio::test]
async fn unknown_project_spawns_nothing() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("marker");
    let app = app(&marker_config(&marker, "0", false), HookConvention::gitlab());

    let response = app
        .oneshot(hook(r#"{"project":{"name":"proj-b"}}"#, Some("s3cr3t")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!marker.exists());
}

#[tokio::test]
async fn empty_body_is_rejected() {
    let app = app(
        "proj-a:\n  command: echo hi\n  secret: s3cr3t\n",
        HookConvention::gitlab(),
    );
    let response = app.oneshot(hook("", Some("s3cr3t"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn missing_executable_is_a_server_error() {
    let app = app(
        "proj-a:\n  command: /nonexistent/deploy\n  secret: s3cr3t\n  background: false\n",
        HookConvention::gitlab(),
    );
    let response = app
        .clone()
        .oneshot(hook(r#"{"project":{"name":"proj-a"}}"#, Some("s3cr3t")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // The receiver keeps serving after a launch failure.
    let response = app
        .oneshot(hook(r#"{"project":{"name":"proj-a"}}"#, Some("wrong")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn gitea_token_in_payload_and_payload_on_stdin() {
    let dir = TempDir::new().unwrap();
    let captured = dir.path().join("payload.json");
    let config = format!(
        r#"
"https://git.example/org/repo":
  command: ["/bin/sh", "-c", "cat > '{}'"]
  secret: s3cr3t
  background: false
"#,
        captured.display()
    );
    let app = app(&config, HookConvention::gitea());
    let body = r#"{"secret":"s3cr3t","repository":{"html_url":"https://git.example/org/repo"}}"#;

    let response = app.oneshot(hook(body, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(std::fs::read_to_string(&captured).unwrap(), body);
}

#[tokio::test]
async fn foreground_timeout_is_a_server_error() {
    let app = app(
        "proj-a:\n  command: sleep 5\n  secret: s3cr3t\n  background: false\n  timeout_secs: 1\n",
        HookConvention::gitlab(),
    );
    let started = std::time::Instant::now();
    let response = app
        .oneshot(hook(r#"{"project":{"name":"proj-a"}}"#, Some("s3cr3t")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(started.elapsed() < Duration::from_secs(4));
}
