use std::sync::Arc;

use axum::http::StatusCode;
use catalyst_core::config::Config;
use catalyst_core::pool::DispatchMode;
use catalyst_core::reaction::{NewReaction, Reaction};
use catalyst_core::store::{MemoryStore, ReactionStore};
use catalyst_core::Engine;
use http_body_util::BodyExt;
use mockito::Matcher;
use serde_json::json;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// RFC 3339 timestamp `minute` minutes into the fixture day.
fn timestamp(minute: u32) -> String {
    format!("2025-01-01T00:{minute:02}:00Z")
}

fn webhook_reaction(id: &str, minute: u32, trigger: serde_json::Value, action: &str, data: serde_json::Value) -> Reaction {
    serde_json::from_value(json!({
        "id": id,
        "name": id,
        "trigger": "webhook",
        "triggerData": trigger,
        "action": action,
        "actionData": data,
        "created": timestamp(minute),
        "updated": timestamp(minute),
    }))
    .unwrap()
}

fn engine_with(reactions: Vec<Reaction>) -> Arc<Engine> {
    let store = MemoryStore::new();
    for r in &reactions {
        store.insert(r).unwrap();
    }
    let mut config = Config::default();
    config.dispatch.mode = DispatchMode::Inline;
    config.api_token = Some("tok".into());
    Arc::new(Engine::new(config, Arc::new(store)))
}

/// Send a request via `oneshot` and return (status, content type, body text).
async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Vec<u8>,
) -> (StatusCode, String, String) {
    let mut req = axum::http::Request::builder().method(method).uri(uri);
    for (k, v) in headers {
        req = req.header(*k, *v);
    }
    let req = req.body(axum::body::Body::from(body)).unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, String::from_utf8_lossy(&body).into_owned())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_path_is_404() {
    let app = catalyst_server::build_router(engine_with(vec![]));
    let (status, _, body) = send(app, "GET", "/reaction/nothing-here", &[], vec![]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "reaction not found");
}

#[tokio::test]
async fn token_is_required_when_configured() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/relay")
        .with_status(200)
        .with_body("relayed")
        .expect(1)
        .create_async()
        .await;

    let engine = engine_with(vec![webhook_reaction(
        "r1",
        0,
        json!({"token": "secret", "path": "ingest"}),
        "webhook",
        json!({"url": format!("{}/relay", server.url())}),
    )]);
    let app = catalyst_server::build_router(engine);

    let (status, _, body) = send(app.clone(), "POST", "/reaction/ingest", &[], vec![]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "missing token");

    let (status, _, body) = send(
        app.clone(),
        "POST",
        "/reaction/ingest",
        &[("authorization", "Bearer wrong")],
        vec![],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "invalid token");

    let (status, _, body) = send(
        app,
        "POST",
        "/reaction/ingest",
        &[("authorization", "Bearer secret")],
        vec![],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "relayed");
    mock.assert_async().await;
}

#[tokio::test]
async fn relayed_status_and_body_are_replayed() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_status(201)
        .with_body("ok")
        .create_async()
        .await;

    let engine = engine_with(vec![webhook_reaction(
        "r1",
        0,
        json!({"path": "create"}),
        "webhook",
        json!({"url": server.url()}),
    )]);
    let (status, _, body) = send(
        catalyst_server::build_router(engine),
        "POST",
        "/reaction/create",
        &[],
        b"{}".to_vec(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn request_is_forwarded_as_envelope() {
    let mut server = mockito::Server::new_async().await;
    let text = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({
            "method": "POST",
            "path": "/reaction/in",
            "query": {"a": ["1"]},
            "body": "hello",
            "isBase64Encoded": false
        })))
        .with_status(200)
        .create_async()
        .await;

    let engine = engine_with(vec![webhook_reaction(
        "r1",
        0,
        json!({"path": "in"}),
        "webhook",
        json!({"url": server.url()}),
    )]);
    let app = catalyst_server::build_router(engine);
    let (status, _, _) = send(app, "POST", "/reaction/in?a=1", &[], b"hello".to_vec()).await;
    assert_eq!(status, StatusCode::OK);
    text.assert_async().await;
}

#[tokio::test]
async fn binary_request_body_is_base64_encoded() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({
            "body": "aIBp",
            "isBase64Encoded": true
        })))
        .with_status(204)
        .create_async()
        .await;

    let engine = engine_with(vec![webhook_reaction(
        "r1",
        0,
        json!({"path": "bin"}),
        "webhook",
        json!({"url": server.url()}),
    )]);
    let app = catalyst_server::build_router(engine);
    let (status, _, _) = send(app, "PUT", "/reaction/bin", &[], vec![b'h', 0x80, b'i']).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    mock.assert_async().await;
}

#[tokio::test]
async fn earliest_created_duplicate_path_wins() {
    let mut server = mockito::Server::new_async().await;
    let first = server.mock("POST", "/first").expect(1).create_async().await;
    let second = server.mock("POST", "/second").expect(0).create_async().await;

    let engine = engine_with(vec![
        webhook_reaction("b", 2, json!({"path": "dup"}), "webhook", json!({"url": format!("{}/second", server.url())})),
        webhook_reaction("a", 1, json!({"path": "dup"}), "webhook", json!({"url": format!("{}/first", server.url())})),
    ]);
    let app = catalyst_server::build_router(engine);
    let (status, _, _) = send(app, "GET", "/reaction/dup", &[], vec![]).await;
    assert_eq!(status, StatusCode::OK);
    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn percent_encoded_path_is_decoded_for_lookup() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/").with_status(200).create_async().await;

    let engine = engine_with(vec![webhook_reaction(
        "r1",
        0,
        json!({"path": "alerts/high priority"}),
        "webhook",
        json!({"url": server.url()}),
    )]);
    let app = catalyst_server::build_router(engine);
    let (status, _, _) = send(app, "POST", "/reaction/alerts/high%20priority", &[], vec![]).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn action_failure_is_500_with_error_text() {
    let engine = engine_with(vec![webhook_reaction(
        "r1",
        0,
        json!({"path": "broken"}),
        "shell",
        json!({}),
    )]);
    let app = catalyst_server::build_router(engine);
    let (status, content_type, body) = send(app, "POST", "/reaction/broken", &[], vec![]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(content_type.starts_with("text/plain"));
    assert_eq!(body, r#"action "shell" not found"#);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let store = MemoryStore::new();
    store
        .insert(&webhook_reaction("r1", 0, json!({"path": "small"}), "webhook", json!({"url": "http://127.0.0.1:9/"})))
        .unwrap();
    let mut config = Config::default();
    config.dispatch.mode = DispatchMode::Inline;
    config.max_body_bytes = 4;
    let app = catalyst_server::build_router(Arc::new(Engine::new(config, Arc::new(store))));

    let (status, _, _) = send(app, "POST", "/reaction/small", &[], b"too large".to_vec()).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn python_plain_output_is_text() {
    let interpreters = Config::default().python.interpreters;
    if catalyst_core::action::python::find_interpreter(&interpreters).is_err() {
        return;
    }
    let engine = engine_with(vec![webhook_reaction(
        "r1",
        0,
        json!({"path": "py"}),
        "python",
        json!({"script": "import sys, json\nreq = json.loads(sys.argv[1])\nprint(req['method'], end='')"}),
    )]);
    let app = catalyst_server::build_router(engine);
    let (status, content_type, body) = send(app, "PATCH", "/reaction/py", &[], vec![]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "text/plain");
    assert_eq!(body, "PATCH");
}

#[tokio::test]
async fn reactions_created_through_the_service_are_reachable() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/").with_status(200).with_body("hi").create_async().await;

    let engine = engine_with(vec![]);
    engine
        .service()
        .create(
            &catalyst_core::bus::EventContext::anonymous(),
            NewReaction {
                name: "live".into(),
                trigger: "webhook".into(),
                trigger_data: json!({"path": "live"}),
                action: "webhook".into(),
                action_data: json!({"url": server.url()}),
            },
        )
        .await
        .unwrap();

    let app = catalyst_server::build_router(engine);
    let (status, _, body) = send(app, "POST", "/reaction/live", &[], vec![]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "hi");
}

#[tokio::test]
async fn reactions_in_the_database_are_served() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/").with_status(200).with_body("stored").create_async().await;

    let dir = tempfile::TempDir::new().unwrap();
    let db = catalyst_core::db::ReactionDb::open(&dir.path().join("reactions.redb")).unwrap();
    db.insert(&webhook_reaction(
        "r1",
        0,
        json!({"path": "persisted"}),
        "webhook",
        json!({"url": server.url()}),
    ))
    .unwrap();

    let mut config = Config::default();
    config.dispatch.mode = DispatchMode::Inline;
    let app = catalyst_server::build_router(Arc::new(Engine::new(config, Arc::new(db))));
    let (status, _, body) = send(app, "GET", "/reaction/persisted", &[], vec![]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "stored");
}
