//! Remote toolkit against a local streamable HTTP tool server.

mod common;

use agentexec_core::error::RemoteToolError;
use agentexec_core::tool::ToolContext;
use agentexec_remote::{RemoteSettings, RemoteToolkit, ToolFilter};
use axum::Router;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Json;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// ── Mock server ──────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct ServerState {
    token: Option<&'static str>,
    released: Arc<AtomicUsize>,
}

async fn rpc(State(state): State<ServerState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Some(token) = state.token {
        let expected = format!("Bearer {token}");
        let presented = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let method = body["method"].as_str().unwrap_or_default().to_string();
    if method != "initialize" {
        let session = headers.get("mcp-session-id").and_then(|v| v.to_str().ok());
        assert_eq!(session, Some("session-1"), "{method} sent without session id");
    }

    let Some(reply) = common::reply(&body) else {
        return StatusCode::ACCEPTED.into_response();
    };

    let mut response = if method == "tools/call" {
        (
            [(CONTENT_TYPE, "text/event-stream")],
            format!("event: message\ndata: {reply}\n\n"),
        )
            .into_response()
    } else {
        Json(reply).into_response()
    };
    if method == "initialize" {
        response
            .headers_mut()
            .insert("mcp-session-id", HeaderValue::from_static("session-1"));
    }
    response
}

async fn release(State(state): State<ServerState>) -> StatusCode {
    state.released.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn start(path: &str, state: ServerState) -> String {
    let router = Router::new()
        .route(path, post(rpc).delete(release))
        .with_state(state);
    common::serve(router).await
}

fn servers(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
    entries
        .iter()
        .map(|(alias, config)| (alias.to_string(), config.clone()))
        .collect()
}

fn ctx() -> ToolContext {
    ToolContext::new("u1", "agent-1")
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn allow_list_keeps_only_send_mail() {
    let state = ServerState {
        token: Some("secret"),
        ..Default::default()
    };
    let base = start("/mcp/stream", state.clone()).await;
    let config = servers(&[("mail", json!({"url": base, "token": "secret"}))]);

    let toolkit = RemoteToolkit::connect(
        &config,
        &ToolFilter::from_names(["send_mail"]),
        &RemoteSettings::default(),
    )
    .await;

    assert!(toolkit.failures().is_empty(), "{:?}", toolkit.failures());
    let names: Vec<&str> = toolkit.tools().iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["send_mail"]);

    let result = toolkit.tools()[0]
        .execute(&ctx(), json!({"to": "bob@example.com"}))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.output, "sent to bob@example.com");

    toolkit.shutdown().await;
    assert_eq!(state.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retries_alternate_path_after_not_found() {
    let base = start("/mcp", ServerState::default()).await;
    let config = servers(&[("calc", json!({"transport": "streamable-http", "url": base}))]);

    let toolkit =
        RemoteToolkit::connect(&config, &ToolFilter::default(), &RemoteSettings::default()).await;

    assert!(toolkit.failures().is_empty(), "{:?}", toolkit.failures());
    assert_eq!(toolkit.tools().len(), 3);

    let add = toolkit.tools().iter().find(|t| t.name() == "add").unwrap();
    let result = add.execute(&ctx(), json!({"a": 1, "b": 2})).await.unwrap();
    assert_eq!(result.output, "3");
    assert_eq!(result.data, Some(json!({"sum": 3.0})));
    toolkit.shutdown().await;
}

#[tokio::test]
async fn one_failing_server_does_not_hide_the_others() {
    let locked = start(
        "/mcp/stream",
        ServerState {
            token: Some("secret"),
            ..Default::default()
        },
    )
    .await;
    let open = start("/mcp/stream", ServerState::default()).await;
    let config = servers(&[
        ("locked", json!({"url": locked})),
        ("open", json!({"url": open})),
        ("dead", json!({"url": "http://127.0.0.1:1", "connect_timeout": 2})),
    ]);

    let toolkit = RemoteToolkit::connect(
        &config,
        &ToolFilter::from_names(["calculator"]),
        &RemoteSettings::default(),
    )
    .await;

    let names: Vec<&str> = toolkit.tools().iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["add"]);
    assert_eq!(toolkit.failures().len(), 2);
    assert!(toolkit.failures().iter().any(|e| matches!(
        e,
        RemoteToolError::Http { alias, status: 401 } if alias == "locked"
    )));
    assert!(
        toolkit
            .failures()
            .iter()
            .any(|e| e.alias() == Some("dead"))
    );
    toolkit.shutdown().await;
}

#[tokio::test]
async fn remote_error_result_is_an_unsuccessful_tool_result() {
    let base = start("/mcp/stream", ServerState::default()).await;
    let config = servers(&[("mail", json!({"url": base}))]);
    let toolkit = RemoteToolkit::connect(
        &config,
        &ToolFilter::from_names(["read_mail"]),
        &RemoteSettings::default(),
    )
    .await;

    let result = toolkit.tools()[0].execute(&ctx(), json!({})).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.output, "mailbox locked");

    let err = toolkit.tools()[0]
        .execute(&ctx(), json!("not an object"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("expects an object argument"));
    toolkit.shutdown().await;
}

#[tokio::test]
async fn unmatched_allow_list_is_reported() {
    let base = start("/mcp/stream", ServerState::default()).await;
    let config = servers(&[("mail", json!({"url": base}))]);
    let toolkit = RemoteToolkit::connect(
        &config,
        &ToolFilter::from_names(["translate"]),
        &RemoteSettings::default(),
    )
    .await;

    assert!(toolkit.is_empty());
    assert!(matches!(toolkit.failures(), [RemoteToolError::NoToolsMatched]));
    toolkit.shutdown().await;
}
