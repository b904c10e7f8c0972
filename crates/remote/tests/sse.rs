//! Remote toolkit against a local SSE tool server.

mod common;

use agentexec_core::tool::ToolContext;
use agentexec_remote::{RemoteSettings, RemoteToolkit, ToolFilter};
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use futures::Stream;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ── Mock server ──────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Outbox(Arc<Mutex<Option<mpsc::UnboundedSender<Event>>>>);

async fn open_stream(State(outbox): State<Outbox>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(Event::default().event("endpoint").data("/messages?session_id=abc"))
        .unwrap();
    *outbox.0.lock().unwrap() = Some(tx);

    let events = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    });
    Sse::new(events)
}

async fn receive(State(outbox): State<Outbox>, Json(body): Json<Value>) -> StatusCode {
    if let Some(reply) = common::reply(&body) {
        let sender = outbox.0.lock().unwrap().clone();
        if let Some(tx) = sender {
            let _ = tx.send(Event::default().event("message").data(reply.to_string()));
        }
    }
    StatusCode::ACCEPTED
}

/// Accepts the stream but never announces an endpoint.
async fn silent_stream() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(futures::stream::pending::<Result<Event, Infallible>>())
}

async fn start(stream_path: &str) -> String {
    let router = Router::new()
        .route(stream_path, get(open_stream))
        .route("/messages", post(receive))
        .with_state(Outbox::default());
    common::serve(router).await
}

fn ctx() -> ToolContext {
    ToolContext::new("u1", "agent-1")
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn lists_and_calls_tools_over_sse() {
    let base = start("/mcp/sse").await;
    let mut servers = BTreeMap::new();
    servers.insert("events".to_string(), json!({"url": format!("{base}/mcp/sse")}));

    let toolkit = RemoteToolkit::connect(
        &servers,
        &ToolFilter::from_names(["math"]),
        &RemoteSettings::default(),
    )
    .await;

    assert!(toolkit.failures().is_empty(), "{:?}", toolkit.failures());
    let names: Vec<&str> = toolkit.tools().iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["add"]);

    let result = toolkit.tools()[0]
        .execute(&ctx(), json!({"a": 2, "b": 5}))
        .await
        .unwrap();
    assert_eq!(result.output, "7");
    assert_eq!(toolkit.tools()[0].metadata()["server"], "events");
    toolkit.shutdown().await;
}

#[tokio::test]
async fn sse_falls_back_to_plain_sse_path() {
    let base = start("/sse").await;
    let mut servers = BTreeMap::new();
    servers.insert(
        "events".to_string(),
        json!({"transport": "sse", "url": base}),
    );

    let toolkit =
        RemoteToolkit::connect(&servers, &ToolFilter::default(), &RemoteSettings::default()).await;

    assert!(toolkit.failures().is_empty(), "{:?}", toolkit.failures());
    assert_eq!(toolkit.tools().len(), 3);
    toolkit.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn silent_server_costs_only_its_own_tools() {
    let base = common::serve(Router::new().route("/mcp/sse", get(silent_stream))).await;
    let mut servers = BTreeMap::new();
    servers.insert("quiet".to_string(), json!({"url": format!("{base}/mcp/sse")}));

    let settings = RemoteSettings::default();
    let execution_timeout = agentexec_config::ExecutionConfig::default().timeout();
    let started = tokio::time::Instant::now();
    let toolkit = RemoteToolkit::connect(&servers, &ToolFilter::default(), &settings).await;

    assert!(started.elapsed() < settings.discovery_budget + Duration::from_secs(1));
    assert!(started.elapsed() < execution_timeout);
    assert!(toolkit.tools().is_empty());
    assert!(matches!(
        toolkit.failures(),
        [agentexec_core::error::RemoteToolError::Timeout { alias }] if alias == "quiet"
    ));
    toolkit.shutdown().await;
}
