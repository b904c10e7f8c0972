//! A tiny tool server shared by the transport tests.

#![allow(dead_code)]

use serde_json::{Value, json};

pub fn tool_list() -> Value {
    json!([
        {
            "name": "send_mail",
            "description": "Send an e-mail",
            "inputSchema": {
                "type": "object",
                "properties": {"to": {"type": "string"}},
                "required": ["to"]
            }
        },
        {
            "name": "read_mail",
            "description": "Read the inbox",
            "inputSchema": {"type": "object", "properties": {}}
        },
        {
            "name": "add",
            "inputSchema": {
                "type": "object",
                "properties": {"a": {"type": "number"}, "b": {"type": "number"}}
            },
            "annotations": {"category": "math"}
        }
    ])
}

/// The JSON-RPC answer for one incoming frame; `None` for notifications.
pub fn reply(body: &Value) -> Option<Value> {
    let id = body.get("id")?.clone();
    let params = &body["params"];
    let result = match body["method"].as_str().unwrap_or_default() {
        "initialize" => json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "test-server", "version": "1.0.0"}
        }),
        "tools/list" => json!({ "tools": tool_list() }),
        "tools/call" => {
            let args = &params["arguments"];
            match params["name"].as_str().unwrap_or_default() {
                "send_mail" => json!({
                    "content": [{
                        "type": "text",
                        "text": format!("sent to {}", args["to"].as_str().unwrap_or("?"))
                    }]
                }),
                "add" => {
                    let sum = args["a"].as_f64().unwrap_or(0.0) + args["b"].as_f64().unwrap_or(0.0);
                    json!({
                        "content": [{"type": "text", "text": sum.to_string()}],
                        "structuredContent": {"sum": sum}
                    })
                }
                _ => json!({
                    "content": [{"type": "text", "text": "mailbox locked"}],
                    "isError": true
                }),
            }
        }
        _ => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": "Method not found"}
            }));
        }
    };
    Some(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
