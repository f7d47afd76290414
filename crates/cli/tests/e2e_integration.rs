//! End-to-end integration tests for the MCPAgent pipeline.
//!
//! These tests drive the façade built from `AppConfig` against in-process
//! HTTP servers: an OpenAI-compatible chat endpoint and a tool server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use mcpagent_agent::Agent;
use mcpagent_config::{AppConfig, ProviderKind};
use mcpagent_core::agent::{FailureReason, Terminal};
use mcpagent_core::message::Role;
use mcpagent_core::session::{SessionId, SessionStore};
use mcpagent_sessions::FileSessionStore;
use serde_json::{Value, json};

// ── Mock servers ─────────────────────────────────────────────────────────

async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A tool server exposing `lookup_user_data`, recording every invocation.
async fn tool_server(invocations: Arc<Mutex<Vec<Value>>>) -> String {
    let app = axum::Router::new()
        .route(
            "/tools",
            get(|| async {
                Json(json!([{
                    "type": "function",
                    "function": {
                        "name": "lookup_user_data",
                        "description": "Fetch user-specific data",
                        "parameters": {
                            "type": "object",
                            "properties": {"msisdn": {"type": "string"}},
                            "required": ["msisdn"]
                        }
                    }
                }]))
            }),
        )
        .route(
            "/tools/{name}",
            post(move |Path(name): Path<String>, Json(args): Json<Value>| {
                let invocations = invocations.clone();
                async move {
                    if name != "lookup_user_data" {
                        return (
                            StatusCode::NOT_FOUND,
                            Json(json!({"detail": format!("Tool '{name}' not found")})),
                        )
                            .into_response();
                    }
                    invocations.lock().unwrap().push(args);
                    Json(json!({"name": "Jane Doe", "plan": "Gold"})).into_response()
                }
            }),
        );
    serve(app).await
}

fn tool_call_response() -> Value {
    json!({
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": "lookup_user_data",
                        "arguments": "{\"msisdn\":\"+919916103095\"}"
                    }
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": {"prompt_tokens": 40, "completion_tokens": 12, "total_tokens": 52}
    })
}

fn text_response(text: &str) -> Value {
    json!({
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 60, "completion_tokens": 8, "total_tokens": 68}
    })
}

/// An OpenAI-compatible endpoint: asks for the lookup tool until it sees a
/// tool result, then answers with that result's `name` field.
async fn chat_server(calls: Arc<AtomicUsize>) -> String {
    let app = axum::Router::new().route(
        "/chat/completions",
        post(move |Json(body): Json<Value>| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let messages = body["messages"].as_array().cloned().unwrap_or_default();
                let tool_result = messages.iter().rev().find(|m| m["role"] == "tool");
                match tool_result {
                    None => Json(tool_call_response()),
                    Some(result) => {
                        let content = result["content"].as_str().unwrap_or_default();
                        let parsed: Value = serde_json::from_str(content).unwrap_or(Value::Null);
                        let name = parsed["name"].as_str().unwrap_or("unknown");
                        Json(text_response(name))
                    }
                }
            }
        }),
    );
    serve(app).await
}

fn config(openai_url: &str, tools_url: &str) -> AppConfig {
    let mut config = AppConfig {
        provider: ProviderKind::OpenAi,
        api_key: Some("sk-test".into()),
        ..AppConfig::default()
    };
    config.endpoints.openai_url = openai_url.to_string();
    config.tools.url = tools_url.to_string();
    config.retry.base_backoff_ms = 10;
    config.retry.max_backoff_ms = 50;
    config
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_tool_round_trip_over_http() {
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicUsize::new(0));
    let tools_url = tool_server(invocations.clone()).await;
    let chat_url = chat_server(calls.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&chat_url, &tools_url);
    config.sessions.dir = Some(dir.path().to_path_buf());

    let agent = Agent::from_config(&config).unwrap();
    let result = agent.run("+919916103095", "What plan am I on?").await.unwrap();

    assert_eq!(result.text, "Jane Doe");
    assert_eq!(result.iterations_used, 2);
    assert!(result.terminal.is_done());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let recorded = invocations.lock().unwrap().clone();
    assert_eq!(recorded, vec![json!({"msisdn": "+919916103095"})]);

    // History survives in a fresh store over the same directory
    let reopened = FileSessionStore::new(dir.path());
    let session = reopened.load(&SessionId::new("+919916103095")).await.unwrap();
    let roles: Vec<_> = session.history.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert!(session.tool_pairing_holds());
}

#[tokio::test]
async fn e2e_unreachable_tool_server_still_answers() {
    let app = axum::Router::new().route(
        "/chat/completions",
        post(|| async { Json(text_response("Hello")) }),
    );
    let chat_url = serve(app).await;

    let agent = Agent::from_config(&config(&chat_url, "http://127.0.0.1:1")).unwrap();
    let result = agent.run("s1", "Hi").await.unwrap();
    assert_eq!(result.text, "Hello");
    assert_eq!(result.iterations_used, 1);
}

#[tokio::test]
async fn e2e_mandatory_tools_fail_fast() {
    let calls = Arc::new(AtomicUsize::new(0));
    let chat_url = chat_server(calls.clone()).await;

    let mut config = config(&chat_url, "http://127.0.0.1:1");
    config.agent.tools_mandatory = true;

    let agent = Agent::from_config(&config).unwrap();
    let err = agent.run("s1", "Hi").await.unwrap_err();
    assert_eq!(err.kind(), "ToolsUnavailableError");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn e2e_bad_credential_is_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = axum::Router::new().route(
        "/chat/completions",
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": {"message": "Incorrect API key provided"}})),
                )
            }
        }),
    );
    let chat_url = serve(app).await;
    let tools_url = tool_server(Arc::new(Mutex::new(Vec::new()))).await;

    let agent = Agent::from_config(&config(&chat_url, &tools_url)).unwrap();
    let err = agent.run("s1", "Hi").await.unwrap_err();
    assert_eq!(err.kind(), "AuthError");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Only the user message was kept
    let session = agent.store().load(&SessionId::new("s1")).await.unwrap();
    assert_eq!(session.history.len(), 1);
}

#[tokio::test]
async fn e2e_rate_limit_is_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = axum::Router::new().route(
        "/chat/completions",
        post(move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response()
                } else {
                    Json(text_response("Hello again")).into_response()
                }
            }
        }),
    );
    let chat_url = serve(app).await;
    let tools_url = tool_server(Arc::new(Mutex::new(Vec::new()))).await;

    let agent = Agent::from_config(&config(&chat_url, &tools_url)).unwrap();
    let result = agent.run("s1", "Hi").await.unwrap();
    assert_eq!(result.text, "Hello again");
    assert_eq!(result.iterations_used, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn e2e_iteration_limit_over_http() {
    // Always asks for the tool, never answers
    let app = axum::Router::new().route(
        "/chat/completions",
        post(|| async { Json(tool_call_response()) }),
    );
    let chat_url = serve(app).await;
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let tools_url = tool_server(invocations.clone()).await;

    let mut config = config(&chat_url, &tools_url);
    config.agent.max_iterations = 2;

    let agent = Agent::from_config(&config).unwrap();
    let result = agent.run("s1", "loop").await.unwrap();
    assert_eq!(
        result.terminal,
        Terminal::Failed(FailureReason::IterationLimitExceeded)
    );
    assert_eq!(result.iterations_used, 2);
    assert_eq!(invocations.lock().unwrap().len(), 2);

    let session = agent.store().load(&SessionId::new("s1")).await.unwrap();
    assert!(session.tool_pairing_holds());
}

#[tokio::test]
async fn e2e_concurrent_sessions_are_independent() {
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicUsize::new(0));
    let tools_url = tool_server(invocations.clone()).await;
    let chat_url = chat_server(calls.clone()).await;

    let agent = Arc::new(Agent::from_config(&config(&chat_url, &tools_url)).unwrap());
    let mut handles = Vec::new();
    for i in 0..4 {
        let agent = agent.clone();
        handles.push(tokio::spawn(async move {
            agent.run(&format!("user-{i}"), "Who am I?").await
        }));
    }
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.text, "Jane Doe");
    }

    for i in 0..4 {
        let session = agent
            .store()
            .load(&SessionId::new(format!("user-{i}")))
            .await
            .unwrap();
        assert_eq!(session.history.len(), 4);
        assert!(session.tool_pairing_holds());
    }
    assert_eq!(invocations.lock().unwrap().len(), 4);
}
