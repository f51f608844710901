//! Integration tests for the Ollama backend client
//!
//! Each test starts a fake Ollama server on an ephemeral port and points an
//! `OllamaBackend` at it. Tests cover:
//! - Outbound request shape
//! - Newline-delimited reply decoding (both content shapes, malformed lines)
//! - Lines and characters split across network chunks
//! - Failure classification (status, error lines, unreachable, timeout)

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{stream, StreamExt};
use tokio::sync::Mutex;

use planner_core::backend::{BackendError, ChatBackend, OllamaBackend};
use planner_core::messages::ChatMessage;

// =============================================================================
// Fake Backend Infrastructure
// =============================================================================

const TIMEOUT: Duration = Duration::from_secs(5);

async fn spawn_backend(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn ndjson_router(body: &'static str) -> Router {
    Router::new().route("/api/chat", post(move || async move { body }))
}

fn chunked_router(chunks: Vec<&'static [u8]>) -> Router {
    Router::new().route(
        "/api/chat",
        post(move || {
            let chunks = chunks.clone();
            async move {
                let body = stream::iter(chunks).then(|chunk| async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok::<_, Infallible>(chunk)
                });
                Body::from_stream(body)
            }
        }),
    )
}

fn conversation() -> Vec<ChatMessage> {
    vec![ChatMessage::system("advisor"), ChatMessage::user("姓名: 小王")]
}

async fn collect_stream(backend: &OllamaBackend) -> Vec<Result<String, BackendError>> {
    let fragments = backend.send_streaming(&conversation()).await.unwrap();
    fragments.collect().await
}

const REPLY: &str = concat!(
    "{\"model\":\"m\",\"message\":{\"role\":\"assistant\",\"content\":\"<think>\"},\"done\":false}\n",
    "{\"message\":{\"content\":\"hmm\"},\"done\":false}\n",
    "this line is not json\n",
    "\n",
    "{\"message\":{\"content\":\"</think>\"},\"done\":false}\n",
    "{\"content\":\"Learn Rust\",\"done\":false}\n",
    "{\"message\":{\"content\":\"\"},\"done\":true}\n",
    "{\"message\":{\"content\":\"after done\"},\"done\":false}\n",
);

// =============================================================================
// Request Shape
// =============================================================================

#[tokio::test]
async fn test_request_body_sent_to_chat_endpoint() {
    let captured: Arc<Mutex<Option<serde_json::Value>>> = Arc::new(Mutex::new(None));

    let router = Router::new()
        .route(
            "/api/chat",
            post(
                |State(captured): State<Arc<Mutex<Option<serde_json::Value>>>>,
                 Json(body): Json<serde_json::Value>| async move {
                    *captured.lock().await = Some(body);
                    "{\"message\":{\"content\":\"ok\"},\"done\":true}\n"
                },
            ),
        )
        .with_state(Arc::clone(&captured));
    let url = spawn_backend(router).await;

    let backend = OllamaBackend::new(&url, "deepseek-r1:7b", TIMEOUT).unwrap();
    let reply = backend.send(&conversation()).await.unwrap();
    assert_eq!(reply, "ok");

    let body = captured.lock().await.take().unwrap();
    assert_eq!(
        body,
        serde_json::json!({
            "model": "deepseek-r1:7b",
            "messages": [
                {"role": "system", "content": "advisor"},
                {"role": "user", "content": "姓名: 小王"}
            ],
            "stream": false
        })
    );
}

#[tokio::test]
async fn test_empty_conversation_rejected() {
    let backend = OllamaBackend::new("http://127.0.0.1:9", "m", TIMEOUT).unwrap();
    assert!(matches!(
        backend.send(&[]).await,
        Err(BackendError::EmptyConversation)
    ));
    assert!(matches!(
        backend.send_streaming(&[]).await,
        Err(BackendError::EmptyConversation)
    ));
}

// =============================================================================
// Reply Decoding
// =============================================================================

#[tokio::test]
async fn test_send_accumulates_until_done() {
    let url = spawn_backend(ndjson_router(REPLY)).await;
    let backend = OllamaBackend::new(&url, "m", TIMEOUT).unwrap();

    let reply = backend.send(&conversation()).await.unwrap();
    assert_eq!(reply, "<think>hmm</think>Learn Rust");
}

#[tokio::test]
async fn test_streaming_yields_non_empty_fragments_until_done() {
    let url = spawn_backend(ndjson_router(REPLY)).await;
    let backend = OllamaBackend::new(&url, "m", TIMEOUT).unwrap();

    let fragments: Vec<String> = collect_stream(&backend)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(fragments, vec!["<think>", "hmm", "</think>", "Learn Rust"]);
}

#[tokio::test]
async fn test_streaming_reassembles_split_lines() {
    let line = "{\"message\":{\"content\":\"职业规划\"},\"done\":false}\n".as_bytes();
    // Split in the middle of the JSON and inside a multi-byte character
    let split = line.iter().position(|&b| b >= 0x80).unwrap() + 1;
    let router = chunked_router(vec![
        &line[..10],
        &line[10..split],
        &line[split..],
        b"{\"content\":\"!\",\"do",
        b"ne\":true}",
    ]);
    let url = spawn_backend(router).await;
    let backend = OllamaBackend::new(&url, "m", TIMEOUT).unwrap();

    let fragments: Vec<String> = collect_stream(&backend)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(fragments, vec!["职业规划", "!"]);
}

#[tokio::test]
async fn test_streaming_ends_when_connection_closes_without_done() {
    let url = spawn_backend(ndjson_router(
        "{\"message\":{\"content\":\"a\"}}\n{\"message\":{\"content\":\"b\"}}",
    ))
    .await;
    let backend = OllamaBackend::new(&url, "m", TIMEOUT).unwrap();

    let fragments: Vec<String> = collect_stream(&backend)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(fragments, vec!["a", "b"]);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_error_status_is_reported() {
    let router = Router::new().route(
        "/api/chat",
        post(|| async {
            (
                StatusCode::NOT_FOUND,
                "{\"error\":\"model 'missing' not found\"}",
            )
        }),
    );
    let url = spawn_backend(router).await;
    let backend = OllamaBackend::new(&url, "missing", TIMEOUT).unwrap();

    match backend.send_streaming(&conversation()).await {
        Err(BackendError::Status { status, body }) => {
            assert_eq!(status, 404);
            assert!(body.contains("not found"));
        }
        other => panic!("expected status error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_error_line_ends_stream() {
    let url = spawn_backend(ndjson_router(concat!(
        "{\"message\":{\"content\":\"start \"}}\n",
        "{\"error\":\"out of memory\"}\n",
        "{\"message\":{\"content\":\"never\"}}\n",
    )))
    .await;
    let backend = OllamaBackend::new(&url, "m", TIMEOUT).unwrap();

    let items = collect_stream(&backend).await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), "start ");
    assert!(matches!(&items[1], Err(BackendError::Backend(msg)) if msg == "out of memory"));

    assert!(matches!(
        backend.send(&conversation()).await,
        Err(BackendError::Backend(_))
    ));
}

#[tokio::test]
async fn test_unreachable_backend_fails_to_connect() {
    // Reserve a port, then free it so nothing listens there
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = OllamaBackend::new(format!("http://{addr}"), "m", TIMEOUT).unwrap();
    let err = backend.send_streaming(&conversation()).await.err().unwrap();
    assert!(matches!(err, BackendError::Connect(_)), "got {err:?}");
    assert!(err.to_string().starts_with("failed to connect to backend"));
}

#[tokio::test]
async fn test_unresponsive_backend_hits_deadline() {
    let router = Router::new().route(
        "/api/chat",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            "{}"
        }),
    );
    let url = spawn_backend(router).await;
    let backend = OllamaBackend::new(&url, "m", Duration::from_millis(200)).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), backend.send(&conversation()))
        .await
        .expect("backend deadline was not enforced");
    assert!(
        matches!(
            result,
            Err(BackendError::Timeout { .. } | BackendError::Connect(_))
        ),
        "got {result:?}"
    );
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let router = Router::new().route(
        "/api/tags",
        get(|| async { Json(serde_json::json!({"models": []})).into_response() }),
    );
    let url = spawn_backend(router).await;
    let backend = OllamaBackend::new(&url, "m", TIMEOUT).unwrap();
    assert!(backend.health_check().await);

    let broken = Router::new().route(
        "/api/tags",
        get(|| async { Response::builder().status(500).body(Body::empty()).unwrap() }),
    );
    let url = spawn_backend(broken).await;
    let backend = OllamaBackend::new(&url, "m", TIMEOUT).unwrap();
    assert!(!backend.health_check().await);
}
