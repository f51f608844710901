//! Ollama Backend Implementation
//!
//! Chat backend for Ollama (local LLM server).
//!
//! # Ollama API
//!
//! - `/api/chat` - Chat completions with message history
//! - `/api/tags` - List available models (used as a health probe)
//!
//! The chat endpoint answers with newline-delimited JSON objects, even when
//! only the final text is wanted. Every line is decoded as a [`ChatChunk`].

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use super::traits::{BackendError, ChatBackend, FragmentStream};
use crate::config::BackendSettings;
use crate::messages::ChatMessage;

/// Channel capacity between the body reader task and the consumer
const FRAGMENT_CHANNEL_CAPACITY: usize = 100;

/// Timeout for the health probe
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Ollama backend client
#[derive(Clone)]
pub struct OllamaBackend {
    /// Base URL without trailing slash
    base_url: String,
    /// Model identifier
    model: String,
    /// Connect and read deadline
    timeout: Duration,
    /// HTTP client
    http_client: reqwest::Client,
}

impl std::fmt::Debug for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Outbound request body for `/api/chat`
#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// One decoded line of a chat response
///
/// Ollama emits `{"message": {"content": ...}, "done": ...}`; some
/// compatible servers put `content` at the top level instead. Both shapes
/// deserialize into this one struct and [`ChatChunk::text`] picks the first
/// non-empty content.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct ChatChunk {
    /// Nested message payload
    #[serde(default)]
    pub message: Option<ChunkMessage>,
    /// Top-level content fallback
    #[serde(default)]
    pub content: Option<String>,
    /// Whether this is the final line of the reply
    #[serde(default)]
    pub done: Option<bool>,
    /// Error reported by the backend
    #[serde(default)]
    pub error: Option<String>,
}

/// Nested `message` object of a [`ChatChunk`]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct ChunkMessage {
    /// Message text
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatChunk {
    /// Decode one response line, returning `None` for blank or malformed lines
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        serde_json::from_str(line).ok()
    }

    /// Text carried by this line (empty if none)
    #[must_use]
    pub fn text(&self) -> &str {
        self.message
            .as_ref()
            .and_then(|m| m.content.as_deref())
            .filter(|c| !c.is_empty())
            .or(self.content.as_deref())
            .unwrap_or("")
    }

    /// Whether the backend marked the reply complete
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.unwrap_or(false)
    }
}

/// Normalize a configured backend address into a base URL
///
/// Accepts `host:port` without a scheme (as `OLLAMA_HOST` is often set) and
/// trims trailing slashes.
#[must_use]
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

impl OllamaBackend {
    /// Create a new Ollama backend
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Client`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl AsRef<str>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(BackendError::Client)?;

        Ok(Self {
            base_url: normalize_base_url(base_url.as_ref()),
            model: model.into(),
            timeout,
            http_client,
        })
    }

    /// Create from the `[backend]` configuration section
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Client`] if the HTTP client cannot be built.
    pub fn from_config(settings: &BackendSettings) -> Result<Self, BackendError> {
        Self::new(&settings.base_url, settings.model.clone(), settings.timeout)
    }

    /// Get the base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get chat endpoint URL
    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    /// Get tags endpoint URL
    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url)
    }

    /// Open the single outbound chat request
    async fn post_chat(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response, BackendError> {
        if messages.is_empty() {
            return Err(BackendError::EmptyConversation);
        }

        let body = ChatRequestBody {
            model: &self.model,
            messages,
            stream,
        };

        debug!(
            url = %self.chat_url(),
            model = %self.model,
            stream,
            messages = messages.len(),
            "Sending chat request"
        );

        let response = self
            .http_client
            .post(self.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::from_request(e, self.timeout))?;

        // Check for HTTP errors
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.tags_url())
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        let response = self.post_chat(messages, false).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| BackendError::from_body(e, self.timeout))?;

        collect_reply(&String::from_utf8_lossy(&body))
    }

    async fn send_streaming(
        &self,
        messages: &[ChatMessage],
    ) -> Result<FragmentStream, BackendError> {
        let response = self.post_chat(messages, true).await?;
        let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);
        let deadline = self.timeout;
        let mut body = response.bytes_stream();

        // Spawn task to process stream
        tokio::spawn(async move {
            let mut lines = LineBuffer::default();

            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        for line in lines.push(&bytes) {
                            if forward_line(&tx, &line).await == LineFlow::Stop {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Backend stream interrupted");
                        let _ = tx.send(Err(BackendError::from_body(e, deadline))).await;
                        return;
                    }
                }
            }

            // Connection closed; the last line may lack its newline
            if let Some(line) = lines.finish() {
                let _ = forward_line(&tx, &line).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LineFlow {
    Continue,
    Stop,
}

/// Decode one streamed line and forward its content
async fn forward_line(
    tx: &mpsc::Sender<Result<String, BackendError>>,
    line: &str,
) -> LineFlow {
    let Some(chunk) = ChatChunk::parse(line) else {
        if !line.trim().is_empty() {
            debug!(line = %line, "Skipping malformed backend line");
        }
        return LineFlow::Continue;
    };

    if let Some(message) = chunk.error {
        let _ = tx.send(Err(BackendError::Backend(message))).await;
        return LineFlow::Stop;
    }

    let text = chunk.text();
    if !text.is_empty() && tx.send(Ok(text.to_string())).await.is_err() {
        // Receiver dropped, stop streaming
        debug!("Fragment receiver dropped, abandoning backend stream");
        return LineFlow::Stop;
    }

    if chunk.is_done() {
        LineFlow::Stop
    } else {
        LineFlow::Continue
    }
}

/// Accumulate the content of a complete newline-delimited reply
fn collect_reply(body: &str) -> Result<String, BackendError> {
    let mut text = String::new();
    let mut decoded_any = false;

    for line in body.lines() {
        let Some(chunk) = ChatChunk::parse(line) else {
            continue;
        };
        decoded_any = true;

        if let Some(message) = chunk.error {
            return Err(BackendError::Backend(message));
        }
        text.push_str(chunk.text());
        if chunk.is_done() {
            break;
        }
    }

    if decoded_any {
        return Ok(text);
    }

    // A single pretty-printed object spans several lines
    match serde_json::from_str::<ChatChunk>(body) {
        Ok(chunk) => match chunk.error {
            Some(message) => Err(BackendError::Backend(message)),
            None => Ok(chunk.text().to_string()),
        },
        Err(e) => Err(BackendError::MalformedResponse(e.to_string())),
    }
}

/// Splits a byte stream into complete lines
///
/// Bytes are buffered until a newline arrives so that multi-byte UTF-8
/// characters split across network chunks decode intact.
#[derive(Debug, Default)]
struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    /// Append bytes and return every line completed by them
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
        }
        lines
    }

    /// Return the trailing unterminated line, if any
    fn finish(self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.buffer).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ollama_backend_creation() {
        let backend =
            OllamaBackend::new("http://localhost:11434/", "llama3", Duration::from_secs(120))
                .unwrap();
        assert_eq!(backend.base_url(), "http://localhost:11434");
        assert_eq!(backend.chat_url(), "http://localhost:11434/api/chat");
        assert_eq!(backend.tags_url(), "http://localhost:11434/api/tags");
        assert_eq!(backend.model(), "llama3");
        assert_eq!(backend.name(), "Ollama");
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("localhost:11434"), "http://localhost:11434");
        assert_eq!(normalize_base_url("https://llm.local/"), "https://llm.local");
        assert_eq!(normalize_base_url(" http://10.0.0.2:8080 "), "http://10.0.0.2:8080");
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let body = ChatRequestBody {
            model: "m",
            messages: &messages,
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "m",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hi"}
                ],
                "stream": true
            })
        );
    }

    #[test]
    fn test_chunk_text_fallback() {
        let nested = ChatChunk::parse(r#"{"message":{"role":"assistant","content":"a"},"done":false}"#)
            .unwrap();
        assert_eq!(nested.text(), "a");
        assert!(!nested.is_done());

        let flat = ChatChunk::parse(r#"{"content":"b","done":true}"#).unwrap();
        assert_eq!(flat.text(), "b");
        assert!(flat.is_done());

        // Empty nested content falls back to the top-level field
        let both = ChatChunk::parse(r#"{"message":{"content":""},"content":"c"}"#).unwrap();
        assert_eq!(both.text(), "c");

        let neither = ChatChunk::parse(r#"{"done":true}"#).unwrap();
        assert_eq!(neither.text(), "");

        assert!(ChatChunk::parse("not json").is_none());
        assert!(ChatChunk::parse("   ").is_none());
        assert!(ChatChunk::parse("[1,2]").is_none());
    }

    #[test]
    fn test_line_buffer_splits_lines_across_chunks() {
        let mut lines = LineBuffer::default();
        assert!(lines.push(b"{\"a\":").is_empty());
        assert_eq!(lines.push(b"1}\n{\"b\""), vec!["{\"a\":1}".to_string()]);
        assert_eq!(
            lines.push(b":2}\n\n"),
            vec!["{\"b\":2}".to_string(), String::new()]
        );
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn test_line_buffer_keeps_split_multibyte_chars() {
        let text = "计划\n".as_bytes();
        let mut lines = LineBuffer::default();
        // Split inside the first character
        assert!(lines.push(&text[..2]).is_empty());
        assert_eq!(lines.push(&text[2..]), vec!["计划".to_string()]);
    }

    #[test]
    fn test_line_buffer_finish_returns_tail() {
        let mut lines = LineBuffer::default();
        assert!(lines.push(b"{\"done\":true}").is_empty());
        assert_eq!(lines.finish(), Some("{\"done\":true}".to_string()));
    }

    #[test]
    fn test_collect_reply_stops_at_done() {
        let body = concat!(
            "{\"message\":{\"content\":\"Hel\"},\"done\":false}\n",
            "garbage line\n",
            "{\"content\":\"lo\",\"done\":false}\n",
            "{\"message\":{\"content\":\"\"},\"done\":true}\n",
            "{\"message\":{\"content\":\"ignored\"},\"done\":false}\n",
        );
        assert_eq!(collect_reply(body).unwrap(), "Hello");
    }

    #[test]
    fn test_collect_reply_single_object() {
        let body = "{\n  \"message\": {\"content\": \"whole\"},\n  \"done\": true\n}";
        assert_eq!(collect_reply(body).unwrap(), "whole");
    }

    #[test]
    fn test_collect_reply_errors() {
        assert!(matches!(
            collect_reply("<html>oops</html>"),
            Err(BackendError::MalformedResponse(_))
        ));
        assert!(matches!(
            collect_reply("{\"error\":\"model not found\"}\n"),
            Err(BackendError::Backend(msg)) if msg == "model not found"
        ));
    }
}
