//! LLM Backend Traits
//!
//! Trait definitions for chat backends. The relay only talks to
//! [`ChatBackend`], never to a concrete HTTP client.
//!
//! # Design Philosophy
//!
//! A backend offers two ways to read a reply:
//! - [`ChatBackend::send`] materializes the whole reply as one string
//! - [`ChatBackend::send_streaming`] yields a lazy, finite, non-restartable
//!   sequence of text fragments in arrival order
//!
//! Each call opens exactly one outbound request. Nothing is retried.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::messages::ChatMessage;

/// Lazy sequence of text fragments from a streaming backend reply
///
/// The sequence ends after the backend marks the reply done, the connection
/// closes, or one `Err` item has been yielded.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, BackendError>> + Send>>;

/// Errors raised while talking to the chat backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// The conversation had no messages
    #[error("conversation must contain at least one message")]
    EmptyConversation,

    /// The HTTP client could not be constructed
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The backend could not be reached
    #[error("failed to connect to backend: {0}")]
    Connect(#[source] reqwest::Error),

    /// The backend did not answer within the configured deadline
    #[error("backend timed out after {after:?}: {source}")]
    Timeout {
        /// Configured connect/read deadline
        after: Duration,
        /// The underlying client error
        source: reqwest::Error,
    },

    /// The backend answered with a non-success HTTP status
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, as far as it could be read
        body: String,
    },

    /// Reading the response body failed part way through
    #[error("backend stream interrupted: {0}")]
    Stream(#[source] reqwest::Error),

    /// The backend reported an error inside its response
    #[error("backend error: {0}")]
    Backend(String),

    /// The response contained no decodable chat line
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    /// Classify a request-phase client error
    pub(crate) fn from_request(err: reqwest::Error, deadline: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                after: deadline,
                source: err,
            }
        } else {
            Self::Connect(err)
        }
    }

    /// Classify a body-phase client error
    pub(crate) fn from_body(err: reqwest::Error, deadline: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                after: deadline,
                source: err,
            }
        } else {
            Self::Stream(err)
        }
    }
}

/// Chat backend trait
///
/// Implement this trait to plug a different LLM provider into the gateway.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Get the backend name (e.g., "Ollama")
    fn name(&self) -> &str;

    /// Model identifier sent with every request
    fn model(&self) -> &str;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Send a conversation and wait for the complete reply
    async fn send(&self, messages: &[ChatMessage]) -> Result<String, BackendError>;

    /// Send a conversation and receive the reply as it is generated
    async fn send_streaming(&self, messages: &[ChatMessage])
        -> Result<FragmentStream, BackendError>;
}
