//! LLM Backend Integration
//!
//! This module provides access to the chat backend through a common trait
//! interface, so the relay can be exercised against a fake backend in tests.
//!
//! # Available Backends
//!
//! - **Ollama**: Local LLM server, `/api/chat` endpoint
//!
//! # Usage
//!
//! ```ignore
//! use planner_core::backend::{ChatBackend, OllamaBackend};
//! use planner_core::messages::ChatMessage;
//! use futures::StreamExt;
//!
//! let backend = OllamaBackend::new("http://localhost:11434", "deepseek-r1:7b", timeout)?;
//! let mut fragments = backend.send_streaming(&[ChatMessage::user("Hello!")]).await?;
//! while let Some(fragment) = fragments.next().await {
//!     print!("{}", fragment?);
//! }
//! ```

mod ollama;
mod traits;

pub use ollama::{normalize_base_url, ChatChunk, OllamaBackend};
pub use traits::{BackendError, ChatBackend, FragmentStream};
