//! Planner Core - Headless Logic for the Career Plan Gateway
//!
//! This crate holds everything the gateway does apart from speaking HTTP to
//! its own clients. It can be driven by the daemon, by tests, or by any other
//! surface.
//!
//! # Architecture
//!
//! ```text
//!   PlanRequest ──► plan::to_conversation ──► ChatBackend (Ollama /api/chat)
//!                                                   │
//!                                           FragmentStream
//!                                                   │
//!                                       ReasoningFilter (optional)
//!                                                   │
//!                              relay::relay ────────┴──────── relay::collect_plan
//!                           (incremental text)              (one PlanReply)
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: Chat backend abstraction and the Ollama client
//! - [`reasoning`]: Streaming reasoning filter
//! - [`plan`]: Plan request parsing and prompt building
//! - [`relay`]: Backend-to-client pipelines for both response modes
//! - [`messages`]: Chat message types
//! - [`config`]: Layered configuration (defaults, TOML, env, CLI)
//!
//! # No Server Dependencies
//!
//! This crate has no dependency on an HTTP server framework.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod messages;
pub mod plan;
pub mod reasoning;
pub mod relay;

// Re-exports for convenience
pub use backend::{BackendError, ChatBackend, FragmentStream, OllamaBackend};
pub use config::{
    default_config_path, load_config_from_path, load_config_with_env,
    BackendSettings, ConfigError, ConfigOverrides, ConfigSource, GatewayConfig, GatewayToml,
};
pub use messages::{ChatMessage, ChatRole};
pub use plan::{PlanRequest, DEFAULT_SYSTEM_PROMPT};
pub use reasoning::{strip_reasoning, FilterMode, ReasoningFilter, ReasoningMarkers};
pub use relay::{collect_plan, relay, PlanReply, RelayEvent, STREAM_ERROR_PREFIX};
