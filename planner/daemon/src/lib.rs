//! Planner Daemon - HTTP Gateway for Career Plans
//!
//! Serves the home page and static assets, and turns structured plan
//! requests into prompts for a local Ollama backend. Replies are returned
//! either as one JSON document or as an incremental plain-text stream, with
//! the model's reasoning optionally removed.
//!
//! All request-independent logic lives in `planner_core`; this crate only
//! speaks HTTP.

pub mod assets;
pub mod routes;
pub mod server;

pub use routes::{router, ApiError, AppState};
pub use server::{app, shutdown_signal, GatewayServer};
