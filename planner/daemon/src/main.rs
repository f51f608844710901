//! Planner Daemon - Career Plan Gateway
//!
//! Serves the planner home page and forwards plan requests to a local Ollama
//! server.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (127.0.0.1:9000, deepseek-r1:7b on localhost:11434)
//! planner-daemon
//!
//! # Another model and port
//! planner-daemon --model qwen2.5:7b --port 9100
//!
//! # With config file
//! planner-daemon --config ~/.config/career-planner/gateway.toml
//!
//! # Verbose logging
//! RUST_LOG=debug planner-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `OLLAMA_HOST`: Ollama base URL (default: `http://localhost:11434`)
//! - `OLLAMA_MODEL`: Model name (default: `deepseek-r1:7b`)
//! - `HOST` / `PORT`: Bind address (default: `127.0.0.1:9000`)
//! - `PLANNER_BACKEND_TIMEOUT`: Backend connect/read timeout in seconds
//! - `PLANNER_STATIC_DIR`: Home page and asset directory (default: `static`)
//! - `PLANNER_CONFIG`: Configuration file path
//! - `RUST_LOG`: Log filter (overrides `--log-level`)
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use planner_core::{
    default_config_path, load_config_from_path, ChatBackend, ConfigOverrides, OllamaBackend,
};
use planner_daemon::{shutdown_signal, GatewayServer};

/// Planner Daemon - HTTP gateway serving career plans from a local LLM
#[derive(Parser, Debug)]
#[command(name = "planner-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "PLANNER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Port to bind
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Ollama base URL
    #[arg(long, value_name = "URL")]
    backend_url: Option<String>,

    /// Model name
    #[arg(short = 'm', long, value_name = "MODEL")]
    model: Option<String>,

    /// Directory holding index.html and static assets
    #[arg(long, value_name = "DIR")]
    static_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            backend_url: self.backend_url.clone(),
            model: self.model.clone(),
            static_dir: self.static_dir.clone(),
        }
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "planner_daemon={level},planner_core={level},tower_http={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting planner daemon");

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;
    args.overrides()
        .apply(&mut config)
        .context("Invalid command-line options")?;

    info!(
        source = %config.source(),
        file = ?config.config_file_path,
        "Configuration loaded"
    );

    let backend = OllamaBackend::from_config(&config.backend)
        .context("Failed to create backend client")?;
    if !backend.health_check().await {
        warn!(
            url = backend.base_url(),
            "Backend not reachable yet; plan requests will fail until it is"
        );
    }

    let server = GatewayServer::new(config, Arc::new(backend));
    server.run(shutdown_signal()).await
}
