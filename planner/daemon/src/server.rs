//! Gateway Server
//!
//! Binds the TCP listener, serves the router until a shutdown signal
//! arrives, then lets in-flight requests finish.
//!
//! ```text
//!   TcpListener ──► NormalizePath (trim trailing '/') ──► Router ──► handlers
//!                                                            │
//!                                                       Arc<AppState>
//! ```

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::Request;
use axum::{Router, ServiceExt};
use tokio::net::TcpListener;
use tokio::signal;
use tower::Layer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tracing::{error, info, warn};

use planner_core::{ChatBackend, GatewayConfig};

use crate::routes::{router, AppState};

/// Router wrapped so `/plan/` and `/plan` reach the same handler
pub fn app(state: Arc<AppState>) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(router(state))
}

/// The HTTP gateway
pub struct GatewayServer {
    /// Resolved configuration
    config: GatewayConfig,
    /// State shared with every request
    state: Arc<AppState>,
}

impl GatewayServer {
    /// Create a server for `config` that talks to `backend`
    pub fn new(config: GatewayConfig, backend: Arc<dyn ChatBackend>) -> Self {
        let state = Arc::new(AppState::new(backend, &config));
        Self { config, state }
    }

    /// Shared request state
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let address = self.config.bind_address();
        TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind to {address}"))
    }

    /// Bind and serve until `shutdown` completes
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` completes
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let address = listener
            .local_addr()
            .context("Failed to read listener address")?;

        info!(
            address = %address,
            model = self.state.backend.model(),
            backend = self.config.backend.base_url.as_str(),
            static_dir = ?self.state.static_dir,
            "Listening for connections"
        );

        if !self.state.static_dir.is_dir() {
            warn!(path = ?self.state.static_dir, "Static directory not found");
        }

        let service = ServiceExt::<Request>::into_make_service(app(self.state));
        axum::serve(listener, service)
            .with_graceful_shutdown(shutdown)
            .await
            .context("Server error")?;

        info!("Gateway stopped cleanly");
        Ok(())
    }
}

/// Resolve on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
