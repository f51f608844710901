//! HTTP Routes
//!
//! ```text
//!   GET  /health                       liveness
//!   GET  /                             home page
//!   GET  /static/{*path}               static assets
//!   POST /plan, /api/plan_stream       materialized plan (JSON)
//!   POST /plan_stream, /plan-stream    streamed plan (text/plain)
//! ```
//!
//! Every other path or method answers 404 with a JSON error body.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use planner_core::{
    collect_plan, relay, BackendError, ChatBackend, GatewayConfig, PlanReply, PlanRequest,
    ReasoningFilter, ReasoningMarkers, RelayEvent,
};

use crate::assets;

/// Pieces buffered between the relay task and the response body
const STREAM_CHANNEL_CAPACITY: usize = 100;

/// Content type of streamed plans
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Shared, read-only state for all requests
pub struct AppState {
    /// Backend used for every plan
    pub backend: Arc<dyn ChatBackend>,
    /// Markers removed when reasoning is hidden
    pub markers: ReasoningMarkers,
    /// System instruction sent ahead of the user details
    pub system_prompt: String,
    /// Root of the home page and static assets
    pub static_dir: PathBuf,
}

impl AppState {
    /// Build state from resolved configuration
    pub fn new(backend: Arc<dyn ChatBackend>, config: &GatewayConfig) -> Self {
        Self {
            backend,
            markers: config.markers.clone(),
            system_prompt: config.system_prompt.clone(),
            static_dir: config.static_dir.clone(),
        }
    }
}

/// Errors answered with a JSON `{"error": ...}` body
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body could not be parsed
    #[error("{0}")]
    BadRequest(String),

    /// Backend failed before a response was started
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Unknown path, method, or asset
    #[error("not found")]
    NotFound,
}

impl ApiError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Backend(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Build the gateway router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", only(get(health)))
        .route("/", only(get(assets::home)))
        .route("/static/{*path}", only(get(assets::static_file)))
        .route("/plan", only(post(plan_materialized)))
        .route("/api/plan_stream", only(post(plan_materialized)))
        .route("/plan_stream", only(post(plan_streamed)))
        .route("/plan-stream", only(post(plan_streamed)))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Answer other methods on a known path with 404
fn only(method: MethodRouter<Arc<AppState>>) -> MethodRouter<Arc<AppState>> {
    method.fallback(not_found)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn parse_request(body: &[u8]) -> Result<PlanRequest, ApiError> {
    PlanRequest::from_json(body).map_err(|e| {
        debug!(error = %e, "Rejected plan request body");
        ApiError::BadRequest(e.to_string())
    })
}

/// Generate the whole plan, then answer with one JSON document
async fn plan_materialized(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<PlanReply>, ApiError> {
    let request = parse_request(&body)?;
    let span = info_span!("plan", request_id = %Uuid::new_v4(), mode = "materialized");

    async move {
        let messages = request.to_conversation(&state.system_prompt);
        let markers = request.hides_reasoning().then_some(&state.markers);
        info!(
            model = state.backend.model(),
            hide_reasoning = markers.is_some(),
            "Plan requested"
        );

        let reply = collect_plan(state.backend.as_ref(), &messages, markers)
            .await
            .map_err(|e| {
                warn!(error = %e, "Backend failed");
                ApiError::from(e)
            })?;

        info!(plan_bytes = reply.plan.len(), "Plan completed");
        Ok(Json(reply))
    }
    .instrument(span)
    .await
}

/// Start a plain-text response and relay the plan into it as it arrives
async fn plan_streamed(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = parse_request(&body)?;
    let span = info_span!("plan", request_id = %Uuid::new_v4(), mode = "streamed");

    let (tx, rx) = mpsc::channel::<String>(STREAM_CHANNEL_CAPACITY);
    tokio::spawn(stream_plan(state, request, tx).instrument(span));

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    Ok(([(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response())
}

/// Relay task for one streamed plan
///
/// Headers are already on their way when this runs, so backend failures are
/// written into the body. A closed channel means the client went away.
async fn stream_plan(state: Arc<AppState>, request: PlanRequest, tx: mpsc::Sender<String>) {
    let messages = request.to_conversation(&state.system_prompt);
    let filter = request
        .hides_reasoning()
        .then(|| ReasoningFilter::new(state.markers.clone()));
    info!(
        model = state.backend.model(),
        hide_reasoning = filter.is_some(),
        "Streaming plan"
    );

    let fragments = match state.backend.send_streaming(&messages).await {
        Ok(fragments) => fragments,
        Err(e) => {
            warn!(error = %e, "Backend request failed");
            if tx.send(RelayEvent::Failed(e).into_body_text()).await.is_err() {
                debug!("Client disconnected before error was written");
            }
            return;
        }
    };

    let mut events = std::pin::pin!(relay(fragments, filter));
    while let Some(event) = events.next().await {
        if let RelayEvent::Failed(ref e) = event {
            warn!(error = %e, "Backend failed mid-stream");
        }
        if tx.send(event.into_body_text()).await.is_err() {
            debug!("Client disconnected, stopping relay");
            return;
        }
    }

    debug!("Plan stream finished");
}
