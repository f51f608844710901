//! Static Assets
//!
//! Files are read from the configured static directory on every request.
//! Paths that try to leave the directory are treated as missing.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::routes::{ApiError, AppState};

/// File served for `GET /`
pub const INDEX_FILE: &str = "index.html";

/// `GET /`
pub async fn home(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    serve_file(&state.static_dir, INDEX_FILE).await
}

/// `GET /static/{*path}`
pub async fn static_file(
    State(state): State<Arc<AppState>>,
    UrlPath(path): UrlPath<String>,
) -> Result<Response, ApiError> {
    serve_file(&state.static_dir, &path).await
}

/// Join `relative` onto `root`, refusing anything but plain names
pub fn resolve(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    let mut depth = 0;
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (depth > 0).then_some(resolved)
}

/// Content type by file extension
pub fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "application/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

async fn serve_file(root: &Path, relative: &str) -> Result<Response, ApiError> {
    let Some(path) = resolve(root, relative) else {
        debug!(path = relative, "Rejected static path");
        return Err(ApiError::NotFound);
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, content_type(&path))], bytes).into_response()),
        Err(e) => {
            debug!(path = ?path, error = %e, "Static file unavailable");
            Err(ApiError::NotFound)
        }
    }
}
