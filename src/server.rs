// FOVEA Playback Server
// Copyright (c) 2026 The FOVEA Project
//
// Static file server over the segment tree (manifests + segments for the
// external player) plus a small JSON status API. The server shares nothing
// mutable with the pipeline loops beyond the read-only filesystem and the
// StreamState counters.

use axum::{
    extract::{Query, Request, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Component, PathBuf};
use std::sync::Arc;
use tower::ServiceExt; // For oneshot
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{error, info};

use crate::state::{StreamState, StreamStatus};

#[derive(Clone)]
pub struct AppState {
    pub state: Arc<StreamState>,
    pub root: PathBuf,
}

#[derive(Deserialize)]
struct StreamParams {
    path: String,
}

/// Only the artifact types the playback surface needs.
const ALLOWED_EXTENSIONS: &[&str] = &["mp4", "mpd", "txt", "html"];

/// Validate a client-supplied path before it touches the filesystem: it must
/// stay inside the segment root, expose no hidden files, and carry an
/// allowlisted extension.
fn validate_media_path(raw_path: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(raw_path);

    if path.is_absolute() {
        return Err("Access denied: Absolute paths are not served".to_string());
    }
    for component in path.components() {
        if matches!(component, Component::ParentDir) {
            return Err("Access denied: Path traversal detected".to_string());
        }
        if let Component::Normal(part) = component {
            if part.to_string_lossy().starts_with('.') {
                return Err("Access denied: Hidden files are not served".to_string());
            }
        }
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match ext {
        Some(e) if ALLOWED_EXTENSIONS.contains(&e.as_str()) => Ok(path),
        Some(e) => Err(format!("Access denied: Invalid file extension '.{}'", e)),
        None => Err("Access denied: No file extension provided".to_string()),
    }
}

pub async fn start_server(
    port: u16,
    root: PathBuf,
    state: Arc<StreamState>,
) -> anyhow::Result<()> {
    let app_state = AppState {
        state,
        root: root.clone(),
    };
    let app = Router::new()
        .route("/api/status", get(get_status))
        .route("/api/stream", get(stream_media))
        .fallback_service(ServeDir::new(root.clone()))
        .with_state(app_state)
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(
        "[SERVER] Serving {:?} on http://127.0.0.1:{}",
        root, port
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> Json<StreamStatus> {
    Json(app.state.snapshot())
}

async fn stream_media(
    State(app): State<AppState>,
    Query(params): Query<StreamParams>,
    req: Request,
) -> impl IntoResponse {
    let relative = match validate_media_path(&params.path) {
        Ok(p) => p,
        Err(e) => {
            error!("[SERVER] Stream access denied: {}", e);
            return (axum::http::StatusCode::FORBIDDEN, e).into_response();
        }
    };

    let path = app.root.join(relative);
    if !path.exists() {
        return axum::http::StatusCode::NOT_FOUND.into_response();
    }

    let service = ServeFile::new(path);
    match service.oneshot(req).await {
        Ok(res) => res.into_response(),
        Err(err) => {
            error!("[SERVER] ServeFile error: {}", err);
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// The player fetches everything relative to the segment root.
pub fn player_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/player.html", port)
}
