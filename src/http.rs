//! Ambient HTTP/SSE surface: `POST /sellers/:seller_id/sync` triggers a
//! run, `GET /sellers/:seller_id/events` streams its progress. Router
//! shape and `State<Arc<AppState>>` extraction are adapted from the
//! `gjwang-zero_x_infinity` gateway handlers; the rest of this crate has
//! no HTTP idiom of its own to draw from.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::SyncError;
use crate::sync::SyncJobManager;

pub struct AppState {
    pub manager: Arc<SyncJobManager>,
}

#[derive(Serialize)]
struct ApiError {
    error: String,
}

#[derive(Serialize)]
struct StartSyncResponse {
    #[serde(rename = "syncId")]
    sync_id: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sellers/:seller_id/sync", post(start_sync))
        .route("/sellers/:seller_id/sync/:sync_id/cancel", post(cancel_sync))
        .route("/sellers/:seller_id/events", get(seller_events))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn start_sync(State(state): State<Arc<AppState>>, Path(seller_id): Path<String>) -> impl IntoResponse {
    match state.manager.start(&seller_id).await {
        Ok(sync_id) => (StatusCode::ACCEPTED, Json(StartSyncResponse { sync_id })).into_response(),
        Err(SyncError::AlreadyRunning) => {
            (StatusCode::CONFLICT, Json(ApiError { error: SyncError::AlreadyRunning.to_string() })).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(ApiError { error: e.to_string() })).into_response(),
    }
}

async fn cancel_sync(State(state): State<Arc<AppState>>, Path((_seller_id, sync_id)): Path<(String, String)>) -> impl IntoResponse {
    if state.manager.cancel(&sync_id).await {
        StatusCode::ACCEPTED
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn seller_events(
    State(state): State<Arc<AppState>>,
    Path(seller_id): Path<String>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.manager.bus().subscribe(&seller_id);
    let stream = BroadcastStream::new(receiver).filter_map(|item| match item {
        Ok(event) => serde_json::to_string(&event).ok().map(|json| Ok(SseEvent::default().data(json))),
        Err(_) => None, // lagged subscriber: drop the gap, keep streaming
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
