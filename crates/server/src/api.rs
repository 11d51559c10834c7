use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::pipeline::generate;
use crate::state::{AppState, CycleKind, CycleStatus};
use crate::update_covers::update_covers;
use crate::utils::json_error;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct AcceptedResponse {
    pub accepted: CycleKind,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/generate", post(trigger_generate))
        .route("/api/update-covers", post(trigger_update_covers))
        .with_state(state)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn status(State(state): State<AppState>) -> Json<CycleStatus> {
    Json(state.status.read().clone())
}

async fn trigger_generate(State(state): State<AppState>) -> Response {
    let Some(guard) = state.try_begin(CycleKind::Generate) else {
        return json_error(StatusCode::CONFLICT, "a cycle is already running").into_response();
    };
    info!("Generation requested over HTTP");
    tokio::spawn(async move {
        let _ = generate(state, guard).await;
    });
    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            accepted: CycleKind::Generate,
        }),
    )
        .into_response()
}

async fn trigger_update_covers(State(state): State<AppState>) -> Response {
    let Some(guard) = state.try_begin(CycleKind::UpdateCovers) else {
        return json_error(StatusCode::CONFLICT, "a cycle is already running").into_response();
    };
    info!("Cover update requested over HTTP");
    match update_covers(state, guard).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}
