//! Polling interval endpoints.
//!
//! Allowed values are 10, 15, 30, 60, 120 and 300 seconds; anything else
//! is rejected with `400` before the scheduler is touched.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::MonitorState;
use crate::error::AppError;
use crate::interval::ALLOWED_INTERVALS;

#[derive(Debug, Deserialize)]
pub struct GlobalIntervalRequest {
    pub interval: u64,
}

/// `null` or a missing field clears the override.
#[derive(Debug, Deserialize)]
pub struct VideoIntervalRequest {
    #[serde(default)]
    pub interval: Option<u64>,
}

pub fn create_intervals_router(service: MonitorState) -> Router {
    Router::new()
        .route(
            "/api/config/interval",
            get(get_global_interval).put(set_global_interval),
        )
        .route(
            "/api/monitor/:bvid/interval",
            get(get_video_interval).put(set_video_interval),
        )
        .with_state(service)
}

/// `GET /api/config/interval`
pub async fn get_global_interval(
    State(service): State<MonitorState>,
) -> Result<Json<Value>, AppError> {
    let interval = service.global_interval().await?;
    Ok(Json(json!({
        "success": true,
        "interval": interval,
        "allowed": ALLOWED_INTERVALS,
    })))
}

/// `PUT /api/config/interval` with `{ "interval": n }`
pub async fn set_global_interval(
    State(service): State<MonitorState>,
    Json(body): Json<GlobalIntervalRequest>,
) -> Result<Json<Value>, AppError> {
    let interval = service.set_global_interval(body.interval).await?;
    Ok(Json(json!({ "success": true, "interval": interval })))
}

/// `GET /api/monitor/:bvid/interval`
pub async fn get_video_interval(
    State(service): State<MonitorState>,
    Path(bvid): Path<String>,
) -> Result<Json<Value>, AppError> {
    let view = service.video_interval(&bvid).await?;
    Ok(Json(json!({ "success": true, "bvid": bvid, "interval": view })))
}

/// `PUT /api/monitor/:bvid/interval` with `{ "interval": n | null }`
pub async fn set_video_interval(
    State(service): State<MonitorState>,
    Path(bvid): Path<String>,
    Json(body): Json<VideoIntervalRequest>,
) -> Result<Json<Value>, AppError> {
    let view = service.set_video_interval(&bvid, body.interval).await?;
    Ok(Json(json!({ "success": true, "bvid": bvid, "interval": view })))
}
