//! Monitor set endpoints.
//!
//! - `GET    /api/monitors`        list monitored videos with latest stats
//! - `POST   /api/monitor?bvid=`   validate by collecting once, then monitor
//! - `DELETE /api/monitor?bvid=`   stop monitoring; history is kept

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::MonitorState;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct BvidQuery {
    pub bvid: String,
}

pub fn create_monitors_router(service: MonitorState) -> Router {
    Router::new()
        .route("/api/monitors", get(list_monitors))
        .route("/api/monitor", axum::routing::post(add_monitor).delete(remove_monitor))
        .with_state(service)
}

/// `GET /api/monitors`
pub async fn list_monitors(State(service): State<MonitorState>) -> Result<Json<Value>, AppError> {
    let monitors = service.list_videos().await?;
    Ok(Json(json!({ "success": true, "monitors": monitors })))
}

/// `POST /api/monitor?bvid=`
pub async fn add_monitor(
    State(service): State<MonitorState>,
    Query(query): Query<BvidQuery>,
) -> Result<Json<Value>, AppError> {
    let info = service.add_video(query.bvid.trim()).await?;
    Ok(Json(json!({ "success": true, "msg": "monitor added", "info": info })))
}

/// `DELETE /api/monitor?bvid=`
pub async fn remove_monitor(
    State(service): State<MonitorState>,
    Query(query): Query<BvidQuery>,
) -> Result<Json<Value>, AppError> {
    service.remove_video(query.bvid.trim()).await?;
    Ok(Json(json!({ "success": true, "msg": "monitor removed" })))
}
