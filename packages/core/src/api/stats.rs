use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::MonitorState;
use crate::error::AppError;
use crate::monitor::VideoHistory;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// Keep only the most recent `limit` records.
    pub limit: Option<usize>,
}

pub fn create_stats_router(service: MonitorState) -> Router {
    Router::new()
        .route("/api/stats/:bvid", get(get_stats))
        .with_state(service)
}

/// `GET /api/stats/:bvid?limit=` returns cached info and stats, oldest first.
pub async fn get_stats(
    State(service): State<MonitorState>,
    Path(bvid): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<VideoHistory>, AppError> {
    Ok(Json(service.history(&bvid, query.limit).await?))
}
