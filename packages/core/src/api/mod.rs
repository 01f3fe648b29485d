//! HTTP control surface.
//!
//! Routes:
//! - `GET    /health`
//! - `GET    /metrics`
//! - `GET    /api/monitors`
//! - `POST   /api/monitor?bvid=`
//! - `DELETE /api/monitor?bvid=`
//! - `GET    /api/config/interval`, `PUT /api/config/interval`
//! - `GET    /api/monitor/:bvid/interval`, `PUT /api/monitor/:bvid/interval`
//! - `GET    /api/stats/:bvid?limit=`

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;

use crate::metrics::AppMetrics;
use crate::monitor::MonitorService;

pub mod health;
pub mod intervals;
pub mod monitors;
pub mod stats;

/// Shared state for every `/api` route.
pub type MonitorState = Arc<MonitorService>;

/// Assemble the full router served by the binary.
pub fn create_router(service: MonitorState, metrics: Arc<AppMetrics>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/metrics",
            get(move || {
                let metrics = metrics.clone();
                async move { render_metrics(&metrics) }
            }),
        )
        .merge(monitors::create_monitors_router(service.clone()))
        .merge(intervals::create_intervals_router(service.clone()))
        .merge(stats::create_stats_router(service))
        .layer(CorsLayer::permissive())
}

fn render_metrics(metrics: &AppMetrics) -> Response {
    let (status, content_type, body) = match metrics.render() {
        Ok(body) => (StatusCode::OK, "text/plain; version=0.0.4", body),
        Err(err) => {
            tracing::error!("Rendering metrics failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                "metrics error".to_string(),
            )
        }
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static(content_type),
    );
    response
}
