use axum::{
    http::{header, HeaderValue},
    response::IntoResponse,
};

/// Liveness probe. Never cached.
pub async fn health() -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        "ok",
    )
}
