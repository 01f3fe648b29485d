//! Metrics Fetcher Interface
//!
//! Abstraction over the upstream video API so the scheduler never depends
//! on a concrete HTTP client.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{VideoInfo, VideoStat};

/// Errors from a metrics fetcher. All of them are expected outcomes: a
/// failed fetch skips one tick and nothing more.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Data format error: {message}")]
    Format { message: String },

    #[error("Upstream rejected request (code {code}): {message}")]
    Upstream { code: i64, message: String },

    #[error("Service unavailable")]
    ServiceUnavailable,
}

/// Result type for fetcher operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Source of video info snapshots and counter observations.
#[async_trait]
pub trait MetricsFetcher {
    /// Fetch the descriptive snapshot of a video.
    async fn fetch_info(&self, bvid: &str) -> FetchResult<VideoInfo>;

    /// Fetch the current counters of a video, stamped with the capture time.
    async fn fetch_stat(&self, bvid: &str) -> FetchResult<VideoStat>;

    /// Get the name of this fetcher for logging/debugging
    fn provider_name(&self) -> &str;
}
