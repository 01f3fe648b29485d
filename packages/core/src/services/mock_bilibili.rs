//! Scripted in-memory fetcher used by tests and local dry runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::fetcher::{FetchError, FetchResult, MetricsFetcher};
use crate::types::{StatCounters, VideoInfo, VideoStat};

/// Answers every request from scripted state.
///
/// When no stats are queued, each `fetch_stat` call synthesizes a record
/// whose `view` equals the call number and whose timestamp advances one
/// second per call from a fixed epoch.
#[derive(Default)]
pub struct MockBilibiliClient {
    info: Mutex<Option<VideoInfo>>,
    stats: Mutex<VecDeque<VideoStat>>,
    error: Mutex<Option<FetchError>>,
    delay: Option<Duration>,
    info_calls: AtomicUsize,
    stat_calls: AtomicUsize,
}

impl MockBilibiliClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_info(self, info: VideoInfo) -> Self {
        *lock(&self.info) = Some(info);
        self
    }

    pub fn with_stats(self, stats: Vec<VideoStat>) -> Self {
        lock(&self.stats).extend(stats);
        self
    }

    pub fn with_error(self, error: FetchError) -> Self {
        *lock(&self.error) = Some(error);
        self
    }

    /// Make every fetch sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Switch the forced error on or off while jobs are running.
    pub fn set_error(&self, error: Option<FetchError>) {
        *lock(&self.error) = error;
    }

    pub fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }

    pub fn stat_calls(&self) -> usize {
        self.stat_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn forced_error(&self) -> Option<FetchError> {
        lock(&self.error).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn synthetic_time(call: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t + chrono::Duration::seconds(call as i64))
        .unwrap_or_default()
}

#[async_trait]
impl MetricsFetcher for MockBilibiliClient {
    async fn fetch_info(&self, bvid: &str) -> FetchResult<VideoInfo> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(err) = self.forced_error() {
            return Err(err);
        }

        let scripted = lock(&self.info).clone();
        Ok(scripted.unwrap_or_else(|| VideoInfo {
            bvid: bvid.to_string(),
            title: format!("Video {}", bvid),
            pic: format!("https://example.invalid/{}.jpg", bvid),
            owner_name: "mock".to_string(),
            desc: String::new(),
        }))
    }

    async fn fetch_stat(&self, bvid: &str) -> FetchResult<VideoStat> {
        let call = self.stat_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.pause().await;
        if let Some(err) = self.forced_error() {
            return Err(err);
        }

        if let Some(stat) = lock(&self.stats).pop_front() {
            return Ok(stat);
        }

        let counters = StatCounters {
            view: call as u64,
            ..Default::default()
        };
        Ok(VideoStat::new(bvid, counters, synthetic_time(call)))
    }

    fn provider_name(&self) -> &str {
        "mock-bilibili"
    }
}
