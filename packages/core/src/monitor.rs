//! Control surface over the store and the scheduler.
//!
//! Every mutation is validated here, persisted through [`DataStore`], and
//! then mirrored into the [`Scheduler`] so the job table always matches the
//! monitor set and the resolved intervals.

use std::sync::Arc;

use serde::Serialize;

use crate::error::AppError;
use crate::interval::{resolve, validate_interval};
use crate::scheduler::Scheduler;
use crate::store::DataStore;
use crate::types::{validate_video_id, VideoId, VideoInfo, VideoStat};

/// One row of the monitor listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorEntry {
    pub bvid: VideoId,
    pub info: Option<VideoInfo>,
    pub latest: Option<VideoStat>,
    /// Effective polling period in seconds.
    pub interval: u64,
    #[serde(rename = "override")]
    pub interval_override: Option<u64>,
}

/// Interval settings of one video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntervalView {
    pub interval: u64,
    #[serde(rename = "override")]
    pub interval_override: Option<u64>,
    pub default: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoHistory {
    pub bvid: VideoId,
    pub info: Option<VideoInfo>,
    pub stats: Vec<VideoStat>,
}

pub struct MonitorService {
    store: Arc<DataStore>,
    scheduler: Arc<Scheduler>,
}

impl MonitorService {
    pub fn new(store: Arc<DataStore>, scheduler: Arc<Scheduler>) -> Self {
        Self { store, scheduler }
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Start monitoring `bvid`.
    ///
    /// One collection runs first; if the video cannot be fetched or no job
    /// can be scheduled, nothing is added to the monitor set.
    pub async fn add_video(&self, bvid: &str) -> Result<VideoInfo, AppError> {
        let bvid = validate_video_id(bvid)?;
        let info = self.scheduler.collect_one(bvid).await?;

        // membership first, so a concurrent follower pass sees the video
        let added = self.store.add_monitor(bvid).await?;
        if let Err(err) = self.scheduler.add_job(bvid).await {
            if added {
                self.store.remove_monitor(bvid).await?;
            }
            return Err(err);
        }

        if added {
            tracing::info!("Started monitoring {} ({})", bvid, info.title);
        }
        Ok(info)
    }

    /// Stop monitoring `bvid` and drop its metadata. Collected stats stay.
    pub async fn remove_video(&self, bvid: &str) -> Result<(), AppError> {
        let bvid = validate_video_id(bvid)?;
        if !self.store.is_monitored(bvid).await? {
            return Err(AppError::not_found(format!("{} is not monitored", bvid)));
        }

        // embedded history must reach the log before the record goes away
        self.store.ensure_migrated(bvid).await?;

        self.store.remove_monitor(bvid).await?;
        self.scheduler.remove_job(bvid).await;
        self.store.remove_meta(bvid).await?;

        tracing::info!("Stopped monitoring {}", bvid);
        Ok(())
    }

    pub async fn global_interval(&self) -> Result<u64, AppError> {
        Ok(self.store.global_config().await?.default_interval_seconds)
    }

    /// Persist a new default and move every follower onto it.
    pub async fn set_global_interval(&self, secs: u64) -> Result<u64, AppError> {
        let secs = validate_interval(secs)?;
        let config = self.store.set_default_interval(secs).await?;
        self.scheduler
            .reschedule_followers(config.default_interval_seconds)
            .await?;
        Ok(config.default_interval_seconds)
    }

    pub async fn video_interval(&self, bvid: &str) -> Result<IntervalView, AppError> {
        let bvid = self.require_monitored(bvid).await?;
        let interval_override = self.store.video_interval(bvid).await?;
        let default = self.global_interval().await?;

        Ok(IntervalView {
            interval: resolve(interval_override, default),
            interval_override,
            default,
        })
    }

    /// Set or clear (`None`) the override, then reschedule at the newly
    /// resolved interval.
    pub async fn set_video_interval(
        &self,
        bvid: &str,
        secs: Option<u64>,
    ) -> Result<IntervalView, AppError> {
        let bvid = self.require_monitored(bvid).await?;
        if let Some(secs) = secs {
            validate_interval(secs)?;
        }

        self.store.set_video_interval(bvid, secs).await?;
        self.scheduler.sync_job(bvid).await?;
        self.video_interval(bvid).await
    }

    pub async fn list_videos(&self) -> Result<Vec<MonitorEntry>, AppError> {
        let default = self.global_interval().await?;
        let mut entries = Vec::new();

        for bvid in self.store.monitored_ids().await? {
            let interval_override = self.store.video_interval(&bvid).await?;
            let info = self.store.video_info(&bvid).await?;
            let latest = self.store.latest_stat(&bvid).await?;
            entries.push(MonitorEntry {
                interval: resolve(interval_override, default),
                interval_override,
                info,
                latest,
                bvid,
            });
        }
        Ok(entries)
    }

    /// Cached info and stats of `bvid`, optionally only the last `limit`.
    /// Works for videos no longer monitored as long as data remains.
    pub async fn history(
        &self,
        bvid: &str,
        limit: Option<usize>,
    ) -> Result<VideoHistory, AppError> {
        let bvid = validate_video_id(bvid)?;
        let stats = self.store.read_stats(bvid, limit).await?;
        let info = self.store.video_info(bvid).await?;

        Ok(VideoHistory {
            bvid: bvid.to_string(),
            info,
            stats,
        })
    }

    async fn require_monitored<'a>(&self, bvid: &'a str) -> Result<&'a str, AppError> {
        let bvid = validate_video_id(bvid)?;
        if !self.store.is_monitored(bvid).await? {
            return Err(AppError::not_found(format!("{} is not monitored", bvid)));
        }
        Ok(bvid)
    }
}
