//! Monitor set and per-video metadata.

use serde::{Deserialize, Serialize};

use super::{read_json, remove_if_exists, write_json_atomic, DataStore};
use crate::error::AppError;
use crate::interval::{is_allowed_interval, resolve, validate_interval};
use crate::types::{VideoId, VideoInfo};

/// Contents of `{bvid}.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<VideoInfo>,

    /// `None` means the video follows the global default.
    #[serde(rename = "interval", default, skip_serializing_if = "Option::is_none")]
    pub interval_override: Option<u64>,

    /// Stats embedded by older deployments. Moved into the stats log on
    /// first access and never written back.
    #[serde(rename = "stats", default, skip_serializing_if = "Option::is_none")]
    pub legacy_stats: Option<Vec<serde_json::Value>>,
}

impl DataStore {
    // ---- Monitor set ----

    /// Ids currently under polling, in the order they were added.
    pub async fn monitored_ids(&self) -> Result<Vec<VideoId>, AppError> {
        Ok(read_json(&self.monitors_file()).await?.unwrap_or_default())
    }

    pub async fn is_monitored(&self, bvid: &str) -> Result<bool, AppError> {
        Ok(self.monitored_ids().await?.iter().any(|id| id == bvid))
    }

    /// Add `bvid` to the monitor set. Returns `false` if it was already there.
    pub async fn add_monitor(&self, bvid: &str) -> Result<bool, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut monitors = self.monitored_ids().await?;
        if monitors.iter().any(|id| id == bvid) {
            return Ok(false);
        }

        monitors.push(bvid.to_string());
        write_json_atomic(&self.monitors_file(), &monitors).await?;
        Ok(true)
    }

    /// Remove `bvid` from the monitor set. Returns `false` if it was absent.
    pub async fn remove_monitor(&self, bvid: &str) -> Result<bool, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut monitors = self.monitored_ids().await?;
        let before = monitors.len();
        monitors.retain(|id| id != bvid);
        if monitors.len() == before {
            return Ok(false);
        }

        write_json_atomic(&self.monitors_file(), &monitors).await?;
        Ok(true)
    }

    // ---- Metadata ----

    pub async fn load_meta(&self, bvid: &str) -> Result<VideoMeta, AppError> {
        Ok(read_json(&self.meta_file(bvid)).await?.unwrap_or_default())
    }

    /// Read-modify-write of one metadata record under the write lock.
    async fn update_meta<F>(&self, bvid: &str, apply: F) -> Result<VideoMeta, AppError>
    where
        F: FnOnce(&mut VideoMeta),
    {
        let _guard = self.write_lock.lock().await;
        let mut meta = self.load_meta(bvid).await?;
        apply(&mut meta);
        write_json_atomic(&self.meta_file(bvid), &meta).await?;
        Ok(meta)
    }

    pub async fn video_info(&self, bvid: &str) -> Result<Option<VideoInfo>, AppError> {
        Ok(self.load_meta(bvid).await?.info)
    }

    pub async fn save_info(&self, info: VideoInfo) -> Result<(), AppError> {
        let bvid = info.bvid.clone();
        self.update_meta(&bvid, |meta| meta.info = Some(info)).await?;
        Ok(())
    }

    /// Per-video override, or `None` when the video follows the default.
    ///
    /// A stored override outside the allowed set is ignored.
    pub async fn video_interval(&self, bvid: &str) -> Result<Option<u64>, AppError> {
        let stored = self.load_meta(bvid).await?.interval_override;
        match stored {
            Some(secs) if !is_allowed_interval(secs) => {
                tracing::warn!(
                    "Stored interval {}s for {} is not allowed, following the default",
                    secs,
                    bvid
                );
                Ok(None)
            }
            _ => Ok(stored),
        }
    }

    pub async fn set_video_interval(&self, bvid: &str, secs: Option<u64>) -> Result<(), AppError> {
        if let Some(secs) = secs {
            validate_interval(secs)?;
        }
        self.update_meta(bvid, |meta| meta.interval_override = secs).await?;
        Ok(())
    }

    /// Delete the metadata record. The stats log is left in place.
    pub async fn remove_meta(&self, bvid: &str) -> Result<bool, AppError> {
        let _guard = self.write_lock.lock().await;
        remove_if_exists(&self.meta_file(bvid)).await
    }

    /// The period `bvid` should be polled at right now.
    pub async fn effective_interval(&self, bvid: &str) -> Result<u64, AppError> {
        let override_secs = self.video_interval(bvid).await?;
        let config = self.global_config().await?;
        Ok(resolve(override_secs, config.default_interval_seconds))
    }
}
