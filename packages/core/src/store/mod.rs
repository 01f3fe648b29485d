//! File-backed persistence for the global config, the monitor set,
//! per-video metadata and the per-video stats logs.
//!
//! Layout under the data directory:
//!
//! ```text
//! _config.json         global config (merge-on-read with defaults)
//! _monitors.json       ordered list of monitored video ids
//! {bvid}.json          metadata: info snapshot + optional interval override
//! {bvid}_stats.jsonl   append-only stats log, one JSON record per line
//! ```
//!
//! Every write path takes the same coarse `write_lock` around its
//! read-modify-write sequence. Reads take no lock: wholesale rewrites go
//! through a temp file and a rename, and the stats log is only appended
//! to, so a reader sees either the old or the new state (the log may end
//! in a line still being written, which the readers skip).

mod config;
mod registry;
mod stats;

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::types::VideoId;

pub use config::{ConfigPatch, GlobalConfig};
pub use registry::VideoMeta;
pub use stats::TAIL_WINDOW_BYTES;

const CONFIG_FILE: &str = "_config.json";
const MONITORS_FILE: &str = "_monitors.json";

/// Durable store shared by the scheduler and the control surface.
///
/// Construct once at startup and share behind an `Arc`.
#[derive(Debug)]
pub struct DataStore {
    root: PathBuf,
    write_lock: Mutex<()>,
    /// Videos whose legacy embedded stats have been checked this process.
    migrated: Mutex<HashSet<VideoId>>,
}

impl DataStore {
    /// Open (creating if needed) the data directory at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        tracing::info!("Data store opened at {}", root.display());

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
            migrated: Mutex::new(HashSet::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    fn monitors_file(&self) -> PathBuf {
        self.root.join(MONITORS_FILE)
    }

    fn meta_file(&self, bvid: &str) -> PathBuf {
        self.root.join(format!("{}.json", bvid))
    }

    fn stats_file(&self, bvid: &str) -> PathBuf {
        self.root.join(format!("{}_stats.jsonl", bvid))
    }
}

/// Read and decode a JSON file; `None` when it does not exist.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, AppError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Replace `path` with the pretty-printed JSON of `value`.
///
/// Writes a sibling temp file first and renames it over the target.
/// Callers hold the store's write lock, so the temp name cannot collide.
async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let json = serde_json::to_vec_pretty(value)?;

    let tmp_name = format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("record"),
        std::process::id()
    );
    let tmp_path = path
        .parent()
        .map(|p| p.join(&tmp_name))
        .unwrap_or_else(|| PathBuf::from(&tmp_name));

    fs::write(&tmp_path, json).await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<bool, AppError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::TempDir;

    use super::DataStore;
    use crate::types::{StatCounters, VideoInfo, VideoStat};

    pub async fn temp_store() -> (DataStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = DataStore::open(dir.path()).await.unwrap();
        (store, dir)
    }

    pub fn at(minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 20)
            .and_then(|d| d.and_hms_opt(10, minute, second))
            .unwrap()
    }

    pub fn make_stat(bvid: &str, view: u64, timestamp: NaiveDateTime) -> VideoStat {
        VideoStat::new(
            bvid,
            StatCounters {
                view,
                like: view / 10,
                ..Default::default()
            },
            timestamp,
        )
    }

    pub fn make_info(bvid: &str) -> VideoInfo {
        VideoInfo {
            bvid: bvid.to_string(),
            title: format!("Title of {}", bvid),
            pic: "https://example.invalid/cover.jpg".to_string(),
            owner_name: "owner".to_string(),
            desc: "desc".to_string(),
        }
    }
}
