//! Domain records shared by the store, the fetcher and the API.

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Opaque identifier of a monitored video (a bilibili BV number).
pub type VideoId = String;

/// Static snapshot of a video's descriptive data, cached in its metadata record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub bvid: VideoId,
    pub title: String,
    /// Cover image URL.
    pub pic: String,
    pub owner_name: String,
    pub desc: String,
}

/// One observation of a video's counters. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoStat {
    pub bvid: VideoId,
    pub view: u64,
    pub like: u64,
    pub coin: u64,
    pub favorite: u64,
    pub share: u64,
    pub danmaku: u64,
    pub reply: u64,
    /// Local capture time, second precision.
    #[serde(with = "capture_time")]
    pub timestamp: NaiveDateTime,
}

/// Counter values as reported upstream, before a capture time is attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct StatCounters {
    pub view: u64,
    pub like: u64,
    pub coin: u64,
    pub favorite: u64,
    pub share: u64,
    pub danmaku: u64,
    pub reply: u64,
}

impl VideoStat {
    pub fn new(bvid: impl Into<VideoId>, counters: StatCounters, timestamp: NaiveDateTime) -> Self {
        Self {
            bvid: bvid.into(),
            view: counters.view,
            like: counters.like,
            coin: counters.coin,
            favorite: counters.favorite,
            share: counters.share,
            danmaku: counters.danmaku,
            reply: counters.reply,
            timestamp,
        }
    }

    /// Stamp `counters` with the current local time, truncated to whole
    /// seconds so the record survives a round trip through the log unchanged.
    pub fn captured_now(bvid: impl Into<VideoId>, counters: StatCounters) -> Self {
        let now = Local::now().naive_local();
        let now = now.with_nanosecond(0).unwrap_or(now);
        Self::new(bvid, counters, now)
    }
}

/// Reject ids that are empty or could escape the data directory once
/// turned into a file name.
pub fn validate_video_id(bvid: &str) -> Result<&str, AppError> {
    let well_formed = !bvid.is_empty()
        && bvid.len() <= 64
        && !bvid.starts_with('_')
        && bvid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if well_formed {
        Ok(bvid)
    } else {
        Err(AppError::validation(format!("Invalid video id '{}'", bvid)))
    }
}

/// Serde adapter for capture timestamps.
///
/// Writes the legacy `%Y-%m-%d %H:%M:%S` form. Reads that form or RFC 3339.
mod capture_time {
    use chrono::{DateTime, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .or_else(|_| DateTime::parse_from_rfc3339(&raw).map(|dt| dt.naive_local()))
            .map_err(|err| {
                serde::de::Error::custom(format!("invalid timestamp '{}': {}", raw, err))
            })
    }
}
