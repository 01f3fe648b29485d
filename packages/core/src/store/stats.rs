//! Append-only stats log.
//!
//! One JSON [`VideoStat`] per line in `{bvid}_stats.jsonl`. The log is
//! never rewritten; the only writer besides [`DataStore::append_stat`] is
//! the one-time move of stats embedded in a legacy metadata record.

use std::collections::HashMap;
use std::io::{ErrorKind, SeekFrom};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::{write_json_atomic, DataStore};
use crate::error::AppError;
use crate::types::VideoStat;

/// Bytes read from the end of the log to answer [`DataStore::latest_stat`].
pub const TAIL_WINDOW_BYTES: u64 = 4096;

impl DataStore {
    /// Append one record to the video's log.
    pub async fn append_stat(&self, stat: &VideoStat) -> Result<(), AppError> {
        self.ensure_migrated(&stat.bvid).await?;

        let mut line = serde_json::to_vec(stat)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.stats_file(&stat.bvid))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        tracing::debug!("Appended stat for {} (view={})", stat.bvid, stat.view);
        Ok(())
    }

    /// Records for `bvid`, oldest first. With `limit`, only the most recent
    /// `limit` records are returned, still oldest first.
    pub async fn read_stats(
        &self,
        bvid: &str,
        limit: Option<usize>,
    ) -> Result<Vec<VideoStat>, AppError> {
        self.ensure_migrated(bvid).await?;

        let raw = match fs::read(self.stats_file(bvid)).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut stats = parse_lines(bvid, &raw);
        if let Some(limit) = limit {
            let skip = stats.len().saturating_sub(limit);
            stats.drain(..skip);
        }
        Ok(stats)
    }

    /// Most recent record for `bvid`, if any.
    ///
    /// Parses only the last line inside a [`TAIL_WINDOW_BYTES`] window at the
    /// end of the log. Falls back to a full scan when that window holds no
    /// complete, well-formed line (a record larger than the window, or a
    /// torn final write).
    pub async fn latest_stat(&self, bvid: &str) -> Result<Option<VideoStat>, AppError> {
        self.ensure_migrated(bvid).await?;

        let mut file = match File::open(self.stats_file(bvid)).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let size = file.metadata().await?.len();
        if size == 0 {
            return Ok(None);
        }

        let window = size.min(TAIL_WINDOW_BYTES);
        file.seek(SeekFrom::Start(size - window)).await?;
        let mut tail = Vec::with_capacity(window as usize);
        file.read_to_end(&mut tail).await?;

        if let Some(stat) = last_complete_record(&tail, window == size) {
            return Ok(Some(stat));
        }

        tracing::debug!("Tail read missed for {}, scanning full log", bvid);
        Ok(self.read_stats(bvid, None).await?.pop())
    }

    /// Move stats embedded in a legacy metadata record into the log, once
    /// per video per process.
    pub async fn ensure_migrated(&self, bvid: &str) -> Result<(), AppError> {
        if self.migrated.lock().await.contains(bvid) {
            return Ok(());
        }

        self.migrate_legacy_stats(bvid).await?;
        self.migrated.lock().await.insert(bvid.to_string());
        Ok(())
    }

    /// Returns the number of records appended to the log.
    ///
    /// The log append is flushed to disk before the metadata record is
    /// rewritten without its `stats` array. If the process dies in between,
    /// the next run finds the array again; records already present in the
    /// log are matched one-for-one and skipped, so nothing is counted twice.
    async fn migrate_legacy_stats(&self, bvid: &str) -> Result<usize, AppError> {
        let meta_path = self.meta_file(bvid);
        if !fs::try_exists(&meta_path).await? {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;
        let mut meta = self.load_meta(bvid).await?;
        let legacy = match meta.legacy_stats.take() {
            Some(legacy) => legacy,
            None => return Ok(0),
        };

        let stats_path = self.stats_file(bvid);
        let mut already_logged: HashMap<String, usize> = HashMap::new();
        match fs::read(&stats_path).await {
            Ok(raw) => {
                for line in raw.split(|b| *b == b'\n') {
                    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(line) {
                        *already_logged.entry(value.to_string()).or_default() += 1;
                    }
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let mut pending = Vec::new();
        let mut appended = 0;
        for record in &legacy {
            let line = record.to_string();
            match already_logged.get_mut(&line) {
                Some(count) if *count > 0 => *count -= 1,
                _ => {
                    pending.extend_from_slice(line.as_bytes());
                    pending.push(b'\n');
                    appended += 1;
                }
            }
        }

        if !pending.is_empty() {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&stats_path)
                .await?;
            file.write_all(&pending).await?;
            file.sync_all().await?;
        }

        write_json_atomic(&meta_path, &meta).await?;

        tracing::info!(
            "Migrated {} legacy stats for {} ({} already in log)",
            appended,
            bvid,
            legacy.len() - appended
        );
        Ok(appended)
    }
}

/// Decode every non-blank line, skipping (and logging) malformed ones.
fn parse_lines(bvid: &str, raw: &[u8]) -> Vec<VideoStat> {
    raw.split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .filter_map(|line| match serde_json::from_slice(line) {
            Ok(stat) => Some(stat),
            Err(err) => {
                tracing::warn!("Skipping malformed stats line for {}: {}", bvid, err);
                None
            }
        })
        .collect()
}

/// Parse the final line of `tail`.
///
/// `tail` starts at a line boundary only when it covers the whole file
/// (`starts_at_file_start`); otherwise the text before the first newline may
/// be the cut-off end of an earlier record and is never trusted.
fn last_complete_record(tail: &[u8], starts_at_file_start: bool) -> Option<VideoStat> {
    let end = tail.iter().rposition(|b| !b.is_ascii_whitespace())? + 1;
    let body = &tail[..end];

    let line = match body.iter().rposition(|b| *b == b'\n') {
        Some(newline) => &body[newline + 1..],
        None if starts_at_file_start => body,
        None => return None,
    };

    serde_json::from_slice(line).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{at, make_info, make_stat, temp_store};
    use proptest::prelude::*;

    async fn write_legacy_meta(store: &DataStore, bvid: &str, stats: &[VideoStat]) {
        let meta = serde_json::json!({
            "info": make_info(bvid),
            "interval": 15,
            "stats": stats,
        });
        std::fs::write(store.meta_file(bvid), serde_json::to_vec_pretty(&meta).unwrap()).unwrap();
    }

    fn log_lines(store: &DataStore, bvid: &str) -> usize {
        std::fs::read_to_string(store.stats_file(bvid))
            .map(|s| s.lines().filter(|l| !l.trim().is_empty()).count())
            .unwrap_or(0)
    }

    // ---- append / read ----

    #[tokio::test]
    async fn read_of_unknown_video_is_empty() {
        let (store, _dir) = temp_store().await;
        assert!(store.read_stats("BV404", None).await.unwrap().is_empty());
        assert!(store.latest_stat("BV404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn limited_read_keeps_most_recent_window_in_order() {
        let (store, _dir) = temp_store().await;
        let t1 = make_stat("E2", 100, at(0, 1));
        let t2 = make_stat("E2", 200, at(0, 2));
        let t3 = make_stat("E2", 300, at(0, 3));
        for stat in [&t1, &t2, &t3] {
            store.append_stat(stat).await.unwrap();
        }

        assert_eq!(store.read_stats("E2", Some(2)).await.unwrap(), vec![t2, t3.clone()]);
        assert_eq!(store.latest_stat("E2").await.unwrap(), Some(t3));
        assert_eq!(store.read_stats("E2", None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn limit_larger_than_log_returns_everything() {
        let (store, _dir) = temp_store().await;
        store.append_stat(&make_stat("BV1", 1, at(0, 1))).await.unwrap();
        assert_eq!(store.read_stats("BV1", Some(50)).await.unwrap().len(), 1);
        assert!(store.read_stats("BV1", Some(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn logs_are_kept_per_video() {
        let (store, _dir) = temp_store().await;
        store.append_stat(&make_stat("BV1", 1, at(0, 1))).await.unwrap();
        store.append_stat(&make_stat("BV2", 2, at(0, 2))).await.unwrap();

        assert_eq!(store.read_stats("BV1", None).await.unwrap().len(), 1);
        assert_eq!(store.latest_stat("BV2").await.unwrap().unwrap().view, 2);
    }

    #[tokio::test]
    async fn concurrent_appends_produce_whole_lines() {
        let (store, _dir) = temp_store().await;
        let store = std::sync::Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..32u32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append_stat(&make_stat("BV1", i as u64, at(1, i))).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.read_stats("BV1", None).await.unwrap().len(), 32);
    }

    // ---- tail read ----

    #[tokio::test]
    async fn latest_falls_back_when_record_exceeds_tail_window() {
        let (store, _dir) = temp_store().await;
        store.append_stat(&make_stat("BV1", 1, at(0, 1))).await.unwrap();

        // a single line longer than the window: no newline inside the tail
        let mut giant = make_stat("BV1", 2, at(0, 2));
        giant.bvid = format!("BV1{}", "x".repeat(TAIL_WINDOW_BYTES as usize * 2));
        let mut line = serde_json::to_vec(&giant).unwrap();
        line.push(b'\n');
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(store.stats_file("BV1"))
            .unwrap();
        std::io::Write::write_all(&mut file, &line).unwrap();

        assert_eq!(store.latest_stat("BV1").await.unwrap(), Some(giant));
    }

    #[tokio::test]
    async fn latest_skips_torn_final_line() {
        let (store, _dir) = temp_store().await;
        let good = make_stat("BV1", 7, at(0, 7));
        store.append_stat(&good).await.unwrap();

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(store.stats_file("BV1"))
            .unwrap();
        std::io::Write::write_all(&mut file, br#"{"bvid":"BV1","view":8,"li"#).unwrap();

        assert_eq!(store.latest_stat("BV1").await.unwrap(), Some(good));
        assert_eq!(store.read_stats("BV1", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn latest_of_empty_log_is_none() {
        let (store, _dir) = temp_store().await;
        std::fs::write(store.stats_file("BV1"), b"").unwrap();
        assert!(store.latest_stat("BV1").await.unwrap().is_none());

        std::fs::write(store.stats_file("BV1"), b"\n\n").unwrap();
        assert!(store.latest_stat("BV1").await.unwrap().is_none());
    }

    #[test]
    fn tail_without_newline_is_trusted_only_at_file_start() {
        let stat = make_stat("BV1", 3, at(0, 3));
        let line = serde_json::to_vec(&stat).unwrap();

        assert_eq!(last_complete_record(&line, true), Some(stat));
        assert_eq!(last_complete_record(&line, false), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn latest_matches_last_of_full_read(
            views in prop::collection::vec(0u64..1_000_000, 1..60)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let (store, _dir) = temp_store().await;
                let mut last = None;
                for (i, view) in views.iter().enumerate() {
                    let stat = make_stat("BV1", *view, at((i / 60) as u32, (i % 60) as u32));
                    store.append_stat(&stat).await.unwrap();
                    last = Some(stat);
                }

                let latest = store.latest_stat("BV1").await.unwrap();
                let all = store.read_stats("BV1", None).await.unwrap();
                assert_eq!(latest, last);
                assert_eq!(all.last().cloned(), latest);
                assert_eq!(all.len(), views.len());
            });
        }
    }

    // ---- legacy migration ----

    #[tokio::test]
    async fn legacy_stats_move_into_log_once() {
        let (store, _dir) = temp_store().await;
        let history = vec![make_stat("E3", 10, at(0, 1)), make_stat("E3", 20, at(0, 2))];
        write_legacy_meta(&store, "E3", &history).await;

        assert_eq!(store.read_stats("E3", None).await.unwrap(), history);
        assert_eq!(log_lines(&store, "E3"), 2);

        let meta = store.load_meta("E3").await.unwrap();
        assert!(meta.legacy_stats.is_none());
        assert_eq!(meta.interval_override, Some(15));
        assert_eq!(meta.info, Some(make_info("E3")));

        // second access is a no-op
        assert_eq!(store.read_stats("E3", None).await.unwrap().len(), 2);
        assert_eq!(log_lines(&store, "E3"), 2);
    }

    #[tokio::test]
    async fn rerunning_migration_appends_nothing() {
        let (store, _dir) = temp_store().await;
        let history = vec![make_stat("E3", 10, at(0, 1)), make_stat("E3", 20, at(0, 2))];
        write_legacy_meta(&store, "E3", &history).await;

        assert_eq!(store.migrate_legacy_stats("E3").await.unwrap(), 2);
        assert_eq!(store.migrate_legacy_stats("E3").await.unwrap(), 0);
        assert_eq!(log_lines(&store, "E3"), 2);
    }

    #[tokio::test]
    async fn migration_interrupted_before_meta_rewrite_does_not_duplicate() {
        let (store, _dir) = temp_store().await;
        let history = vec![
            make_stat("E3", 10, at(0, 1)),
            make_stat("E3", 20, at(0, 2)),
            make_stat("E3", 20, at(0, 2)),
        ];
        write_legacy_meta(&store, "E3", &history).await;

        // simulate a crash after the first two records reached the log
        let mut partial = String::new();
        for stat in &history[..2] {
            partial.push_str(&serde_json::to_string(stat).unwrap());
            partial.push('\n');
        }
        std::fs::write(store.stats_file("E3"), partial).unwrap();

        assert_eq!(store.migrate_legacy_stats("E3").await.unwrap(), 1);
        assert_eq!(store.read_stats("E3", None).await.unwrap(), history);
    }

    #[tokio::test]
    async fn append_after_legacy_history_keeps_order() {
        let (store, _dir) = temp_store().await;
        let history = vec![make_stat("E3", 10, at(0, 1))];
        write_legacy_meta(&store, "E3", &history).await;

        let fresh = make_stat("E3", 30, at(0, 3));
        store.append_stat(&fresh).await.unwrap();

        let all = store.read_stats("E3", None).await.unwrap();
        assert_eq!(all, vec![history[0].clone(), fresh.clone()]);
        assert_eq!(store.latest_stat("E3").await.unwrap(), Some(fresh));
    }

    #[tokio::test]
    async fn meta_without_legacy_array_is_left_untouched() {
        let (store, _dir) = temp_store().await;
        store.save_info(make_info("BV1")).await.unwrap();
        let before = std::fs::read(store.meta_file("BV1")).unwrap();

        store.ensure_migrated("BV1").await.unwrap();

        assert_eq!(std::fs::read(store.meta_file("BV1")).unwrap(), before);
        assert!(!store.stats_file("BV1").exists());
    }
}
