//! Per-video polling scheduler.
//!
//! Every monitored video owns exactly one job: a spawned task with its own
//! interval timer, so a slow or failing fetch for one video never delays
//! another. On each tick the job fetches the video's counters and appends
//! them to the stats log.
//!
//! A job's period lives in a `watch` channel; rescheduling sends a new
//! period to the running task instead of replacing it. Removal and shutdown
//! cancel the job's token, which takes effect before the next tick; a tick
//! that is already fetching runs to completion.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::fetcher::MetricsFetcher;
use crate::interval::validate_interval;
use crate::metrics::AppMetrics;
use crate::store::DataStore;
use crate::types::{VideoId, VideoInfo};

/// Fetcher shared by every job.
pub type SharedFetcher = Arc<dyn MetricsFetcher + Send + Sync>;

/// Everything a tick needs. Cloned into each job task.
#[derive(Clone)]
struct Collector {
    store: Arc<DataStore>,
    fetcher: SharedFetcher,
    metrics: Option<Arc<AppMetrics>>,
}

impl Collector {
    /// Fetch and append one record. Failures skip the tick and are only logged.
    async fn poll_once(&self, bvid: &str) -> bool {
        if let Some(metrics) = &self.metrics {
            metrics.polls_total.inc();
        }

        let stat = match self.fetcher.fetch_stat(bvid).await {
            Ok(stat) => stat,
            Err(err) => {
                tracing::warn!("Polling {} failed, skipping tick: {}", bvid, err);
                self.count_error();
                return false;
            }
        };

        if let Err(err) = self.store.append_stat(&stat).await {
            tracing::error!("Storing stat for {} failed, skipping tick: {}", bvid, err);
            self.count_error();
            return false;
        }

        if let Some(metrics) = &self.metrics {
            metrics.records_appended_total.inc();
        }
        true
    }

    fn count_error(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.poll_errors_total.inc();
        }
    }
}

struct JobHandle {
    period_tx: watch::Sender<Duration>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the job table. One instance per process, shared behind an `Arc`.
pub struct Scheduler {
    collector: Collector,
    jobs: Mutex<HashMap<VideoId, JobHandle>>,
    root: CancellationToken,
}

impl Scheduler {
    pub fn new(store: Arc<DataStore>, fetcher: SharedFetcher) -> Self {
        Self {
            collector: Collector {
                store,
                fetcher,
                metrics: None,
            },
            jobs: Mutex::new(HashMap::new()),
            root: CancellationToken::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.collector.metrics = Some(metrics);
        self
    }

    /// Create a job for every monitored video. Returns how many were started.
    ///
    /// A video whose interval cannot be resolved is logged and left out;
    /// the others still start.
    pub async fn start_all(&self) -> Result<usize, AppError> {
        let ids = self.collector.store.monitored_ids().await?;
        let mut started = 0;
        for bvid in &ids {
            match self.add_job(bvid).await {
                Ok(()) => started += 1,
                Err(err) => tracing::error!("Could not schedule {}: {}", bvid, err),
            }
        }

        tracing::info!(
            "Scheduler started: {} of {} monitored videos polling via {}",
            started,
            ids.len(),
            self.collector.fetcher.provider_name()
        );
        Ok(started)
    }

    /// Start polling `bvid` at its effective interval, replacing any
    /// existing job for it. The first tick comes one interval from now.
    pub async fn add_job(&self, bvid: &str) -> Result<(), AppError> {
        let mut jobs = self.jobs.lock().await;
        let secs = self.collector.store.effective_interval(bvid).await?;
        self.insert_job(&mut jobs, bvid, secs)
    }

    /// Stop polling `bvid`. Returns `false` if it had no job.
    pub async fn remove_job(&self, bvid: &str) -> bool {
        let removed = {
            let mut jobs = self.jobs.lock().await;
            let removed = jobs.remove(bvid);
            self.set_active_jobs(jobs.len());
            removed
        };

        match removed {
            Some(job) => {
                job.cancel.cancel();
                tracing::info!("Removed polling job for {}", bvid);
                true
            }
            None => false,
        }
    }

    /// Change the period of `bvid`'s job in place. The new period starts
    /// counting now. Without an existing job, one is created at `secs`.
    pub async fn reschedule_job(&self, bvid: &str, secs: u64) -> Result<(), AppError> {
        let mut jobs = self.jobs.lock().await;
        self.apply_period(&mut jobs, bvid, secs)
    }

    /// Resolve `bvid`'s effective interval and apply it to its job.
    ///
    /// Resolution happens under the job table lock, so concurrent callers
    /// apply in the same order they read the store. Returns the period set.
    pub async fn sync_job(&self, bvid: &str) -> Result<u64, AppError> {
        let mut jobs = self.jobs.lock().await;
        let secs = self.collector.store.effective_interval(bvid).await?;
        self.apply_period(&mut jobs, bvid, secs)?;
        Ok(secs)
    }

    /// Move every monitored video without an override to the global
    /// default. Returns how many jobs were rescheduled.
    ///
    /// `default_secs` is the default just persisted; each follower is
    /// re-resolved under the job table lock so an override set meanwhile
    /// is never clobbered.
    pub async fn reschedule_followers(&self, default_secs: u64) -> Result<usize, AppError> {
        let store = &self.collector.store;
        let mut rescheduled = 0;

        for bvid in store.monitored_ids().await? {
            let mut jobs = self.jobs.lock().await;
            if store.video_interval(&bvid).await?.is_some() {
                continue;
            }
            let secs = store.effective_interval(&bvid).await?;
            self.apply_period(&mut jobs, &bvid, secs)?;
            rescheduled += 1;
        }

        tracing::info!(
            "Global interval now {}s, {} following jobs rescheduled",
            default_secs,
            rescheduled
        );
        Ok(rescheduled)
    }

    /// Cancel every job. Idempotent; no job can be added afterwards.
    pub async fn shutdown(&self) {
        self.root.cancel();

        let mut jobs = self.jobs.lock().await;
        let stopped = jobs.len();
        for (_, job) in jobs.drain() {
            job.cancel.cancel();
        }
        self.set_active_jobs(0);

        if stopped > 0 {
            tracing::info!("Scheduler stopped, {} jobs cancelled", stopped);
        }
    }

    /// Run one tick for `bvid` outside its schedule.
    pub async fn poll_once(&self, bvid: &str) -> bool {
        self.collector.poll_once(bvid).await
    }

    /// First collection for a newly added video: fetch and cache its info
    /// if none is stored yet, then fetch and append one stat record.
    pub async fn collect_one(&self, bvid: &str) -> Result<VideoInfo, AppError> {
        let store = &self.collector.store;
        let fetcher = &self.collector.fetcher;

        let info = match store.video_info(bvid).await? {
            Some(info) => info,
            None => {
                let info = fetcher.fetch_info(bvid).await?;
                store.save_info(info.clone()).await?;
                info
            }
        };

        let stat = fetcher.fetch_stat(bvid).await?;
        store.append_stat(&stat).await?;
        Ok(info)
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Current period of `bvid`'s job in seconds, if it has one.
    pub async fn job_interval(&self, bvid: &str) -> Option<u64> {
        self.jobs
            .lock()
            .await
            .get(bvid)
            .map(|job| job.period_tx.borrow().as_secs())
    }

    pub async fn scheduled_ids(&self) -> Vec<VideoId> {
        let mut ids: Vec<VideoId> = self.jobs.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn apply_period(
        &self,
        jobs: &mut HashMap<VideoId, JobHandle>,
        bvid: &str,
        secs: u64,
    ) -> Result<(), AppError> {
        match jobs.get(bvid) {
            Some(job) => {
                validate_interval(secs)?;
                if *job.period_tx.borrow() != Duration::from_secs(secs) {
                    job.period_tx.send_replace(Duration::from_secs(secs));
                    tracing::info!("Rescheduled {} to every {}s", bvid, secs);
                }
                Ok(())
            }
            None => self.insert_job(jobs, bvid, secs),
        }
    }

    fn insert_job(
        &self,
        jobs: &mut HashMap<VideoId, JobHandle>,
        bvid: &str,
        secs: u64,
    ) -> Result<(), AppError> {
        if self.root.is_cancelled() {
            tracing::warn!("Scheduler is shut down, not scheduling {}", bvid);
            return Err(AppError::SchedulerStopped);
        }
        validate_interval(secs)?;

        let previous = jobs.remove(bvid).map(|old| {
            old.cancel.cancel();
            old.task
        });
        let replaced = previous.is_some();

        let period = Duration::from_secs(secs);
        let (period_tx, period_rx) = watch::channel(period);
        let cancel = self.root.child_token();
        let task = tokio::spawn(run_job(
            self.collector.clone(),
            bvid.to_string(),
            period_rx,
            cancel.clone(),
            previous,
        ));

        jobs.insert(
            bvid.to_string(),
            JobHandle {
                period_tx,
                cancel,
                task,
            },
        );
        self.set_active_jobs(jobs.len());

        if replaced {
            tracing::info!("Replaced polling job for {} (every {}s)", bvid, secs);
        } else {
            tracing::info!("Added polling job for {} (every {}s)", bvid, secs);
        }
        Ok(())
    }

    fn set_active_jobs(&self, count: usize) {
        if let Some(metrics) = &self.collector.metrics {
            metrics.active_jobs.set(count as f64);
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Body of one job task.
///
/// Ticks run one at a time. Each tick executes in its own task so a panic
/// in the fetcher or the store ends that tick only.
async fn run_job(
    collector: Collector,
    bvid: VideoId,
    mut period_rx: watch::Receiver<Duration>,
    cancel: CancellationToken,
    previous: Option<JoinHandle<()>>,
) {
    // The job being replaced may still be mid-tick.
    if let Some(previous) = previous {
        if let Err(err) = previous.await {
            tracing::warn!("Previous job for {} ended abnormally: {}", bvid, err);
        }
    }

    let mut interval = ticker(*period_rx.borrow_and_update());

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            changed = period_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                interval = ticker(*period_rx.borrow_and_update());
            }

            _ = interval.tick() => {
                let tick = tokio::spawn({
                    let collector = collector.clone();
                    let bvid = bvid.clone();
                    async move { collector.poll_once(&bvid).await }
                });

                if let Err(err) = tick.await {
                    tracing::error!("Poll tick for {} panicked, job continues: {}", bvid, err);
                    collector.count_error();
                }
            }
        }
    }

    tracing::debug!("Polling job for {} stopped", bvid);
}
