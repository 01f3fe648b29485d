//! Prometheus metrics registry for the video monitor.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and pass it
//! to the scheduler and the HTTP router.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`).

use prometheus::{Counter, Gauge, Opts, Registry};

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Poll ticks started across all videos (success + failure).
    pub polls_total: Counter,
    /// Poll ticks skipped because the fetch or the append failed.
    pub poll_errors_total: Counter,
    /// Stats records appended to the per-video logs.
    pub records_appended_total: Counter,
    /// Polling jobs currently held by the scheduler.
    pub active_jobs: Gauge,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics. Returns an error if any metric
    /// name is invalid or duplicated.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let polls_total = Counter::with_opts(Opts::new(
            "bv_monitor_polls_total",
            "Poll ticks started across all monitored videos",
        ))?;

        let poll_errors_total = Counter::with_opts(Opts::new(
            "bv_monitor_poll_errors_total",
            "Poll ticks skipped after a fetch or append failure",
        ))?;

        let records_appended_total = Counter::with_opts(Opts::new(
            "bv_monitor_records_appended_total",
            "Stats records appended to the per-video logs",
        ))?;

        let active_jobs = Gauge::with_opts(Opts::new(
            "bv_monitor_active_jobs",
            "Polling jobs currently scheduled",
        ))?;

        registry.register(Box::new(polls_total.clone()))?;
        registry.register(Box::new(poll_errors_total.clone()))?;
        registry.register(Box::new(records_appended_total.clone()))?;
        registry.register(Box::new(active_jobs.clone()))?;

        Ok(Self {
            polls_total,
            poll_errors_total,
            records_appended_total,
            active_jobs,
            registry,
        })
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}
