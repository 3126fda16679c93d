//! Self-observability instruments, exposed through the same collector
//! contract as resource metrics.

use crate::{ResourceKind, METRIC_NAMESPACE};
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{
    Gauge, GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts,
};
use std::time::Duration;

const SUBSYSTEM: &str = "exporter";

/// Process-wide exporter health metrics.
///
/// The scrape path feeds the scrape counters and duration instruments; each
/// refresh loop feeds the per-kind failure counter and last-success gauge.
/// All handles are shared clones, so the struct itself is cheaply cloneable.
#[derive(Clone)]
pub struct ExporterMetrics {
    scrapes_total: IntCounter,
    scrape_errors_total: IntCounter,
    scrape_duration_seconds: Histogram,
    last_scrape_duration_seconds: Gauge,
    refresh_errors_total: IntCounterVec,
    last_refresh_success_timestamp_seconds: GaugeVec,
}

impl ExporterMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            scrapes_total: IntCounter::with_opts(
                Opts::new("scrapes_total", "Total number of scrapes served.")
                    .namespace(METRIC_NAMESPACE)
                    .subsystem(SUBSYSTEM),
            )?,
            scrape_errors_total: IntCounter::with_opts(
                Opts::new(
                    "scrape_errors_total",
                    "Total number of scrapes that failed to encode.",
                )
                .namespace(METRIC_NAMESPACE)
                .subsystem(SUBSYSTEM),
            )?,
            scrape_duration_seconds: Histogram::with_opts(
                HistogramOpts::new(
                    "scrape_duration_seconds",
                    "Time spent gathering and encoding one scrape.",
                )
                .namespace(METRIC_NAMESPACE)
                .subsystem(SUBSYSTEM),
            )?,
            last_scrape_duration_seconds: Gauge::with_opts(
                Opts::new(
                    "last_scrape_duration_seconds",
                    "Duration of the most recent scrape.",
                )
                .namespace(METRIC_NAMESPACE)
                .subsystem(SUBSYSTEM),
            )?,
            refresh_errors_total: IntCounterVec::new(
                Opts::new(
                    "refresh_errors_total",
                    "Total number of failed refresh fetches per resource kind.",
                )
                .namespace(METRIC_NAMESPACE)
                .subsystem(SUBSYSTEM),
                &["resource_kind"],
            )?,
            last_refresh_success_timestamp_seconds: GaugeVec::new(
                Opts::new(
                    "last_refresh_success_timestamp_seconds",
                    "Unix time of the last successful refresh per resource kind.",
                )
                .namespace(METRIC_NAMESPACE)
                .subsystem(SUBSYSTEM),
                &["resource_kind"],
            )?,
        })
    }

    pub fn record_scrape(&self, duration: Duration, ok: bool) {
        let secs = duration.as_secs_f64();
        self.scrapes_total.inc();
        self.scrape_duration_seconds.observe(secs);
        self.last_scrape_duration_seconds.set(secs);
        if !ok {
            self.scrape_errors_total.inc();
        }
    }

    pub fn record_refresh_success(&self, kind: ResourceKind) {
        self.last_refresh_success_timestamp_seconds
            .with_label_values(&[kind.as_str()])
            .set(chrono::Utc::now().timestamp() as f64);
    }

    pub fn record_refresh_failure(&self, kind: ResourceKind) {
        self.refresh_errors_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn scrape_count(&self) -> u64 {
        self.scrapes_total.get()
    }

    pub fn refresh_error_count(&self, kind: ResourceKind) -> u64 {
        self.refresh_errors_total
            .with_label_values(&[kind.as_str()])
            .get()
    }

    pub fn last_refresh_success_timestamp(&self, kind: ResourceKind) -> f64 {
        self.last_refresh_success_timestamp_seconds
            .with_label_values(&[kind.as_str()])
            .get()
    }
}

impl Collector for ExporterMetrics {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = Vec::new();
        descs.extend(self.scrapes_total.desc());
        descs.extend(self.scrape_errors_total.desc());
        descs.extend(self.scrape_duration_seconds.desc());
        descs.extend(self.last_scrape_duration_seconds.desc());
        descs.extend(self.refresh_errors_total.desc());
        descs.extend(self.last_refresh_success_timestamp_seconds.desc());
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut families = Vec::new();
        families.extend(self.scrapes_total.collect());
        families.extend(self.scrape_errors_total.collect());
        families.extend(self.scrape_duration_seconds.collect());
        families.extend(self.last_scrape_duration_seconds.collect());
        families.extend(self.refresh_errors_total.collect());
        families.extend(self.last_refresh_success_timestamp_seconds.collect());
        families
    }
}
