//! Polling/caching/serving engine for the AWS resource exporter.
//!
//! One background refresh loop per resource kind fetches upstream data on a
//! fixed interval and writes complete [`MetricSnapshot`]s into the
//! [`cache::MetricCache`]. Scrapes are served entirely from the cache through
//! [`collector::CachedCollector`], so scrape latency never depends on cloud
//! API latency.

pub mod cache;
pub mod collector;
pub mod config;
pub mod metrics;
pub mod scheduler;


use anyhow::Result;
use prometheus::proto::MetricFamily;
use prometheus::Registry;
use std::fmt;
use std::str::FromStr;

/// Prometheus namespace shared by resource metrics and self-metrics.
pub const METRIC_NAMESPACE: &str = "arex";

/// One category of AWS resource the exporter watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Rds,
    Vpc,
    Route53,
    Ec2,
}

impl ResourceKind {
    /// All supported kinds, in config-file order.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Rds,
        ResourceKind::Vpc,
        ResourceKind::Route53,
        ResourceKind::Ec2,
    ];

    /// Lowercase name used as config key, metric label and log field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Rds => "rds",
            ResourceKind::Vpc => "vpc",
            ResourceKind::Route53 => "route53",
            ResourceKind::Ec2 => "ec2",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rds" => Ok(ResourceKind::Rds),
            "vpc" => Ok(ResourceKind::Vpc),
            "route53" => Ok(ResourceKind::Route53),
            "ec2" => Ok(ResourceKind::Ec2),
            other => Err(format!("unknown resource kind: {other}")),
        }
    }
}

/// A complete set of metric families produced by one successful fetch for one
/// resource kind and region.
///
/// Snapshots are opaque to the engine and swapped into the cache whole, so a
/// scrape observes either a full prior snapshot or nothing, never a partial
/// update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSnapshot {
    families: Vec<MetricFamily>,
}

impl MetricSnapshot {
    pub fn new(families: Vec<MetricFamily>) -> Self {
        Self { families }
    }

    /// Captures everything currently registered in `registry`.
    ///
    /// Fetchers build each snapshot in a fresh local registry and hand it over
    /// with this, keeping snapshot construction away from the shared registry
    /// the scrape path gathers.
    pub fn from_registry(registry: &Registry) -> Self {
        Self::new(registry.gather())
    }

    pub fn families(&self) -> &[MetricFamily] {
        &self.families
    }

    pub fn into_families(self) -> Vec<MetricFamily> {
        self.families
    }

    /// Total number of samples across all families.
    pub fn sample_count(&self) -> usize {
        self.families.iter().map(|mf| mf.get_metric().len()).sum()
    }
}

/// A resource-kind adapter that turns one region's worth of cloud API
/// responses into a [`MetricSnapshot`].
///
/// Implementations are called only by the refresh scheduler, never by the
/// scrape path. The trait requires `Send + Sync` because each kind's loop
/// runs as an independent tokio task.
#[async_trait::async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// The resource kind this fetcher serves.
    fn kind(&self) -> ResourceKind;

    /// Static descriptors for every metric family `fetch` can emit, computed
    /// once at construction.
    fn descs(&self) -> Vec<prometheus::core::Desc>;

    /// Fetches current values for one region.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream API call or response decoding fails.
    /// The scheduler records the error in the cache entry and keeps the
    /// previous snapshot.
    async fn fetch(&self, region: &str) -> Result<MetricSnapshot>;
}
