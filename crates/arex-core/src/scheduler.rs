//! One independent refresh loop per resource kind.

use crate::cache::{CacheKey, MetricCache};
use crate::config::ResourceKindConfig;
use crate::metrics::ExporterMetrics;
use crate::ResourceFetcher;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// Bound applied to fetches for kinds without a configured timeout.
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Spawns the refresh loop for one resource kind.
///
/// The loop ticks every `config.interval`; the first tick fires immediately
/// so metrics exist without waiting a full interval after startup. It runs
/// until the returned handle is aborted at shutdown. Loops never communicate
/// with each other; the cache is the only shared state.
pub fn spawn_refresh_loop(
    fetcher: Arc<dyn ResourceFetcher>,
    config: ResourceKindConfig,
    cache: Arc<MetricCache>,
    metrics: ExporterMetrics,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_refresh_loop(fetcher, config, cache, metrics).await;
    })
}

async fn run_refresh_loop(
    fetcher: Arc<dyn ResourceFetcher>,
    config: ResourceKindConfig,
    cache: Arc<MetricCache>,
    metrics: ExporterMetrics,
) {
    let kind = fetcher.kind();
    tracing::info!(
        kind = %kind,
        interval_secs = config.interval.as_secs(),
        regions = ?config.regions,
        "Starting refresh loop"
    );

    let mut tick = interval(config.interval);
    // A fetch cycle that overruns the interval skips the missed ticks instead
    // of firing them back to back.
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tick.tick().await;
        refresh_all_regions(fetcher.as_ref(), &config, &cache, &metrics).await;
    }
}

/// Runs one refresh cycle: fetches every configured region in order, writing
/// each region's outcome into the cache independently. A failure or timeout
/// in one region never invalidates another region's result from the same
/// cycle, and never erases that region's previous snapshot.
pub(crate) async fn refresh_all_regions(
    fetcher: &dyn ResourceFetcher,
    config: &ResourceKindConfig,
    cache: &MetricCache,
    metrics: &ExporterMetrics,
) {
    let kind = fetcher.kind();
    let bound = config.timeout.unwrap_or(FALLBACK_TIMEOUT);
    for region in &config.regions {
        let key = CacheKey::new(kind, region.as_str());
        let started = Instant::now();
        match timeout(bound, fetcher.fetch(region)).await {
            Ok(Ok(snapshot)) => {
                cache.put(key, snapshot);
                metrics.record_refresh_success(kind);
                tracing::debug!(
                    kind = %kind,
                    region = %region,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Refreshed"
                );
            }
            Ok(Err(e)) => {
                cache.record_failure(key, format!("{e:#}"));
                metrics.record_refresh_failure(kind);
                tracing::warn!(kind = %kind, region = %region, error = %e, "Refresh failed");
            }
            Err(_) => {
                cache.record_failure(key, format!("fetch timed out after {bound:?}"));
                metrics.record_refresh_failure(kind);
                tracing::warn!(
                    kind = %kind,
                    region = %region,
                    timeout = ?bound,
                    "Refresh timed out"
                );
            }
        }
    }
}
