//! Scrape-side collector that reads only the cache.

use crate::cache::{CacheKey, MetricCache};
use crate::config::ResourceKindConfig;
use crate::{ResourceFetcher, ResourceKind};
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// The collector registered for one resource kind.
///
/// `collect` never initiates a network call: it clones whatever snapshots
/// the kind's refresh loop has cached so far, so scrape latency is bounded
/// by the cache-read cost. Keys with no entry yet (first refresh still
/// pending) simply contribute no samples.
pub struct CachedCollector {
    kind: ResourceKind,
    regions: Vec<String>,
    cache_ttl: Duration,
    cache: Arc<MetricCache>,
    descs: Vec<Desc>,
}

impl CachedCollector {
    pub fn new(
        fetcher: &dyn ResourceFetcher,
        config: &ResourceKindConfig,
        cache: Arc<MetricCache>,
    ) -> Self {
        Self {
            kind: fetcher.kind(),
            regions: config.regions.clone(),
            cache_ttl: config.cache_ttl,
            cache,
            descs: fetcher.descs(),
        }
    }
}

impl Collector for CachedCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut parts = Vec::new();
        for region in &self.regions {
            let key = CacheKey::new(self.kind, region.as_str());
            let Some(entry) = self.cache.get(&key) else {
                continue;
            };
            let stale = entry.is_stale(self.cache_ttl);
            let Some(snapshot) = entry.snapshot else {
                // Every fetch for this key has failed so far.
                continue;
            };
            if stale {
                tracing::debug!(kind = %self.kind, region = %region, "Serving stale snapshot");
            }
            parts.extend(snapshot.into_families());
        }
        merge_families(parts)
    }
}

/// Merges families that share a name into one family per name.
///
/// Per-region snapshots each carry their own copy of a kind's families; the
/// text exposition format allows a metric name to appear only once, so the
/// per-region sample lists are concatenated under a single family.
pub(crate) fn merge_families(parts: Vec<MetricFamily>) -> Vec<MetricFamily> {
    let mut by_name: BTreeMap<String, MetricFamily> = BTreeMap::new();
    for family in parts {
        match by_name.entry(family.get_name().to_string()) {
            Entry::Occupied(mut existing) => {
                let mut family = family;
                for metric in family.take_metric().into_iter() {
                    existing.get_mut().mut_metric().push(metric);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(family);
            }
        }
    }
    by_name.into_values().collect()
}
