#![allow(dead_code)]

use anyhow::Result;
use arex_core::cache::MetricCache;
use arex_core::collector::CachedCollector;
use arex_core::config::ResourceKindConfig;
use arex_core::metrics::ExporterMetrics;
use arex_core::{MetricSnapshot, ResourceFetcher, ResourceKind, METRIC_NAMESPACE};
use arex_server::app::{self, AppState};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use prometheus::core::{Collector, Desc};
use prometheus::{GaugeVec, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

pub struct TestContext {
    pub cache: Arc<MetricCache>,
    pub metrics: ExporterMetrics,
    pub app: axum::Router,
}

/// A fetcher that serves a fixed per-region gauge, for driving the cache
/// and collectors without any network.
pub struct StaticFetcher {
    kind: ResourceKind,
    descs: Vec<Desc>,
}

impl StaticFetcher {
    pub fn new(kind: ResourceKind) -> Self {
        let registry = Registry::new();
        let gauge = widgets_gauge(kind, &registry);
        let descs = gauge.desc().into_iter().cloned().collect();
        Self { kind, descs }
    }
}

#[async_trait]
impl ResourceFetcher for StaticFetcher {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn descs(&self) -> Vec<Desc> {
        self.descs.clone()
    }

    async fn fetch(&self, region: &str) -> anyhow::Result<MetricSnapshot> {
        Ok(sample_snapshot(self.kind, region, 1.0))
    }
}

fn widgets_gauge(kind: ResourceKind, registry: &Registry) -> GaugeVec {
    let gauge = GaugeVec::new(
        Opts::new("widgets_usage", "Number of widgets")
            .namespace(METRIC_NAMESPACE)
            .subsystem(kind.as_str()),
        &["region"],
    )
    .expect("gauge should build");
    registry
        .register(Box::new(gauge.clone()))
        .expect("gauge should register");
    gauge
}

/// One-sample snapshot named `arex_{kind}_widgets_usage{region=...}`.
pub fn sample_snapshot(kind: ResourceKind, region: &str, value: f64) -> MetricSnapshot {
    let registry = Registry::new();
    let gauge = widgets_gauge(kind, &registry);
    gauge.with_label_values(&[region]).set(value);
    MetricSnapshot::from_registry(&registry)
}

pub fn kind_config(regions: &[&str]) -> ResourceKindConfig {
    ResourceKindConfig {
        enabled: true,
        interval: Duration::from_secs(15),
        cache_ttl: Duration::from_secs(35),
        timeout: Some(Duration::from_secs(10)),
        regions: regions.iter().map(|r| r.to_string()).collect(),
    }
}

/// Builds an app with one cached collector per `(kind, regions)` pair, all
/// backed by the returned cache.
pub fn build_test_context(kinds: &[(ResourceKind, Vec<&str>)]) -> Result<TestContext> {
    let registry = Registry::new();
    let metrics = ExporterMetrics::new()?;
    registry.register(Box::new(metrics.clone()))?;
    let cache = Arc::new(MetricCache::new());

    for (kind, regions) in kinds {
        let config = kind_config(regions);
        let fetcher = StaticFetcher::new(*kind);
        let collector = CachedCollector::new(&fetcher, &config, Arc::clone(&cache));
        registry.register(Box::new(collector))?;
    }

    let app = app::build_http_app(AppState {
        registry,
        metrics: metrics.clone(),
        telemetry_path: "/metrics".to_string(),
    });

    Ok(TestContext {
        cache,
        metrics,
        app,
    })
}

pub async fn get_text(
    app: &axum::Router,
    uri: &str,
) -> (StatusCode, Option<String>, String) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request should be handled");

    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read");

    (status, content_type, String::from_utf8_lossy(&bytes).to_string())
}
