//! Hosted zone counts and per-zone record set usage against the
//! `MAX_RRSETS_BY_ZONE` limit.
//!
//! Route53 is a global service: one client, addressed through
//! `route53.amazonaws.com`, signed with the configured home region.

use crate::client::{AwsCredentials, RegionClient};
use crate::error::{AwsError, Result};
use crate::parse_xml;
use crate::sign::canonical_query;
use arex_core::{MetricSnapshot, ResourceFetcher, ResourceKind, METRIC_NAMESPACE};
use async_trait::async_trait;
use prometheus::core::{Collector, Desc};
use prometheus::{GaugeVec, Opts, Registry};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

const SERVICE: &str = "route53";
const HOST: &str = "route53.amazonaws.com";
const LIST_ZONES_PATH: &str = "/2013-04-01/hostedzone";
const RRSET_LIMIT_TYPE: &str = "MAX_RRSETS_BY_ZONE";

/// Fetches hosted zone metrics through the Route53 REST API.
pub struct Route53Fetcher {
    clients: HashMap<String, RegionClient>,
    descs: Vec<Desc>,
}

impl Route53Fetcher {
    pub fn new(regions: &[String], credentials: &Arc<AwsCredentials>) -> Result<Self> {
        let clients = RegionClient::build_set(regions, credentials)?;
        let registry = Registry::new();
        let descs = Route53Metrics::register(&registry)?.descs();
        Ok(Self { clients, descs })
    }

    async fn fetch_region(&self, region: &str) -> Result<MetricSnapshot> {
        let client = self
            .clients
            .get(region)
            .ok_or_else(|| AwsError::UnknownRegion(region.to_string()))?;
        let zones = list_hosted_zones(client).await?;

        let mut record_sets = Vec::with_capacity(zones.len());
        for zone in &zones {
            let zone_id = strip_zone_prefix(&zone.id);
            match get_rrset_limit(client, zone_id).await {
                Ok(response) => record_sets.push(ZoneRecordSets {
                    zone_id: zone_id.to_string(),
                    zone_name: zone.name.clone(),
                    usage: response.count,
                    quota: response.limit.value,
                }),
                Err(error) => {
                    tracing::warn!(
                        zone = zone_id,
                        error = %error,
                        "Hosted zone limit lookup failed, skipping the zone"
                    );
                }
            }
        }

        build_snapshot(region, zones.len(), &record_sets)
    }
}

#[async_trait]
impl ResourceFetcher for Route53Fetcher {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Route53
    }

    fn descs(&self) -> Vec<Desc> {
        self.descs.clone()
    }

    async fn fetch(&self, region: &str) -> anyhow::Result<MetricSnapshot> {
        Ok(self.fetch_region(region).await?)
    }
}

struct Route53Metrics {
    hosted_zones_total: GaugeVec,
    recordsets_usage: GaugeVec,
    recordsets_quota: GaugeVec,
}

impl Route53Metrics {
    fn register(registry: &Registry) -> Result<Self> {
        let hosted_zones_total = GaugeVec::new(
            Opts::new("hosted_zones_total", "Number of hosted zones in the account")
                .namespace(METRIC_NAMESPACE)
                .subsystem(SERVICE),
            &["region"],
        )?;
        let zone_labels = ["region", "hosted_zone_id", "hosted_zone_name"];
        let recordsets_usage = GaugeVec::new(
            Opts::new(
                "recordsets_per_hosted_zone_usage",
                "Number of resource record sets in the hosted zone",
            )
            .namespace(METRIC_NAMESPACE)
            .subsystem(SERVICE),
            &zone_labels,
        )?;
        let recordsets_quota = GaugeVec::new(
            Opts::new(
                "recordsets_per_hosted_zone_quota",
                "Record set limit of the hosted zone",
            )
            .namespace(METRIC_NAMESPACE)
            .subsystem(SERVICE),
            &zone_labels,
        )?;
        registry.register(Box::new(hosted_zones_total.clone()))?;
        registry.register(Box::new(recordsets_usage.clone()))?;
        registry.register(Box::new(recordsets_quota.clone()))?;
        Ok(Self {
            hosted_zones_total,
            recordsets_usage,
            recordsets_quota,
        })
    }

    fn descs(&self) -> Vec<Desc> {
        [
            &self.hosted_zones_total,
            &self.recordsets_usage,
            &self.recordsets_quota,
        ]
        .iter()
        .flat_map(|vec| vec.desc().into_iter().cloned())
        .collect()
    }
}

struct ZoneRecordSets {
    zone_id: String,
    zone_name: String,
    usage: f64,
    quota: f64,
}

fn build_snapshot(
    region: &str,
    zone_count: usize,
    record_sets: &[ZoneRecordSets],
) -> Result<MetricSnapshot> {
    let registry = Registry::new();
    let metrics = Route53Metrics::register(&registry)?;

    metrics
        .hosted_zones_total
        .with_label_values(&[region])
        .set(zone_count as f64);
    for zone in record_sets {
        let labels = [region, zone.zone_id.as_str(), zone.zone_name.as_str()];
        metrics
            .recordsets_usage
            .with_label_values(&labels)
            .set(zone.usage);
        metrics
            .recordsets_quota
            .with_label_values(&labels)
            .set(zone.quota);
    }

    Ok(MetricSnapshot::from_registry(&registry))
}

async fn list_hosted_zones(client: &RegionClient) -> Result<Vec<HostedZone>> {
    let mut zones = Vec::new();
    let mut marker: Option<String> = None;
    loop {
        let query = match &marker {
            Some(marker) => canonical_query(&[("marker", marker)]),
            None => String::new(),
        };
        let body = client.get_rest(SERVICE, HOST, LIST_ZONES_PATH, &query).await?;
        let response: ListHostedZonesResponse = parse_xml(SERVICE, &body)?;
        zones.extend(response.zones.items);
        if !response.is_truncated {
            break;
        }
        match response.next_marker {
            Some(next) => marker = Some(next),
            None => break,
        }
    }
    Ok(zones)
}

async fn get_rrset_limit(client: &RegionClient, zone_id: &str) -> Result<GetHostedZoneLimitResponse> {
    let path = format!("/2013-04-01/hostedzonelimit/{zone_id}/{RRSET_LIMIT_TYPE}");
    let body = client.get_rest(SERVICE, HOST, &path, "").await?;
    parse_xml(SERVICE, &body)
}

/// Zone ids arrive as `/hostedzone/Z123`; labels and request paths use the
/// bare id.
fn strip_zone_prefix(id: &str) -> &str {
    id.strip_prefix("/hostedzone/").unwrap_or(id)
}

#[derive(Debug, Deserialize)]
struct ListHostedZonesResponse {
    #[serde(rename = "HostedZones", default)]
    zones: HostedZoneList,
    #[serde(rename = "IsTruncated")]
    is_truncated: bool,
    #[serde(rename = "NextMarker")]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HostedZoneList {
    #[serde(rename = "HostedZone", default)]
    items: Vec<HostedZone>,
}

#[derive(Debug, Deserialize)]
struct HostedZone {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct GetHostedZoneLimitResponse {
    #[serde(rename = "Limit")]
    limit: HostedZoneLimit,
    #[serde(rename = "Count")]
    count: f64,
}

#[derive(Debug, Deserialize)]
struct HostedZoneLimit {
    #[serde(rename = "Value")]
    value: f64,
}
