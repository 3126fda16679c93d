//! Transit gateway usage against the per-account quota.

use crate::client::{AwsCredentials, RegionClient};
use crate::error::{AwsError, Result};
use crate::{parse_xml, quotas};
use arex_core::{MetricSnapshot, ResourceFetcher, ResourceKind, METRIC_NAMESPACE};
use async_trait::async_trait;
use prometheus::core::{Collector, Desc};
use prometheus::{GaugeVec, Opts, Registry};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

const SERVICE: &str = "ec2";
const API_VERSION: &str = "2016-11-15";
const QUOTA_SERVICE_CODE: &str = "ec2";
const TRANSIT_GATEWAYS_QUOTA: &str = "L-A2478D36";

/// Counts transit gateways per region and pairs the count with the applied
/// quota.
pub struct Ec2Fetcher {
    clients: HashMap<String, RegionClient>,
    descs: Vec<Desc>,
}

impl Ec2Fetcher {
    pub fn new(regions: &[String], credentials: &Arc<AwsCredentials>) -> Result<Self> {
        let clients = RegionClient::build_set(regions, credentials)?;
        let registry = Registry::new();
        let descs = Ec2Metrics::register(&registry)?.descs();
        Ok(Self { clients, descs })
    }

    async fn fetch_region(&self, region: &str) -> Result<MetricSnapshot> {
        let client = self
            .clients
            .get(region)
            .ok_or_else(|| AwsError::UnknownRegion(region.to_string()))?;
        let usage = count_transit_gateways(client).await?;
        let quota =
            match quotas::get_service_quota(client, QUOTA_SERVICE_CODE, TRANSIT_GATEWAYS_QUOTA)
                .await
            {
                Ok(value) => Some(value),
                Err(error) => {
                    tracing::warn!(region, error = %error, "Transit gateway quota lookup failed, reporting usage only");
                    None
                }
            };
        build_snapshot(region, usage, quota)
    }
}

#[async_trait]
impl ResourceFetcher for Ec2Fetcher {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Ec2
    }

    fn descs(&self) -> Vec<Desc> {
        self.descs.clone()
    }

    async fn fetch(&self, region: &str) -> anyhow::Result<MetricSnapshot> {
        Ok(self.fetch_region(region).await?)
    }
}

struct Ec2Metrics {
    transit_gateways_usage: GaugeVec,
    transit_gateways_quota: GaugeVec,
}

impl Ec2Metrics {
    fn register(registry: &Registry) -> Result<Self> {
        let transit_gateways_usage = GaugeVec::new(
            Opts::new("transit_gateways_usage", "Number of transit gateways in the region")
                .namespace(METRIC_NAMESPACE)
                .subsystem(SERVICE),
            &["region"],
        )?;
        let transit_gateways_quota = GaugeVec::new(
            Opts::new(
                "transit_gateways_quota",
                "Applied quota for transit gateways in the region",
            )
            .namespace(METRIC_NAMESPACE)
            .subsystem(SERVICE),
            &["region"],
        )?;
        registry.register(Box::new(transit_gateways_usage.clone()))?;
        registry.register(Box::new(transit_gateways_quota.clone()))?;
        Ok(Self {
            transit_gateways_usage,
            transit_gateways_quota,
        })
    }

    fn descs(&self) -> Vec<Desc> {
        [&self.transit_gateways_usage, &self.transit_gateways_quota]
            .iter()
            .flat_map(|vec| vec.desc().into_iter().cloned())
            .collect()
    }
}

fn build_snapshot(region: &str, usage: usize, quota: Option<f64>) -> Result<MetricSnapshot> {
    let registry = Registry::new();
    let metrics = Ec2Metrics::register(&registry)?;
    metrics
        .transit_gateways_usage
        .with_label_values(&[region])
        .set(usage as f64);
    if let Some(quota) = quota {
        metrics
            .transit_gateways_quota
            .with_label_values(&[region])
            .set(quota);
    }
    Ok(MetricSnapshot::from_registry(&registry))
}

async fn count_transit_gateways(client: &RegionClient) -> Result<usize> {
    let mut count = 0;
    let mut token: Option<String> = None;
    loop {
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(token) = &token {
            params.push(("NextToken", token));
        }
        let body = client
            .post_query(SERVICE, "DescribeTransitGateways", API_VERSION, &params)
            .await?;
        let response: DescribeTransitGatewaysResponse = parse_xml(SERVICE, &body)?;
        count += response.gateways.items.len();
        match response.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    Ok(count)
}

#[derive(Debug, Deserialize)]
struct DescribeTransitGatewaysResponse {
    #[serde(rename = "transitGatewaySet", default)]
    gateways: TransitGatewayList,
    #[serde(rename = "nextToken")]
    next_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TransitGatewayList {
    #[serde(rename = "item", default)]
    items: Vec<TransitGateway>,
}

#[derive(Debug, Deserialize)]
struct TransitGateway {
    #[serde(rename = "transitGatewayId")]
    #[allow(dead_code)]
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRST_PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DescribeTransitGatewaysResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
  <requestId>9d8f3b2a-1c7e-4b1b-8d3e-0f2aEXAMPLE</requestId>
  <transitGatewaySet>
    <item>
      <transitGatewayId>tgw-0262a0e521EXAMPLE</transitGatewayId>
      <state>available</state>
    </item>
  </transitGatewaySet>
  <nextToken>frgHtyJdEXAMPLE</nextToken>
</DescribeTransitGatewaysResponse>"#;

    const LAST_PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DescribeTransitGatewaysResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
  <requestId>31c0e9c1-7be8-4b8a-b3de-9aa1EXAMPLE</requestId>
  <transitGatewaySet>
    <item>
      <transitGatewayId>tgw-0f3c8aa219EXAMPLE</transitGatewayId>
      <state>pending</state>
    </item>
  </transitGatewaySet>
</DescribeTransitGatewaysResponse>"#;

    fn gauge_value(snapshot: &MetricSnapshot, name: &str) -> Option<f64> {
        snapshot
            .families()
            .iter()
            .find(|mf| mf.get_name() == name)
            .and_then(|mf| mf.get_metric().first())
            .map(|metric| metric.get_gauge().get_value())
    }

    #[test]
    fn decodes_pagination_tokens() {
        let first: DescribeTransitGatewaysResponse = parse_xml(SERVICE, FIRST_PAGE).unwrap();
        assert_eq!(first.gateways.items.len(), 1);
        assert_eq!(first.next_token.as_deref(), Some("frgHtyJdEXAMPLE"));

        let last: DescribeTransitGatewaysResponse = parse_xml(SERVICE, LAST_PAGE).unwrap();
        assert_eq!(last.gateways.items[0].id, "tgw-0f3c8aa219EXAMPLE");
        assert!(last.next_token.is_none());
    }

    #[test]
    fn snapshot_reports_usage_and_quota() {
        let snapshot = build_snapshot("ap-southeast-2", 3, Some(20.0)).unwrap();
        assert_eq!(
            gauge_value(&snapshot, "arex_ec2_transit_gateways_usage"),
            Some(3.0)
        );
        assert_eq!(
            gauge_value(&snapshot, "arex_ec2_transit_gateways_quota"),
            Some(20.0)
        );
    }

    #[test]
    fn missing_quota_still_reports_usage() {
        let snapshot = build_snapshot("ap-southeast-2", 0, None).unwrap();
        assert_eq!(
            gauge_value(&snapshot, "arex_ec2_transit_gateways_usage"),
            Some(0.0)
        );
        assert_eq!(gauge_value(&snapshot, "arex_ec2_transit_gateways_quota"), None);
    }
}
