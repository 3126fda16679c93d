//! VPC usage against the per-region quota.

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
const QUOTA_SERVICE_CODE: &str = "vpc";
const VPCS_PER_REGION_QUOTA: &str = "L-F678F1CE";

/// Counts VPCs per region and pairs the count with the applied quota.
pub struct VpcFetcher {
    clients: HashMap<String, RegionClient>,
    descs: Vec<Desc>,
}

impl VpcFetcher {
    pub fn new(regions: &[String], credentials: &Arc<AwsCredentials>) -> Result<Self> {
        let clients = RegionClient::build_set(regions, credentials)?;
        let registry = Registry::new();
        let descs = VpcMetrics::register(&registry)?.descs();
        Ok(Self { clients, descs })
    }

    async fn fetch_region(&self, region: &str) -> Result<MetricSnapshot> {
        let client = self
            .clients
            .get(region)
            .ok_or_else(|| AwsError::UnknownRegion(region.to_string()))?;
        let usage = count_vpcs(client).await?;
        let quota = match quotas::get_service_quota(client, QUOTA_SERVICE_CODE, VPCS_PER_REGION_QUOTA)
            .await
        {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(region, error = %error, "VPC quota lookup failed, reporting usage only");
                None
            }
        };
        build_snapshot(region, usage, quota)
    }
}

#[async_trait]
impl ResourceFetcher for VpcFetcher {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Vpc
    }

    fn descs(&self) -> Vec<Desc> {
        self.descs.clone()
    }

    async fn fetch(&self, region: &str) -> anyhow::Result<MetricSnapshot> {
        Ok(self.fetch_region(region).await?)
    }
}

struct VpcMetrics {
    vpcs_usage: GaugeVec,
    vpcs_quota: GaugeVec,
}

impl VpcMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let vpcs_usage = GaugeVec::new(
            Opts::new("vpcs_usage", "Number of VPCs in the region")
                .namespace(METRIC_NAMESPACE)
                .subsystem("vpc"),
            &["region"],
        )?;
        let vpcs_quota = GaugeVec::new(
            Opts::new("vpcs_quota", "Applied quota for VPCs in the region")
                .namespace(METRIC_NAMESPACE)
                .subsystem("vpc"),
            &["region"],
        )?;
        registry.register(Box::new(vpcs_usage.clone()))?;
        registry.register(Box::new(vpcs_quota.clone()))?;
        Ok(Self {
            vpcs_usage,
            vpcs_quota,
        })
    }

    fn descs(&self) -> Vec<Desc> {
        [&self.vpcs_usage, &self.vpcs_quota]
            .iter()
            .flat_map(|vec| vec.desc().into_iter().cloned())
            .collect()
    }
}

fn build_snapshot(region: &str, usage: usize, quota: Option<f64>) -> Result<MetricSnapshot> {
    let registry = Registry::new();
    let metrics = VpcMetrics::register(&registry)?;
    metrics
        .vpcs_usage
        .with_label_values(&[region])
        .set(usage as f64);
    if let Some(quota) = quota {
        metrics.vpcs_quota.with_label_values(&[region]).set(quota);
    }
    Ok(MetricSnapshot::from_registry(&registry))
}

async fn count_vpcs(client: &RegionClient) -> Result<usize> {
    let mut count = 0;
    let mut token: Option<String> = None;
    loop {
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(token) = &token {
            params.push(("NextToken", token));
        }
        let body = client
            .post_query(SERVICE, "DescribeVpcs", API_VERSION, &params)
            .await?;
        let response: DescribeVpcsResponse = parse_xml(SERVICE, &body)?;
        count += response.vpcs.items.len();
        match response.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    Ok(count)
}

#[derive(Debug, Deserialize)]
struct DescribeVpcsResponse {
    #[serde(rename = "vpcSet", default)]
    vpcs: VpcList,
    #[serde(rename = "nextToken")]
    next_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VpcList {
    #[serde(rename = "item", default)]
    items: Vec<Vpc>,
}

#[derive(Debug, Deserialize)]
struct Vpc {
    #[serde(rename = "vpcId")]
    #[allow(dead_code)]
    id: String,
}
