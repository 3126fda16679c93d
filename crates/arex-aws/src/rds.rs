//! RDS instance metrics: storage allocation, instance details and pending
//! maintenance actions.

use crate::client::{AwsCredentials, RegionClient};
use crate::error::{AwsError, Result};
use crate::parse_xml;
use arex_core::{MetricSnapshot, ResourceFetcher, ResourceKind, METRIC_NAMESPACE};
use async_trait::async_trait;
use prometheus::core::{Collector, Desc};
use prometheus::{GaugeVec, Opts, Registry};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

const SERVICE: &str = "rds";
const API_VERSION: &str = "2014-10-31";
const GIB_BYTES: f64 = 1024.0 * 1024.0 * 1024.0;

/// Fetches database instance metrics through the RDS Query API.
pub struct RdsFetcher {
    clients: HashMap<String, RegionClient>,
    descs: Vec<Desc>,
}

impl RdsFetcher {
    pub fn new(regions: &[String], credentials: &Arc<AwsCredentials>) -> Result<Self> {
        let clients = RegionClient::build_set(regions, credentials)?;
        let registry = Registry::new();
        let descs = RdsMetrics::register(&registry)?.descs();
        Ok(Self { clients, descs })
    }

    async fn fetch_region(&self, region: &str) -> Result<MetricSnapshot> {
        let client = self
            .clients
            .get(region)
            .ok_or_else(|| AwsError::UnknownRegion(region.to_string()))?;
        let instances = describe_db_instances(client).await?;
        let actions = describe_pending_maintenance(client).await?;
        build_snapshot(region, &instances, &actions)
    }
}

#[async_trait]
impl ResourceFetcher for RdsFetcher {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Rds
    }

    fn descs(&self) -> Vec<Desc> {
        self.descs.clone()
    }

    async fn fetch(&self, region: &str) -> anyhow::Result<MetricSnapshot> {
        Ok(self.fetch_region(region).await?)
    }
}

struct RdsMetrics {
    allocated_storage_bytes: GaugeVec,
    max_allocated_storage_bytes: GaugeVec,
    instance_info: GaugeVec,
    pending_maintenance_actions: GaugeVec,
}

impl RdsMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let allocated_storage_bytes = GaugeVec::new(
            Opts::new("allocated_storage_bytes", "Storage allocated to the instance in bytes")
                .namespace(METRIC_NAMESPACE)
                .subsystem(SERVICE),
            &["region", "db_instance_id"],
        )?;
        let max_allocated_storage_bytes = GaugeVec::new(
            Opts::new(
                "max_allocated_storage_bytes",
                "Upper storage autoscaling limit of the instance in bytes",
            )
            .namespace(METRIC_NAMESPACE)
            .subsystem(SERVICE),
            &["region", "db_instance_id"],
        )?;
        let instance_info = GaugeVec::new(
            Opts::new("instance_info", "Static details of the database instance")
                .namespace(METRIC_NAMESPACE)
                .subsystem(SERVICE),
            &[
                "region",
                "db_instance_id",
                "instance_class",
                "engine",
                "engine_version",
                "status",
            ],
        )?;
        let pending_maintenance_actions = GaugeVec::new(
            Opts::new(
                "pending_maintenance_actions",
                "Set to 1 for every maintenance action pending on the instance",
            )
            .namespace(METRIC_NAMESPACE)
            .subsystem(SERVICE),
            &["region", "db_instance_id", "action"],
        )?;

        registry.register(Box::new(allocated_storage_bytes.clone()))?;
        registry.register(Box::new(max_allocated_storage_bytes.clone()))?;
        registry.register(Box::new(instance_info.clone()))?;
        registry.register(Box::new(pending_maintenance_actions.clone()))?;

        Ok(Self {
            allocated_storage_bytes,
            max_allocated_storage_bytes,
            instance_info,
            pending_maintenance_actions,
        })
    }

    fn descs(&self) -> Vec<Desc> {
        [
            &self.allocated_storage_bytes,
            &self.max_allocated_storage_bytes,
            &self.instance_info,
            &self.pending_maintenance_actions,
        ]
        .iter()
        .flat_map(|vec| vec.desc().into_iter().cloned())
        .collect()
    }
}

fn build_snapshot(
    region: &str,
    instances: &[DbInstance],
    actions: &[MaintenanceAction],
) -> Result<MetricSnapshot> {
    let registry = Registry::new();
    let metrics = RdsMetrics::register(&registry)?;

    for instance in instances {
        metrics
            .allocated_storage_bytes
            .with_label_values(&[region, &instance.id])
            .set(instance.allocated_storage * GIB_BYTES);
        if let Some(max) = instance.max_allocated_storage {
            metrics
                .max_allocated_storage_bytes
                .with_label_values(&[region, &instance.id])
                .set(max * GIB_BYTES);
        }
        metrics
            .instance_info
            .with_label_values(&[
                region,
                &instance.id,
                &instance.class,
                &instance.engine,
                &instance.engine_version,
                &instance.status,
            ])
            .set(1.0);
    }
    for action in actions {
        metrics
            .pending_maintenance_actions
            .with_label_values(&[region, &action.db_instance_id, &action.action])
            .set(1.0);
    }

    Ok(MetricSnapshot::from_registry(&registry))
}

async fn describe_db_instances(client: &RegionClient) -> Result<Vec<DbInstance>> {
    let mut instances = Vec::new();
    let mut marker: Option<String> = None;
    loop {
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(marker) = &marker {
            params.push(("Marker", marker));
        }
        let body = client
            .post_query(SERVICE, "DescribeDBInstances", API_VERSION, &params)
            .await?;
        let response: DescribeDbInstancesResponse = parse_xml(SERVICE, &body)?;
        instances.extend(response.result.instances.items);
        match response.result.marker {
            Some(next) => marker = Some(next),
            None => break,
        }
    }
    Ok(instances)
}

async fn describe_pending_maintenance(client: &RegionClient) -> Result<Vec<MaintenanceAction>> {
    let mut actions = Vec::new();
    let mut marker: Option<String> = None;
    loop {
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(marker) = &marker {
            params.push(("Marker", marker));
        }
        let body = client
            .post_query(
                SERVICE,
                "DescribePendingMaintenanceActions",
                API_VERSION,
                &params,
            )
            .await?;
        let response: DescribePendingMaintenanceActionsResponse = parse_xml(SERVICE, &body)?;
        for resource in response.result.pending.items {
            let db_instance_id = instance_id_from_arn(&resource.resource_identifier).to_string();
            for detail in resource.details.items {
                actions.push(MaintenanceAction {
                    db_instance_id: db_instance_id.clone(),
                    action: detail.action,
                });
            }
        }
        match response.result.marker {
            Some(next) => marker = Some(next),
            None => break,
        }
    }
    Ok(actions)
}

/// Maintenance actions are reported per resource ARN
/// (`arn:aws:rds:region:account:db:name`); the instance id is the final
/// segment.
fn instance_id_from_arn(arn: &str) -> &str {
    arn.rsplit(':').next().unwrap_or(arn)
}

#[derive(Debug, Deserialize)]
struct DescribeDbInstancesResponse {
    #[serde(rename = "DescribeDBInstancesResult")]
    result: DescribeDbInstancesResult,
}

#[derive(Debug, Deserialize)]
struct DescribeDbInstancesResult {
    #[serde(rename = "DBInstances", default)]
    instances: DbInstanceList,
    #[serde(rename = "Marker")]
    marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DbInstanceList {
    #[serde(rename = "DBInstance", default)]
    items: Vec<DbInstance>,
}

#[derive(Debug, Deserialize)]
struct DbInstance {
    #[serde(rename = "DBInstanceIdentifier")]
    id: String,
    #[serde(rename = "DBInstanceClass")]
    class: String,
    #[serde(rename = "Engine")]
    engine: String,
    #[serde(rename = "EngineVersion")]
    engine_version: String,
    #[serde(rename = "DBInstanceStatus")]
    status: String,
    #[serde(rename = "AllocatedStorage")]
    allocated_storage: f64,
    #[serde(rename = "MaxAllocatedStorage")]
    max_allocated_storage: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DescribePendingMaintenanceActionsResponse {
    #[serde(rename = "DescribePendingMaintenanceActionsResult")]
    result: DescribePendingMaintenanceActionsResult,
}

#[derive(Debug, Deserialize)]
struct DescribePendingMaintenanceActionsResult {
    #[serde(rename = "PendingMaintenanceActions", default)]
    pending: PendingMaintenanceList,
    #[serde(rename = "Marker")]
    marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PendingMaintenanceList {
    #[serde(rename = "ResourcePendingMaintenanceActions", default)]
    items: Vec<ResourcePendingMaintenance>,
}

#[derive(Debug, Deserialize)]
struct ResourcePendingMaintenance {
    #[serde(rename = "ResourceIdentifier")]
    resource_identifier: String,
    #[serde(rename = "PendingMaintenanceActionDetails", default)]
    details: MaintenanceDetailList,
}

#[derive(Debug, Default, Deserialize)]
struct MaintenanceDetailList {
    #[serde(rename = "PendingMaintenanceAction", default)]
    items: Vec<MaintenanceDetail>,
}

#[derive(Debug, Deserialize)]
struct MaintenanceDetail {
    #[serde(rename = "Action")]
    action: String,
}

struct MaintenanceAction {
    db_instance_id: String,
    action: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIBE_INSTANCES_BODY: &str = r#"
<DescribeDBInstancesResponse xmlns="http://rds.amazonaws.com/doc/2014-10-31/">
  <DescribeDBInstancesResult>
    <DBInstances>
      <DBInstance>
        <DBInstanceIdentifier>orders-db</DBInstanceIdentifier>
        <DBInstanceClass>db.r6g.large</DBInstanceClass>
        <Engine>postgres</Engine>
        <EngineVersion>15.4</EngineVersion>
        <DBInstanceStatus>available</DBInstanceStatus>
        <AllocatedStorage>100</AllocatedStorage>
        <MaxAllocatedStorage>500</MaxAllocatedStorage>
      </DBInstance>
      <DBInstance>
        <DBInstanceIdentifier>sessions-db</DBInstanceIdentifier>
        <DBInstanceClass>db.t4g.micro</DBInstanceClass>
        <Engine>mysql</Engine>
        <EngineVersion>8.0.35</EngineVersion>
        <DBInstanceStatus>backing-up</DBInstanceStatus>
        <AllocatedStorage>20</AllocatedStorage>
      </DBInstance>
    </DBInstances>
  </DescribeDBInstancesResult>
  <ResponseMetadata>
    <RequestId>523e3218-afc7-11c3-90f5-f90431260ab4</RequestId>
  </ResponseMetadata>
</DescribeDBInstancesResponse>"#;

    const PENDING_MAINTENANCE_BODY: &str = r#"
<DescribePendingMaintenanceActionsResponse xmlns="http://rds.amazonaws.com/doc/2014-10-31/">
  <DescribePendingMaintenanceActionsResult>
    <PendingMaintenanceActions>
      <ResourcePendingMaintenanceActions>
        <ResourceIdentifier>arn:aws:rds:eu-west-1:123456789012:db:orders-db</ResourceIdentifier>
        <PendingMaintenanceActionDetails>
          <PendingMaintenanceAction>
            <Action>system-update</Action>
          </PendingMaintenanceAction>
          <PendingMaintenanceAction>
            <Action>db-upgrade</Action>
          </PendingMaintenanceAction>
        </PendingMaintenanceActionDetails>
      </ResourcePendingMaintenanceActions>
    </PendingMaintenanceActions>
  </DescribePendingMaintenanceActionsResult>
</DescribePendingMaintenanceActionsResponse>"#;

    fn gauge_value(snapshot: &MetricSnapshot, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let family = snapshot.families().iter().find(|mf| mf.get_name() == name)?;
        family
            .get_metric()
            .iter()
            .find(|metric| {
                labels.iter().all(|(key, value)| {
                    metric
                        .get_label()
                        .iter()
                        .any(|pair| pair.get_name() == *key && pair.get_value() == *value)
                })
            })
            .map(|metric| metric.get_gauge().get_value())
    }

    #[test]
    fn decodes_instances_from_the_wire_format() {
        let response: DescribeDbInstancesResponse =
            parse_xml(SERVICE, DESCRIBE_INSTANCES_BODY).unwrap();
        let instances = response.result.instances.items;
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].id, "orders-db");
        assert_eq!(instances[0].allocated_storage, 100.0);
        assert_eq!(instances[0].max_allocated_storage, Some(500.0));
        assert_eq!(instances[1].engine, "mysql");
        assert_eq!(instances[1].max_allocated_storage, None);
        assert!(response.result.marker.is_none());
    }

    #[test]
    fn decodes_pending_maintenance_actions() {
        let response: DescribePendingMaintenanceActionsResponse =
            parse_xml(SERVICE, PENDING_MAINTENANCE_BODY).unwrap();
        let resources = response.result.pending.items;
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].details.items.len(), 2);
        assert_eq!(resources[0].details.items[0].action, "system-update");
    }

    #[test]
    fn snapshot_reports_storage_in_bytes() {
        let response: DescribeDbInstancesResponse =
            parse_xml(SERVICE, DESCRIBE_INSTANCES_BODY).unwrap();
        let snapshot =
            build_snapshot("eu-west-1", &response.result.instances.items, &[]).unwrap();

        assert_eq!(
            gauge_value(
                &snapshot,
                "arex_rds_allocated_storage_bytes",
                &[("region", "eu-west-1"), ("db_instance_id", "orders-db")],
            ),
            Some(100.0 * GIB_BYTES)
        );
        assert_eq!(
            gauge_value(
                &snapshot,
                "arex_rds_max_allocated_storage_bytes",
                &[("db_instance_id", "orders-db")],
            ),
            Some(500.0 * GIB_BYTES)
        );
        // sessions-db has no autoscaling ceiling, so no max sample for it.
        assert_eq!(
            gauge_value(
                &snapshot,
                "arex_rds_max_allocated_storage_bytes",
                &[("db_instance_id", "sessions-db")],
            ),
            None
        );
        assert_eq!(
            gauge_value(
                &snapshot,
                "arex_rds_instance_info",
                &[
                    ("db_instance_id", "sessions-db"),
                    ("instance_class", "db.t4g.micro"),
                    ("engine", "mysql"),
                    ("engine_version", "8.0.35"),
                    ("status", "backing-up"),
                ],
            ),
            Some(1.0)
        );
    }

    #[test]
    fn snapshot_flags_each_pending_action() {
        let response: DescribePendingMaintenanceActionsResponse =
            parse_xml(SERVICE, PENDING_MAINTENANCE_BODY).unwrap();
        let mut actions = Vec::new();
        for resource in response.result.pending.items {
            let id = instance_id_from_arn(&resource.resource_identifier).to_string();
            for detail in resource.details.items {
                actions.push(MaintenanceAction {
                    db_instance_id: id.clone(),
                    action: detail.action,
                });
            }
        }
        let snapshot = build_snapshot("eu-west-1", &[], &actions).unwrap();

        for action in ["system-update", "db-upgrade"] {
            assert_eq!(
                gauge_value(
                    &snapshot,
                    "arex_rds_pending_maintenance_actions",
                    &[("db_instance_id", "orders-db"), ("action", action)],
                ),
                Some(1.0)
            );
        }
    }

    #[test]
    fn instance_id_is_the_last_arn_segment() {
        assert_eq!(
            instance_id_from_arn("arn:aws:rds:eu-west-1:123456789012:db:orders-db"),
            "orders-db"
        );
        assert_eq!(instance_id_from_arn("plain-name"), "plain-name");
    }

    #[test]
    fn descriptors_cover_every_family() {
        let registry = Registry::new();
        let descs = RdsMetrics::register(&registry).unwrap().descs();
        let names: Vec<&str> = descs.iter().map(|desc| desc.fq_name.as_str()).collect();
        assert!(names.contains(&"arex_rds_allocated_storage_bytes"));
        assert!(names.contains(&"arex_rds_max_allocated_storage_bytes"));
        assert!(names.contains(&"arex_rds_instance_info"));
        assert!(names.contains(&"arex_rds_pending_maintenance_actions"));
    }
}
