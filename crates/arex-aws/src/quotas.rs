//! Service Quotas lookups for adapters that pair a usage count with the
//! account's applied quota.

use crate::client::RegionClient;
use crate::error::Result;
use serde::Deserialize;

const SERVICE: &str = "servicequotas";
const TARGET_GET_SERVICE_QUOTA: &str = "ServiceQuotasV20190624.GetServiceQuota";

/// Returns the applied value of one quota in the client's region.
pub(crate) async fn get_service_quota(
    client: &RegionClient,
    service_code: &str,
    quota_code: &str,
) -> Result<f64> {
    let payload = serde_json::json!({
        "ServiceCode": service_code,
        "QuotaCode": quota_code,
    });
    let body = client
        .post_json(SERVICE, TARGET_GET_SERVICE_QUOTA, &payload)
        .await?;
    let response: GetServiceQuotaResponse = serde_json::from_str(&body)?;
    Ok(response.quota.value)
}

#[derive(Debug, Deserialize)]
struct GetServiceQuotaResponse {
    #[serde(rename = "Quota")]
    quota: Quota,
}

#[derive(Debug, Deserialize)]
struct Quota {
    #[serde(rename = "Value")]
    value: f64,
}
