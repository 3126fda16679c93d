//! AWS adapters for the resource exporter: SigV4 signing, per-region HTTP
//! clients and one [`ResourceFetcher`] implementation per resource kind.
//!
//! Each fetcher turns one region's worth of API responses into an
//! [`arex_core::MetricSnapshot`]; the engine in `arex-core` decides when
//! fetchers run and how their snapshots are cached and served.

pub mod client;
pub mod ec2;
pub mod error;
mod quotas;
pub mod rds;
pub mod route53;
pub mod sign;
pub mod vpc;

pub use client::{AwsCredentials, RegionClient};
pub use ec2::Ec2Fetcher;
pub use error::{AwsError, Result};
pub use rds::RdsFetcher;
pub use route53::Route53Fetcher;
pub use vpc::VpcFetcher;

use arex_core::config::ResourceKindConfig;
use arex_core::{ResourceFetcher, ResourceKind};
use std::sync::Arc;

/// Builds the fetcher for one resource kind, with a signed client per
/// configured region.
///
/// # Errors
///
/// Returns an error if an HTTP client cannot be constructed or the kind's
/// metric descriptors fail to build.
pub fn build_fetcher(
    kind: ResourceKind,
    config: &ResourceKindConfig,
    credentials: &Arc<AwsCredentials>,
) -> Result<Arc<dyn ResourceFetcher>> {
    Ok(match kind {
        ResourceKind::Rds => Arc::new(RdsFetcher::new(&config.regions, credentials)?),
        ResourceKind::Vpc => Arc::new(VpcFetcher::new(&config.regions, credentials)?),
        ResourceKind::Route53 => Arc::new(Route53Fetcher::new(&config.regions, credentials)?),
        ResourceKind::Ec2 => Arc::new(Ec2Fetcher::new(&config.regions, credentials)?),
    })
}

pub(crate) fn parse_xml<T>(service: &str, body: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    quick_xml::de::from_str(body).map_err(|source| AwsError::Xml {
        service: service.to_string(),
        source,
    })
}
