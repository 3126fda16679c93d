//! Exporter configuration: one YAML section per resource kind, lenient field
//! parsing, pure defaulting applied once after parse.

use crate::ResourceKind;
use serde_yaml::Value;
use std::time::Duration;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(35);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Route53 is a global API; its single client defaults to this region.
pub const DEFAULT_ROUTE53_REGION: &str = "us-east-1";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file is missing or unreadable.
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not syntactically valid YAML.
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// The document parsed but is not a mapping of resource-kind sections.
    #[error("Config file '{path}' must contain a YAML mapping at the top level")]
    NotAMapping { path: String },
}

/// Effective settings for one resource kind after defaulting.
///
/// `interval` and `cache_ttl` are independent: the interval is the refresh
/// cadence, the TTL is the advisory freshness window consumed by the scrape
/// side. No cross-field validation is performed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceKindConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub cache_ttl: Duration,
    /// Per-call fetch bound. `None` for kinds without a timeout key (rds);
    /// the scheduler substitutes its fallback bound for those.
    pub timeout: Option<Duration>,
    pub regions: Vec<String>,
}

/// The whole config file: one section per resource kind, all optional.
#[derive(Debug, Clone, PartialEq)]
pub struct ExporterConfig {
    pub rds: ResourceKindConfig,
    pub vpc: ResourceKindConfig,
    pub route53: ResourceKindConfig,
    pub ec2: ResourceKindConfig,
}

impl ExporterConfig {
    /// Loads and defaults the config file at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not valid YAML. Unknown keys
    /// and malformed individual fields are ignored, not errors.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_string(),
            source: e,
        })?;
        Self::from_yaml(&content, path)
    }

    /// Parses `content`, extracting known fields leniently and applying
    /// defaults. `path` is only used in error messages.
    pub fn from_yaml(content: &str, path: &str) -> Result<Self, ConfigError> {
        let doc: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_string(),
            source: e,
        })?;
        let doc = match doc {
            // An empty file is a valid config with everything disabled.
            Value::Null => Value::Mapping(Default::default()),
            Value::Mapping(_) => doc,
            _ => {
                return Err(ConfigError::NotAMapping {
                    path: path.to_string(),
                })
            }
        };

        let rds = kind_section(&doc, "rds");
        let vpc = kind_section(&doc, "vpc");
        let route53 = kind_section(&doc, "route53");
        let ec2 = kind_section(&doc, "ec2");

        let route53_region = route53
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_ROUTE53_REGION.to_string());

        Ok(Self {
            rds: effective(&rds, rds.regions.clone().unwrap_or_default(), false),
            vpc: effective(&vpc, vpc.regions.clone().unwrap_or_default(), true),
            route53: effective(&route53, vec![route53_region], true),
            ec2: effective(&ec2, ec2.regions.clone().unwrap_or_default(), true),
        })
    }

    pub fn kind(&self, kind: ResourceKind) -> &ResourceKindConfig {
        match kind {
            ResourceKind::Rds => &self.rds,
            ResourceKind::Vpc => &self.vpc,
            ResourceKind::Route53 => &self.route53,
            ResourceKind::Ec2 => &self.ec2,
        }
    }

    pub fn enabled_kinds(&self) -> Vec<ResourceKind> {
        ResourceKind::ALL
            .into_iter()
            .filter(|k| self.kind(*k).enabled)
            .collect()
    }
}

/// Raw section contents before defaulting; every field optional.
#[derive(Debug, Default)]
struct RawKindConfig {
    enabled: Option<bool>,
    interval: Option<Duration>,
    cache_ttl: Option<Duration>,
    timeout: Option<Duration>,
    regions: Option<Vec<String>>,
    region: Option<String>,
}

/// Pure defaulting: fills absent fields only, never rewrites present ones.
fn effective(raw: &RawKindConfig, regions: Vec<String>, supports_timeout: bool) -> ResourceKindConfig {
    ResourceKindConfig {
        enabled: raw.enabled.unwrap_or(false),
        interval: raw.interval.unwrap_or(DEFAULT_INTERVAL),
        cache_ttl: raw.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL),
        timeout: if supports_timeout {
            Some(raw.timeout.unwrap_or(DEFAULT_TIMEOUT))
        } else {
            None
        },
        regions,
    }
}

fn kind_section(doc: &Value, kind: &str) -> RawKindConfig {
    let Some(section) = doc.get(kind) else {
        return RawKindConfig::default();
    };
    RawKindConfig {
        enabled: bool_field(section, kind, "enabled"),
        interval: duration_field(section, kind, "interval"),
        cache_ttl: duration_field(section, kind, "cache_ttl"),
        timeout: duration_field(section, kind, "timeout"),
        regions: regions_field(section, kind),
        region: string_field(section, kind, "region"),
    }
}

fn bool_field(section: &Value, kind: &str, field: &str) -> Option<bool> {
    let value = section.get(field)?;
    let parsed = value.as_bool();
    if parsed.is_none() {
        tracing::warn!(kind, field, "Ignoring malformed config field");
    }
    parsed
}

fn string_field(section: &Value, kind: &str, field: &str) -> Option<String> {
    let value = section.get(field)?;
    let parsed = value.as_str().map(str::to_string);
    if parsed.is_none() {
        tracing::warn!(kind, field, "Ignoring malformed config field");
    }
    parsed
}

fn duration_field(section: &Value, kind: &str, field: &str) -> Option<Duration> {
    let value = section.get(field)?;
    let parsed = match value {
        Value::Number(n) => n.as_u64().map(Duration::from_secs),
        Value::String(s) => parse_duration(s),
        _ => None,
    };
    if parsed.is_none() {
        tracing::warn!(kind, field, "Ignoring malformed config field");
    }
    parsed
}

fn regions_field(section: &Value, kind: &str) -> Option<Vec<String>> {
    let value = section.get("regions")?;
    let Some(items) = value.as_sequence() else {
        tracing::warn!(kind, field = "regions", "Ignoring malformed config field");
        return None;
    };
    let regions: Vec<String> = items
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    if regions.len() != items.len() {
        tracing::warn!(kind, field = "regions", "Ignoring non-string region entries");
    }
    if regions.is_empty() {
        None
    } else {
        Some(regions)
    }
}

/// Parses `"300"`, `"300s"`, `"5m"`, `"2h"` or `"1500ms"`. Bare integers are
/// seconds, matching the YAML number form.
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let (value, millis_per_unit) = if let Some(v) = s.strip_suffix("ms") {
        (v, 1u64)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, 1_000)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, 60_000)
    } else if let Some(v) = s.strip_suffix('h') {
        (v, 3_600_000)
    } else {
        return None;
    };
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|v| Duration::from_millis(v * millis_per_unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_seconds_and_suffixes() {
        assert_eq!(parse_duration("35"), Some(Duration::from_secs(35)));
        assert_eq!(parse_duration("35s"), Some(Duration::from_secs(35)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("1500ms"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration(" 10s "), Some(Duration::from_secs(10)));
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("fast"), None);
        assert_eq!(parse_duration("10d"), None);
        assert_eq!(parse_duration("-5s"), None);
    }
}
