// Metric data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Performance,
    User,
    Business,
    Technical,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricType::Performance => "performance",
            MetricType::User => "user",
            MetricType::Business => "business",
            MetricType::Technical => "technical",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "performance" => Ok(Self::Performance),
            "user" => Ok(Self::User),
            "business" => Ok(Self::Business),
            "technical" => Ok(Self::Technical),
            _ => Err(format!("Unknown metric type: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub value: f64,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub unit: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

/// Transport form of a metric store. `summary` is computed when the
/// snapshot is taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub metrics: BTreeMap<String, MetricRecord>,
    pub summary: MetricsSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_metrics: usize,
    pub average_value: f64,
}
