// Metric store
// Timestamped name -> value mapping owned by one loop

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::types::{MetricRecord, MetricType, MetricsSnapshot, MetricsSummary};

#[derive(Debug, Clone)]
pub struct MetricStore {
    created_at: DateTime<Utc>,
    metrics: BTreeMap<String, MetricRecord>,
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricStore {
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            metrics: BTreeMap::new(),
        }
    }

    /// Insert or overwrite a metric, stamping it with the current time.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        value: f64,
        metric_type: MetricType,
        unit: impl Into<String>,
        metadata: Option<BTreeMap<String, String>>,
    ) {
        self.metrics.insert(
            name.into(),
            MetricRecord {
                value,
                metric_type,
                unit: unit.into(),
                metadata: metadata.unwrap_or_default(),
                timestamp: Utc::now(),
            },
        );
    }

    /// Change value and timestamp of an existing metric. False if unknown.
    pub fn update(&mut self, name: &str, value: f64) -> bool {
        match self.metrics.get_mut(name) {
            Some(record) => {
                record.value = value;
                record.timestamp = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetricRecord> {
        self.metrics.get(name)
    }

    pub fn by_type(&self, metric_type: MetricType) -> BTreeMap<&str, &MetricRecord> {
        self.metrics
            .iter()
            .filter(|(_, r)| r.metric_type == metric_type)
            .map(|(k, r)| (k.as_str(), r))
            .collect()
    }

    /// Mean value over all metrics, or over one type. 0.0 for an empty selection.
    pub fn average(&self, metric_type: Option<MetricType>) -> f64 {
        let values: Vec<f64> = self
            .metrics
            .values()
            .filter(|r| metric_type.map_or(true, |t| r.metric_type == t))
            .map(|r| r.value)
            .collect();
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn to_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: self.created_at,
            metrics: self.metrics.clone(),
            summary: MetricsSummary {
                total_metrics: self.metrics.len(),
                average_value: self.average(None),
            },
        }
    }

    /// Rebuild a store from its transport form. Record timestamps are kept.
    pub fn from_snapshot(snapshot: MetricsSnapshot) -> Self {
        Self {
            created_at: snapshot.timestamp,
            metrics: snapshot.metrics,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.to_snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}
