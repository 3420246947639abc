// Metrics module
// Timestamped metric observations owned by an optimization loop

mod store;
mod types;

pub use store::MetricStore;
pub use types::{MetricRecord, MetricType, MetricsSnapshot, MetricsSummary};
