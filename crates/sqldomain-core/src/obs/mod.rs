//! Observability: metrics events and the sinks that count them.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventCounters, EventOps, EventReport, TableCounters};
pub use sink::{CacheKind, MetricsEvent, MetricsSink, NoopSink};
