//! Metrics sink boundary.
//!
//! Cache and compiler code never touch counters directly; every
//! instrumentation point emits a `MetricsEvent` into a `MetricsSink`.

///
/// CacheKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CacheKind {
    Row,
    Result,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent<'a> {
    CacheHit {
        kind: CacheKind,
        table: &'a str,
        entries: u64,
    },
    CacheMiss {
        kind: CacheKind,
        table: &'a str,
        entries: u64,
    },
    CachePut {
        kind: CacheKind,
        table: &'a str,
    },
    /// A populating put lost the race against an invalidation.
    CacheStalePut {
        table: &'a str,
    },
    CacheInvalidate {
        table: &'a str,
        keys_removed: u64,
    },
    Compile {
        model: &'a str,
        leaves: u64,
        joins: u64,
    },
    SubSearch {
        model: &'a str,
    },
    Statement {
        table: &'a str,
        rows: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent<'_>);
}

///
/// NoopSink
/// Discards every event.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record(&self, _event: MetricsEvent<'_>) {}
}
