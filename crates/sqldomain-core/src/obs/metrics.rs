use crate::obs::sink::{CacheKind, MetricsEvent, MetricsSink};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventOps {
    // Row cache
    pub row_hits: u64,
    pub row_misses: u64,
    pub row_puts: u64,

    // Result cache
    pub result_hits: u64,
    pub result_misses: u64,
    pub result_puts: u64,

    // Invalidation
    pub invalidations: u64,
    pub keys_invalidated: u64,
    pub stale_puts: u64,

    // Compiler
    pub compiles: u64,
    pub leaves_compiled: u64,
    pub joins_emitted: u64,
    pub sub_searches: u64,

    // Statements issued to the executor
    pub statements: u64,
    pub rows_fetched: u64,
}

///
/// TableCounters
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TableCounters {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub invalidations: u64,
    pub statements: u64,
}

///
/// EventReport
/// Point-in-time copy of the counters.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventReport {
    pub ops: EventOps,
    pub tables: BTreeMap<String, TableCounters>,
}

impl EventReport {
    #[must_use]
    pub fn table(&self, table: &str) -> TableCounters {
        self.tables.get(table).cloned().unwrap_or_default()
    }
}

///
/// EventCounters
/// In-memory sink; one per session or shared across sessions.
///

#[derive(Debug, Default)]
pub struct EventCounters {
    state: Mutex<EventReport>,
}

impl EventCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn report(&self) -> EventReport {
        self.state.lock().clone()
    }

    pub fn reset(&self) {
        *self.state.lock() = EventReport::default();
    }
}

impl MetricsSink for EventCounters {
    fn record(&self, event: MetricsEvent<'_>) {
        let mut state = self.state.lock();
        let EventReport { ops, tables } = &mut *state;

        match event {
            MetricsEvent::CacheHit {
                kind,
                table,
                entries,
            } => {
                match kind {
                    CacheKind::Row => ops.row_hits = ops.row_hits.saturating_add(entries),
                    CacheKind::Result => ops.result_hits = ops.result_hits.saturating_add(entries),
                }
                let entry = tables.entry(table.to_string()).or_default();
                entry.hits = entry.hits.saturating_add(entries);
            }

            MetricsEvent::CacheMiss {
                kind,
                table,
                entries,
            } => {
                match kind {
                    CacheKind::Row => ops.row_misses = ops.row_misses.saturating_add(entries),
                    CacheKind::Result => {
                        ops.result_misses = ops.result_misses.saturating_add(entries);
                    }
                }
                let entry = tables.entry(table.to_string()).or_default();
                entry.misses = entry.misses.saturating_add(entries);
            }

            MetricsEvent::CachePut { kind, table } => {
                match kind {
                    CacheKind::Row => ops.row_puts = ops.row_puts.saturating_add(1),
                    CacheKind::Result => ops.result_puts = ops.result_puts.saturating_add(1),
                }
                let entry = tables.entry(table.to_string()).or_default();
                entry.puts = entry.puts.saturating_add(1);
            }

            MetricsEvent::CacheStalePut { .. } => {
                ops.stale_puts = ops.stale_puts.saturating_add(1);
            }

            MetricsEvent::CacheInvalidate {
                table,
                keys_removed,
            } => {
                ops.invalidations = ops.invalidations.saturating_add(1);
                ops.keys_invalidated = ops.keys_invalidated.saturating_add(keys_removed);
                let entry = tables.entry(table.to_string()).or_default();
                entry.invalidations = entry.invalidations.saturating_add(1);
            }

            MetricsEvent::Compile { leaves, joins, .. } => {
                ops.compiles = ops.compiles.saturating_add(1);
                ops.leaves_compiled = ops.leaves_compiled.saturating_add(leaves);
                ops.joins_emitted = ops.joins_emitted.saturating_add(joins);
            }

            MetricsEvent::SubSearch { .. } => {
                ops.sub_searches = ops.sub_searches.saturating_add(1);
            }

            MetricsEvent::Statement { table, rows } => {
                ops.statements = ops.statements.saturating_add(1);
                ops.rows_fetched = ops.rows_fetched.saturating_add(rows);
                let entry = tables.entry(table.to_string()).or_default();
                entry.statements = entry.statements.saturating_add(1);
            }
        }
    }
}
