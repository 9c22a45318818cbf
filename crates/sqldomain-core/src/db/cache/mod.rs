//! Table-scoped TTL cache for rows (by id) and query results (by SQL).
//!
//! Every key is indexed under the tables it depends on, so invalidating a
//! table touches only that table's keys. Writers invalidate synchronously;
//! readers that populate the cache take a [`CacheTicket`] before querying
//! and their put is dropped if an invalidation happened in between.

mod store;


use crate::{
    config::CacheConfig,
    obs::{CacheKind, MetricsEvent, MetricsSink, NoopSink},
    value::Value,
};
use parking_lot::RwLock;
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};
use thiserror::Error as ThisError;
use tracing::debug;

// re-exports
pub use store::ExpiringStore;

///
/// CacheError
///
/// Never fatal: callers log it and fall back to the database.
///

#[derive(Debug, ThisError)]
pub enum CacheError {
    #[error("cannot build cache key: {0}")]
    Key(#[from] serde_json::Error),
}

///
/// CacheTicket
/// Table generations observed before a cache-populating read.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheTicket {
    stamps: Vec<(String, u64)>,
}

impl CacheTicket {
    #[must_use]
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.stamps.iter().map(|(table, _)| table.as_str())
    }
}

#[derive(Debug, Default)]
struct TableIndex {
    generation: u64,
    id_keys: HashSet<String>,
    sql_keys: HashSet<String>,
}

///
/// ResultCache
///
/// `R` is one cached row; SQL results are cached as `Vec<R>`.
///

pub struct ResultCache<R> {
    active: bool,
    disabled: RwLock<BTreeSet<String>>,
    rows: ExpiringStore<R>,
    results: ExpiringStore<Vec<R>>,
    tables: RwLock<HashMap<String, TableIndex>>,
    sink: Arc<dyn MetricsSink>,
}

impl<R: Clone> ResultCache<R> {
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            active: config.active,
            disabled: RwLock::new(config.disabled_tables.clone()),
            rows: ExpiringStore::new(config.interval(), config.expired()),
            results: ExpiringStore::new(config.interval(), config.expired()),
            tables: RwLock::new(HashMap::new()),
            sink: Arc::new(NoopSink),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Global switch and per-table switch both on.
    #[must_use]
    pub fn is_enabled(&self, table: &str) -> bool {
        self.active && !self.disabled.read().contains(table)
    }

    /// Toggle caching for one table. Disabling drops what it had cached.
    pub fn set_table_enabled(&self, table: &str, enabled: bool) {
        if enabled {
            self.disabled.write().remove(table);
        } else {
            self.disabled.write().insert(table.to_string());
            self.clear_by_table(table);
        }
    }

    // keys

    #[must_use]
    pub fn id_key(table: &str, id: i64) -> String {
        format!("{table}-{id}")
    }

    pub fn sql_key(table: &str, sql: &str, args: &[Value]) -> Result<String, CacheError> {
        Ok(format!("{table}-{sql}-{}", serde_json::to_string(args)?))
    }

    // rows

    pub fn put_by_id(&self, table: &str, id: i64, row: R) {
        if !self.is_enabled(table) {
            return;
        }
        let key = Self::id_key(table, id);

        let mut tables = self.tables.write();
        let swept = self.rows.put(key.clone(), row);
        prune(&mut tables, &swept);
        tables.entry(table.to_string()).or_default().id_keys.insert(key);
        drop(tables);

        self.sink.record(MetricsEvent::CachePut {
            kind: CacheKind::Row,
            table,
        });
    }

    /// Put `row` unless a ticket table was invalidated since `ticket` was
    /// taken. The key is indexed under every ticket table.
    pub fn put_by_id_checked(&self, ticket: &CacheTicket, table: &str, id: i64, row: R) -> bool {
        if !self.is_enabled(table) {
            return false;
        }
        let key = Self::id_key(table, id);

        let mut tables = self.tables.write();
        if !is_current(&tables, ticket) {
            drop(tables);
            self.sink.record(MetricsEvent::CacheStalePut { table });
            return false;
        }
        let swept = self.rows.put(key.clone(), row);
        prune(&mut tables, &swept);
        tables
            .entry(table.to_string())
            .or_default()
            .id_keys
            .insert(key.clone());
        for dependency in ticket.tables() {
            tables
                .entry(dependency.to_string())
                .or_default()
                .id_keys
                .insert(key.clone());
        }
        drop(tables);

        self.sink.record(MetricsEvent::CachePut {
            kind: CacheKind::Row,
            table,
        });
        true
    }

    /// Cached rows for `ids` plus the ids the caller still has to fetch.
    #[must_use]
    pub fn get_by_ids(&self, table: &str, ids: &[i64]) -> (Vec<(i64, R)>, Vec<i64>) {
        if !self.is_enabled(table) {
            return (Vec::new(), ids.to_vec());
        }

        let mut hits = Vec::new();
        let mut missing = Vec::new();
        for &id in ids {
            match self.rows.get(&Self::id_key(table, id)) {
                Some(row) => hits.push((id, row)),
                None => missing.push(id),
            }
        }

        debug!(table, hits = hits.len(), missing = missing.len(), "row cache lookup");
        if !hits.is_empty() {
            self.sink.record(MetricsEvent::CacheHit {
                kind: CacheKind::Row,
                table,
                entries: hits.len() as u64,
            });
        }
        if !missing.is_empty() {
            self.sink.record(MetricsEvent::CacheMiss {
                kind: CacheKind::Row,
                table,
                entries: missing.len() as u64,
            });
        }

        (hits, missing)
    }

    pub fn remove_by_id(&self, table: &str, id: i64) {
        let key = Self::id_key(table, id);

        let mut tables = self.tables.write();
        self.rows.remove(&key);
        if let Some(index) = tables.get_mut(table) {
            index.id_keys.remove(&key);
        }
    }

    // results

    pub fn put_by_sql(
        &self,
        table: &str,
        sql: &str,
        args: &[Value],
        value: Vec<R>,
    ) -> Result<(), CacheError> {
        if !self.is_enabled(table) {
            return Ok(());
        }
        let key = Self::sql_key(table, sql, args)?;

        let mut tables = self.tables.write();
        let swept = self.results.put(key.clone(), value);
        prune(&mut tables, &swept);
        tables.entry(table.to_string()).or_default().sql_keys.insert(key);
        drop(tables);

        self.sink.record(MetricsEvent::CachePut {
            kind: CacheKind::Result,
            table,
        });

        Ok(())
    }

    /// Put a query result unless any table in `ticket` was invalidated
    /// since the ticket was taken. The key is indexed under every ticket
    /// table, so a write to any joined table drops it.
    pub fn put_by_sql_checked(
        &self,
        ticket: &CacheTicket,
        table: &str,
        sql: &str,
        args: &[Value],
        value: Vec<R>,
    ) -> Result<bool, CacheError> {
        if !self.is_enabled(table) {
            return Ok(false);
        }
        let key = Self::sql_key(table, sql, args)?;

        let mut tables = self.tables.write();
        if !is_current(&tables, ticket) {
            drop(tables);
            self.sink.record(MetricsEvent::CacheStalePut { table });
            return Ok(false);
        }
        let swept = self.results.put(key.clone(), value);
        prune(&mut tables, &swept);
        tables
            .entry(table.to_string())
            .or_default()
            .sql_keys
            .insert(key.clone());
        for dependency in ticket.tables() {
            tables
                .entry(dependency.to_string())
                .or_default()
                .sql_keys
                .insert(key.clone());
        }
        drop(tables);

        self.sink.record(MetricsEvent::CachePut {
            kind: CacheKind::Result,
            table,
        });

        Ok(true)
    }

    pub fn get_by_sql(
        &self,
        table: &str,
        sql: &str,
        args: &[Value],
    ) -> Result<Option<Vec<R>>, CacheError> {
        if !self.is_enabled(table) {
            return Ok(None);
        }
        let found = self.results.get(&Self::sql_key(table, sql, args)?);

        debug!(table, hit = found.is_some(), "result cache lookup");
        let event = if found.is_some() {
            MetricsEvent::CacheHit {
                kind: CacheKind::Result,
                table,
                entries: 1,
            }
        } else {
            MetricsEvent::CacheMiss {
                kind: CacheKind::Result,
                table,
                entries: 1,
            }
        };
        self.sink.record(event);

        Ok(found)
    }

    pub fn remove_by_sql(&self, table: &str, sql: &str, args: &[Value]) -> Result<(), CacheError> {
        let key = Self::sql_key(table, sql, args)?;

        let mut tables = self.tables.write();
        self.results.remove(&key);
        if let Some(index) = tables.get_mut(table) {
            index.sql_keys.remove(&key);
        }

        Ok(())
    }

    // invalidation

    /// Generations of `tables` as of now.
    #[must_use]
    pub fn ticket(&self, tables: &[&str]) -> CacheTicket {
        let index = self.tables.read();
        let mut stamps: Vec<(String, u64)> = Vec::with_capacity(tables.len());
        for table in tables {
            if stamps.iter().any(|(seen, _)| seen == table) {
                continue;
            }
            let generation = index.get(*table).map_or(0, |t| t.generation);
            stamps.push(((*table).to_string(), generation));
        }

        CacheTicket { stamps }
    }

    /// Drop every row and result cached under `table` and move its
    /// generation so in-flight populating reads discard their puts.
    pub fn clear_by_table(&self, table: &str) -> usize {
        let mut tables = self.tables.write();
        let index = tables.entry(table.to_string()).or_default();
        index.generation = index.generation.wrapping_add(1);

        let id_keys = std::mem::take(&mut index.id_keys);
        let sql_keys = std::mem::take(&mut index.sql_keys);
        let mut removed = 0usize;
        for key in &id_keys {
            removed += usize::from(self.rows.remove(key));
        }
        for key in &sql_keys {
            removed += usize::from(self.results.remove(key));
        }
        drop(tables);

        debug!(table, removed, "cache cleared for table");
        self.sink.record(MetricsEvent::CacheInvalidate {
            table,
            keys_removed: removed as u64,
        });

        removed
    }

    /// Drop everything; every table generation moves.
    pub fn clear(&self) {
        let mut tables = self.tables.write();
        for index in tables.values_mut() {
            index.generation = index.generation.wrapping_add(1);
            index.id_keys.clear();
            index.sql_keys.clear();
        }
        self.rows.clear();
        self.results.clear();
    }

    /// Drop expired entries from both stores and from the table index.
    pub fn sweep(&self) -> usize {
        let mut tables = self.tables.write();
        let mut swept = self.rows.sweep();
        swept.extend(self.results.sweep());
        prune(&mut tables, &swept);
        drop(tables);

        debug!(removed = swept.len(), "cache swept");
        swept.len()
    }

    /// Keys held by the table index, counted once per indexing table.
    #[must_use]
    pub fn indexed_keys(&self) -> usize {
        self.tables
            .read()
            .values()
            .map(|index| index.id_keys.len() + index.sql_keys.len())
            .sum()
    }
}

// Forget swept keys; tables left with no keys keep their generation.
fn prune(tables: &mut HashMap<String, TableIndex>, swept: &[String]) {
    if swept.is_empty() {
        return;
    }
    for index in tables.values_mut() {
        for key in swept {
            index.id_keys.remove(key);
            index.sql_keys.remove(key);
        }
    }
}

fn is_current(tables: &HashMap<String, TableIndex>, ticket: &CacheTicket) -> bool {
    ticket
        .stamps
        .iter()
        .all(|(table, stamp)| tables.get(table).map_or(0, |t| t.generation) == *stamp)
}
