use crate::{
    config::OrmConfig,
    db::{
        cache::ResultCache,
        dialect::Dialect,
        domain::{DomainNode, Operator},
        expression::{CompileEnv, CompileError, Context, Orm, TableRef},
        query::{Query, inherits_join_calc, order_calc, where_calc},
        session::{ExecError, Executor, Record, SearchOptions},
    },
    error::Error,
    model::{EntityModel, Registry},
    obs::{MetricsEvent, MetricsSink, NoopSink},
    value::Value,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tracing::{debug, warn};

///
/// Session
///
/// Owns everything a statement needs: the model registry, the SQL dialect,
/// the shared result cache, the executor and the configuration. Reads go
/// through the cache; writes execute, then invalidate before returning.
///

pub struct Session<E> {
    registry: Arc<Registry>,
    dialect: Arc<dyn Dialect>,
    cache: Arc<ResultCache<Record>>,
    executor: E,
    config: OrmConfig,
    sink: Arc<dyn MetricsSink>,
}

impl<E: Executor> Session<E> {
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        dialect: Arc<dyn Dialect>,
        executor: E,
        config: OrmConfig,
    ) -> Self {
        let cache = Arc::new(ResultCache::new(&config.cache));

        Self {
            registry,
            dialect,
            cache,
            executor,
            config,
            sink: Arc::new(NoopSink),
        }
    }

    /// Send compiler, statement and cache events to `sink`. The session's
    /// cache is rebuilt empty so it reports there too; share a cache with
    /// [`Session::with_cache`] afterwards if needed.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.cache = Arc::new(ResultCache::new(&self.config.cache).with_sink(Arc::clone(&sink)));
        self.sink = sink;
        self
    }

    /// Use a cache shared with other sessions over the same database.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ResultCache<Record>>) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn cache(&self) -> &ResultCache<Record> {
        &self.cache
    }

    #[must_use]
    pub const fn config(&self) -> &OrmConfig {
        &self.config
    }

    #[must_use]
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    fn env<'s>(&'s self, context: &'s Context) -> CompileEnv<'s> {
        CompileEnv::new(
            &self.registry,
            self.dialect.as_ref(),
            self,
            context,
            &self.config.compiler,
        )
        .with_sink(self.sink.as_ref())
    }

    //
    // reads
    //

    /// Compile `domain` over `model` into a [`Query`].
    pub fn where_calc(
        &self,
        model: &str,
        domain: &DomainNode,
        params: &[Value],
        context: &Context,
    ) -> Result<Query, Error> {
        let model = self.registry.model(model)?;

        where_calc(&self.env(context), model, domain, params)
    }

    /// Ids of `model` records matching `domain`, cached by statement.
    pub fn search(
        &self,
        model: &str,
        domain: &DomainNode,
        params: &[Value],
        options: &SearchOptions,
        context: &Context,
    ) -> Result<Vec<i64>, Error> {
        let model = self.registry.model(model)?;
        let env = self.env(context);
        let mut query = where_calc(&env, model, domain, params)?;
        let order = order_calc(&env, model, &options.order, &mut query)?;

        let dialect = self.dialect.as_ref();
        let id_column = format!(
            "{} AS {}",
            dialect.column(model.table(), model.id_field()),
            dialect.quote(model.id_field())
        );
        let (sql, args) = query.select(dialect, &[id_column], &order, options.limit, options.offset);
        let rows = self.cached_query(model.table(), &query.dependencies(), &sql, &args)?;

        let mut seen = BTreeSet::new();
        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            let id = int_column(row, model.id_field())?;
            if seen.insert(id) {
                ids.push(id);
            }
        }

        Ok(ids)
    }

    pub fn search_count(
        &self,
        model: &str,
        domain: &DomainNode,
        params: &[Value],
        context: &Context,
    ) -> Result<u64, Error> {
        let model = self.registry.model(model)?;
        let query = where_calc(&self.env(context), model, domain, params)?;

        let (sql, args) = query.count(self.dialect.as_ref());
        let rows = self.cached_query(model.table(), &query.dependencies(), &sql, &args)?;
        let count = rows
            .first()
            .ok_or_else(|| ExecError::MissingColumn {
                column: "count".to_string(),
            })
            .and_then(|row| int_column(row, "count"))?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Ids whose `rec_name` matches `name` under `op`. An empty name matches
    /// every record.
    pub fn name_search(
        &self,
        model: &str,
        name: &Value,
        op: Operator,
        limit: Option<usize>,
        context: &Context,
    ) -> Result<Vec<i64>, Error> {
        let entity = self.registry.model(model)?;
        let domain = match name {
            Value::Text(text) if text.is_empty() => DomainNode::new(),
            _ => DomainNode::list([DomainNode::leaf(
                entity.rec_name.as_str(),
                op,
                name.clone(),
            )]),
        };
        let options = SearchOptions {
            limit,
            ..SearchOptions::default()
        };

        self.search(model, &domain, &[], &options, context)
    }

    /// Rows for `ids` in the order given, restricted to `fields` (all
    /// stored fields when empty). Cached rows are served from the row
    /// cache; the rest are fetched in one statement, inherited columns
    /// through implicit joins on the parent tables.
    pub fn read(
        &self,
        model: &str,
        ids: &[i64],
        fields: &[&str],
        context: &Context,
    ) -> Result<Vec<Record>, Error> {
        let entity = self.registry.model(model)?;
        for field in fields {
            if !entity.has_field(field) {
                return Err(CompileError::InvalidField {
                    field: (*field).to_string(),
                    model: entity.name.clone(),
                }
                .into());
            }
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let table = entity.table();
        let (hits, missing) = self.cache.get_by_ids(table, ids);
        let mut found: BTreeMap<i64, Record> = hits.into_iter().collect();
        if !missing.is_empty() {
            for row in self.fetch_rows(entity, &missing, context)? {
                let id = int_column(&row, entity.id_field())?;
                found.insert(id, row);
            }
        }

        Ok(ids
            .iter()
            .filter_map(|id| found.get(id))
            .map(|row| project(row, fields, entity.id_field()))
            .collect())
    }

    fn fetch_rows(
        &self,
        entity: &EntityModel,
        ids: &[i64],
        context: &Context,
    ) -> Result<Vec<Record>, Error> {
        let dialect = self.dialect.as_ref();
        let table = entity.table();
        let env = self.env(context);

        let mut query = Query::new(vec![TableRef::bare(table)], Vec::new(), Vec::new());
        let mut columns = vec![format!(
            "{} AS {}",
            dialect.column(table, entity.id_field()),
            dialect.quote(entity.id_field())
        )];
        for field in entity.fields() {
            if field.name == entity.id_field() || !field.has_column() {
                continue;
            }
            let qualified = inherits_join_calc(&env, table, &field.name, entity, &mut query)?;
            columns.push(format!("{qualified} AS {}", dialect.quote(&field.name)));
        }
        query.push_where(
            format!(
                "{} IN ({})",
                dialect.column(table, entity.id_field()),
                vec!["?"; ids.len()].join(",")
            ),
            ids.iter().copied().map(Value::Int),
        );

        let ticket = self.cache.ticket(&query.dependencies());
        let (sql, args) = query.select(dialect, &columns, &[], None, None);

        let rows = self.run_query(table, &sql, &args)?;
        for row in &rows {
            let id = int_column(row, entity.id_field())?;
            self.cache.put_by_id_checked(&ticket, table, id, row.clone());
        }

        Ok(rows)
    }

    //
    // writes
    //

    /// Update `ids` with `values`. Inherited fields are written to the
    /// parent records reached through their link field. Every touched table
    /// is invalidated before this returns.
    pub fn write(&self, model: &str, ids: &[i64], values: &Record) -> Result<u64, Error> {
        let entity = self.registry.model(model)?;
        if ids.is_empty() || values.is_empty() {
            return Ok(0);
        }

        let mut own: Vec<(&str, &Value)> = Vec::new();
        let mut delegated: BTreeMap<(&str, &str), Record> = BTreeMap::new();
        for (name, value) in values {
            let Some(field) = entity.get_field(name) else {
                return Err(CompileError::InvalidField {
                    field: name.clone(),
                    model: entity.name.clone(),
                }
                .into());
            };
            if field.name == entity.id_field() || !field.has_column() {
                return Err(ExecError::ReadOnlyField {
                    field: name.clone(),
                    model: entity.name.clone(),
                }
                .into());
            }

            match &field.inherited {
                Some(inherited) => {
                    delegated
                        .entry((inherited.parent_model.as_str(), inherited.link_field.as_str()))
                        .or_default()
                        .insert(name.clone(), value.clone());
                }
                None => own.push((name.as_str(), value)),
            }
        }

        let mut affected = 0;
        if !own.is_empty() {
            affected += self.update(entity, ids, &own)?;
        }
        for ((parent, link), parent_values) in delegated {
            let parent_ids = self.link_ids(entity, link, ids)?;
            affected += self.write(parent, &parent_ids, &parent_values)?;
        }

        Ok(affected)
    }

    pub fn unlink(&self, model: &str, ids: &[i64]) -> Result<u64, Error> {
        let entity = self.registry.model(model)?;
        if ids.is_empty() {
            return Ok(0);
        }

        let dialect = self.dialect.as_ref();
        let sql = format!(
            "DELETE FROM {} WHERE {} IN ({})",
            dialect.quote(entity.table()),
            dialect.quote(entity.id_field()),
            vec!["?"; ids.len()].join(",")
        );
        let params: Vec<Value> = ids.iter().copied().map(Value::Int).collect();

        let affected = self.run_execute(entity.table(), &sql, &params)?;
        self.cache.clear_by_table(entity.table());

        Ok(affected)
    }

    fn update(
        &self,
        entity: &EntityModel,
        ids: &[i64],
        assignments: &[(&str, &Value)],
    ) -> Result<u64, Error> {
        let dialect = self.dialect.as_ref();
        let set = assignments
            .iter()
            .map(|(name, _)| format!("{} = ?", dialect.quote(name)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {set} WHERE {} IN ({})",
            dialect.quote(entity.table()),
            dialect.quote(entity.id_field()),
            vec!["?"; ids.len()].join(",")
        );

        let mut params: Vec<Value> = assignments.iter().map(|(_, v)| (*v).clone()).collect();
        params.extend(ids.iter().copied().map(Value::Int));

        let affected = self.run_execute(entity.table(), &sql, &params)?;
        self.cache.clear_by_table(entity.table());

        Ok(affected)
    }

    // Parent ids behind `link` for `ids`, read straight from the table.
    fn link_ids(&self, entity: &EntityModel, link: &str, ids: &[i64]) -> Result<Vec<i64>, Error> {
        let dialect = self.dialect.as_ref();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} IN ({})",
            dialect.quote(link),
            dialect.quote(entity.table()),
            dialect.quote(entity.id_field()),
            vec!["?"; ids.len()].join(",")
        );
        let params: Vec<Value> = ids.iter().copied().map(Value::Int).collect();

        let mut seen = BTreeSet::new();
        Ok(self
            .run_query(entity.table(), &sql, &params)?
            .iter()
            .filter_map(|row| row.get(link).and_then(Value::as_int))
            .filter(|id| seen.insert(*id))
            .collect())
    }

    //
    // statements
    //

    // Serve `sql` from the result cache, or run it and populate the cache
    // unless one of `tables` was invalidated meanwhile.
    fn cached_query(
        &self,
        table: &str,
        dependencies: &[&str],
        sql: &str,
        args: &[Value],
    ) -> Result<Vec<Record>, Error> {
        let ticket = self.cache.ticket(dependencies);

        match self.cache.get_by_sql(table, sql, args) {
            Ok(Some(rows)) => return Ok(rows),
            Ok(None) => {}
            Err(err) => warn!(table, error = %err, "result cache unavailable, querying directly"),
        }

        let rows = self.run_query(table, sql, args)?;
        if let Err(err) = self
            .cache
            .put_by_sql_checked(&ticket, table, sql, args, rows.clone())
        {
            warn!(table, error = %err, "result not cached");
        }

        Ok(rows)
    }

    fn run_query(&self, table: &str, sql: &str, args: &[Value]) -> Result<Vec<Record>, Error> {
        debug!(table, sql, params = args.len(), "query");
        let rows = self.executor.query(sql, args)?;
        self.sink.record(MetricsEvent::Statement {
            table,
            rows: rows.len() as u64,
        });

        Ok(rows)
    }

    fn run_execute(&self, table: &str, sql: &str, args: &[Value]) -> Result<u64, Error> {
        debug!(table, sql, params = args.len(), "execute");
        let affected = self.executor.execute(sql, args)?;
        self.sink.record(MetricsEvent::Statement {
            table,
            rows: affected,
        });

        Ok(affected)
    }
}

impl<E: Executor> Orm for Session<E> {
    fn search(
        &self,
        model: &str,
        domain: &DomainNode,
        context: &Context,
    ) -> Result<Vec<i64>, Error> {
        Self::search(self, model, domain, &[], &SearchOptions::default(), context)
    }

    fn name_search(
        &self,
        model: &str,
        name: &Value,
        op: Operator,
        context: &Context,
    ) -> Result<Vec<i64>, Error> {
        Self::name_search(self, model, name, op, None, context)
    }

    fn read_ids(
        &self,
        model: &str,
        field: &str,
        ids: &[i64],
        context: &Context,
    ) -> Result<Vec<i64>, Error> {
        Ok(self
            .read(model, ids, &[field], context)?
            .iter()
            .filter_map(|row| row.get(field).and_then(Value::as_int))
            .collect())
    }
}

fn int_column(row: &Record, column: &str) -> Result<i64, ExecError> {
    row.get(column)
        .and_then(Value::as_int)
        .ok_or_else(|| ExecError::MissingColumn {
            column: column.to_string(),
        })
}

// Keep the id plus the requested fields; everything when none are named.
fn project(row: &Record, fields: &[&str], id_field: &str) -> Record {
    if fields.is_empty() {
        return row.clone();
    }

    row.iter()
        .filter(|(name, _)| name.as_str() == id_field || fields.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
