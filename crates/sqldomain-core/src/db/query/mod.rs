//! Statement assembly: FROM tables, explicit joins and WHERE fragments.
//!
//! A [`Query`] is built once per statement by [`where_calc`], extended with
//! the joins needed for inherited columns and ordering, rendered, then
//! dropped.

mod calc;

#[cfg(test)]
mod tests;

use crate::{
    db::{
        dialect::Dialect,
        expression::{AliasPolicy, TableRef, generate_table_alias},
    },
    value::Value,
};
use derive_more::Display;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error as ThisError;

// re-exports
pub use calc::{inherits_join_calc, order_calc, where_calc};

///
/// QueryError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum QueryError {
    #[error("cannot join from unknown alias '{alias}'")]
    UnknownAlias { alias: String },

    #[error("invalid order specification '{spec}'")]
    InvalidOrder { spec: String },

    #[error("cannot order '{model}' by unknown field '{field}'")]
    UnknownOrderField { field: String, model: String },
}

///
/// JoinKind
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum JoinKind {
    #[display("JOIN")]
    Inner,
    #[display("LEFT JOIN")]
    Left,
}

///
/// Connection
/// One hop to add: `lhs_alias.lhs_column = <new alias>.column`.
///

#[derive(Clone, Copy, Debug)]
pub struct Connection<'a> {
    pub lhs_alias: &'a str,
    pub table: &'a str,
    pub lhs_column: &'a str,
    pub column: &'a str,
    pub link: &'a str,
}

///
/// JoinSpec
/// An explicit join registered under its left-hand alias.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JoinSpec {
    pub rhs_alias: String,
    pub lhs_column: String,
    pub rhs_column: String,
    pub kind: JoinKind,
}

///
/// Query
///
/// FROM tables in insertion order, WHERE fragments with their positional
/// parameters, explicit joins keyed by left-hand alias and the extra
/// ON-clause conditions keyed by `(lhs, rhs)`. `reads` lists tables the
/// WHERE clause depends on without joining them. `paths` maps a joined
/// alias to its unhashed form, so nested joins extend the full path.
///

#[derive(Clone, Debug, Default)]
pub struct Query {
    tables: Vec<TableRef>,
    where_clause: Vec<String>,
    where_params: Vec<Value>,
    joins: BTreeMap<String, Vec<JoinSpec>>,
    extras: BTreeMap<(String, String), (String, Vec<Value>)>,
    reads: Vec<String>,
    paths: BTreeMap<String, String>,
}

impl Query {
    #[must_use]
    pub fn new(tables: Vec<TableRef>, where_clause: Vec<String>, where_params: Vec<Value>) -> Self {
        Self {
            tables,
            where_clause,
            where_params,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn tables(&self) -> &[TableRef] {
        &self.tables
    }

    /// Record tables read by sub-selects or sub-searches of the WHERE
    /// clause.
    #[must_use]
    pub fn with_reads(mut self, reads: impl IntoIterator<Item = String>) -> Self {
        for table in reads {
            if !self.reads.contains(&table) {
                self.reads.push(table);
            }
        }
        self
    }

    /// Record the unhashed alias each joined alias was derived from.
    #[must_use]
    pub fn with_alias_paths(mut self, paths: impl IntoIterator<Item = (String, String)>) -> Self {
        self.paths
            .extend(paths.into_iter().filter(|(alias, path)| alias != path));
        self
    }

    /// Unhashed alias behind `alias`; aliases never shortened map to
    /// themselves.
    #[must_use]
    pub fn alias_path<'a>(&'a self, alias: &'a str) -> &'a str {
        self.paths.get(alias).map_or(alias, String::as_str)
    }

    /// Table names whose contents the statement depends on, FROM tables
    /// first.
    #[must_use]
    pub fn dependencies(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        let from = self.tables.iter().map(|t| t.table.as_str());
        for table in from.chain(self.reads.iter().map(String::as_str)) {
            if !out.contains(&table) {
                out.push(table);
            }
        }

        out
    }

    #[must_use]
    pub fn where_clause(&self) -> &[String] {
        &self.where_clause
    }

    #[must_use]
    pub fn where_params(&self) -> &[Value] {
        &self.where_params
    }

    #[must_use]
    pub fn has_alias(&self, alias: &str) -> bool {
        self.tables.iter().any(|t| t.alias == alias)
    }

    /// Append a WHERE fragment.
    pub fn push_where(&mut self, clause: impl Into<String>, params: impl IntoIterator<Item = Value>) {
        self.where_clause.push(clause.into());
        self.where_params.extend(params);
    }

    /// Join `connection.table` onto `connection.lhs_alias`.
    ///
    /// Implicit joins add the table to FROM and the equality to WHERE.
    /// Explicit joins register a `[LEFT] JOIN ... ON (...)` under the
    /// left-hand alias, which must already be in FROM. `extra` is an
    /// additional ON condition; `{lhs}` and `{rhs}` expand to the quoted
    /// aliases. Joining an alias twice is a no-op.
    pub fn add_join(
        &mut self,
        connection: Connection<'_>,
        implicit: bool,
        outer: bool,
        extra: Option<(String, Vec<Value>)>,
        dialect: &dyn Dialect,
        policy: &AliasPolicy,
    ) -> Result<(String, TableRef), QueryError> {
        let path = generate_table_alias(self.alias_path(connection.lhs_alias), &[connection.link]);
        let alias = policy.apply(path.clone());
        let table = TableRef::new(connection.table, alias.clone());
        if alias != path {
            self.paths.insert(alias.clone(), path);
        }

        if implicit {
            if !self.has_alias(&alias) {
                self.tables.push(table.clone());
                self.where_clause.push(format!(
                    "({} = {})",
                    dialect.column(connection.lhs_alias, connection.lhs_column),
                    dialect.column(&alias, connection.column),
                ));
            }
            return Ok((alias, table));
        }

        if !self.has_alias(connection.lhs_alias) {
            return Err(QueryError::UnknownAlias {
                alias: connection.lhs_alias.to_string(),
            });
        }
        if self.has_alias(&alias) {
            return Ok((alias, table));
        }

        self.tables.push(table.clone());
        self.joins
            .entry(connection.lhs_alias.to_string())
            .or_default()
            .push(JoinSpec {
                rhs_alias: alias.clone(),
                lhs_column: connection.lhs_column.to_string(),
                rhs_column: connection.column.to_string(),
                kind: if outer { JoinKind::Left } else { JoinKind::Inner },
            });
        if let Some((condition, params)) = extra {
            let condition = condition
                .replace("{lhs}", &dialect.quote(connection.lhs_alias))
                .replace("{rhs}", &dialect.quote(&alias));
            self.extras.insert(
                (connection.lhs_alias.to_string(), alias.clone()),
                (condition, params),
            );
        }

        Ok((alias, table))
    }

    /// `(from, where, params)`.
    ///
    /// Explicitly joined tables are rendered depth-first after the table
    /// they hang off and are not repeated in the comma-separated list.
    /// Parameters of join conditions come before WHERE parameters.
    #[must_use]
    pub fn get_sql(&self, dialect: &dyn Dialect) -> (String, String, Vec<Value>) {
        let joined: BTreeSet<&str> = self
            .joins
            .values()
            .flatten()
            .map(|spec| spec.rhs_alias.as_str())
            .collect();

        let mut from = String::new();
        let mut params = Vec::new();
        let mut first = true;
        for table in &self.tables {
            if joined.contains(table.alias.as_str()) {
                continue;
            }
            if !first {
                from.push_str(", ");
            }
            first = false;

            from.push_str(&table.sql(dialect));
            self.render_joins(&table.alias, dialect, &mut from, &mut params);
        }

        params.extend(self.where_params.iter().cloned());

        (from, self.where_clause.join(" AND "), params)
    }

    fn render_joins(
        &self,
        lhs: &str,
        dialect: &dyn Dialect,
        from: &mut String,
        params: &mut Vec<Value>,
    ) {
        let Some(specs) = self.joins.get(lhs) else {
            return;
        };

        for spec in specs {
            let Some(table) = self.tables.iter().find(|t| t.alias == spec.rhs_alias) else {
                continue;
            };
            from.push_str(&format!(
                " {} {} ON ({} = {}",
                spec.kind,
                table.sql(dialect),
                dialect.column(lhs, &spec.lhs_column),
                dialect.column(&spec.rhs_alias, &spec.rhs_column),
            ));
            if let Some((condition, extra)) = self.extras.get(&(lhs.to_string(), spec.rhs_alias.clone())) {
                if !condition.is_empty() {
                    from.push_str(" AND ");
                    from.push_str(condition);
                }
                params.extend(extra.iter().cloned());
            }
            from.push(')');

            self.render_joins(&spec.rhs_alias, dialect, from, params);
        }
    }

    /// Full `SELECT` over this query.
    #[must_use]
    pub fn select(
        &self,
        dialect: &dyn Dialect,
        columns: &[String],
        order_by: &[String],
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> (String, Vec<Value>) {
        let (from, where_sql, params) = self.get_sql(dialect);

        let mut sql = format!("SELECT {} FROM {from}", columns.join(", "));
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }
        if !order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_by.join(", "));
        }
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        (sql, params)
    }

    #[must_use]
    pub fn count(&self, dialect: &dyn Dialect) -> (String, Vec<Value>) {
        let column = format!("count(1) AS {}", dialect.quote("count"));
        self.select(dialect, &[column], &[], None, None)
    }
}
