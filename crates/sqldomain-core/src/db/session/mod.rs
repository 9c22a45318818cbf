//! Session glue: runs compiled statements through an external [`Executor`]
//! and keeps the [`ResultCache`](crate::db::cache::ResultCache) coherent.

mod orm;

#[cfg(test)]
mod tests;

use crate::value::Value;
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

// re-exports
pub use orm::Session;

/// One result row, keyed by column name.
pub type Record = BTreeMap<String, Value>;

///
/// ExecError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ExecError {
    #[error("statement failed: {message}")]
    Driver { message: String },

    #[error("statement returned no '{column}' column")]
    MissingColumn { column: String },

    #[error("field '{model}.{field}' cannot be written")]
    ReadOnlyField { field: String, model: String },
}

impl ExecError {
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }
}

///
/// Executor
///
/// The SQL driver. Parameters are positional and bind to `?` in order.
///

pub trait Executor: Send + Sync {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>, ExecError>;

    /// Run a statement; returns the affected row count.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, ExecError>;
}

///
/// SearchOptions
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SearchOptions {
    /// `"field [asc|desc], ..."`; empty means the model's default order.
    pub order: String,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl SearchOptions {
    #[must_use]
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = order.into();
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}
