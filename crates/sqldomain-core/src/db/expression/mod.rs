//! Domain-to-SQL compiler.
//!
//! A normalized, negation-free domain is resolved leaf by leaf against the
//! model registry: dotted paths become joins or sub-searches, relational
//! and computed fields are rewritten, and what remains is emitted as a
//! parameterized WHERE fragment.

mod compile;
mod hierarchy;
mod join;
mod leaf;
mod sql;

#[cfg(test)]
mod tests;

use crate::{
    config::CompilerConfig,
    db::{
        dialect::Dialect,
        domain::{DomainNode, Operator},
    },
    error::Error,
    model::Registry,
    obs::{MetricsSink, NoopSink},
    value::Value,
};
use thiserror::Error as ThisError;

// re-exports
pub use compile::Expression;
pub use join::{AliasPolicy, JoinContext, TableRef, generate_table_alias};
pub use leaf::{ExtendedLeaf, Leaf, Term};
pub use sql::bind_params;

///
/// CompileError
///
/// Semantic errors; all of them abort before any SQL is issued.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum CompileError {
    #[error("invalid field '{field}' in leaf for model '{model}'")]
    InvalidField { field: String, model: String },

    #[error("invalid leaf {leaf}")]
    InvalidLeaf { leaf: String },

    #[error("field '{model}.{field}' is not a relation and cannot be traversed")]
    NotRelational { field: String, model: String },

    #[error("operator '{op}' is not supported on field '{model}.{field}'")]
    UnsupportedOperator {
        field: String,
        model: String,
        op: String,
    },

    #[error("auto_join is not supported on many2many field '{model}.{field}'")]
    AutoJoinMany2Many { field: String, model: String },

    #[error("missing value for query parameter #{index}")]
    MissingParameter { index: usize },

    #[error("{given} query parameters given but only {used} placeholders")]
    UnusedParameters { given: usize, used: usize },

    #[error("expression compiler invariant violated: {0}")]
    Internal(String),
}

///
/// Context
/// Per-call search context.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Context {
    pub lang: Option<String>,
    /// Hide inactive records unless the domain mentions `active`.
    pub active_test: bool,
}

impl Context {
    #[must_use]
    pub const fn with_active_test(mut self, active_test: bool) -> Self {
        self.active_test = active_test;
        self
    }
}

impl Default for Context {
    fn default() -> Self {
        Self {
            lang: None,
            active_test: true,
        }
    }
}

///
/// Orm
///
/// Callbacks the compiler needs from the surrounding ORM: sub-searches for
/// non-joined paths, name resolution and hierarchy walks.
///

pub trait Orm {
    /// Ids of `model` records matching `domain`.
    fn search(
        &self,
        model: &str,
        domain: &DomainNode,
        context: &Context,
    ) -> Result<Vec<i64>, Error>;

    /// Ids whose display name matches `name` under `op`.
    fn name_search(
        &self,
        model: &str,
        name: &Value,
        op: Operator,
        context: &Context,
    ) -> Result<Vec<i64>, Error>;

    /// Many-to-one `field` values of the given records, nulls skipped.
    fn read_ids(
        &self,
        model: &str,
        field: &str,
        ids: &[i64],
        context: &Context,
    ) -> Result<Vec<i64>, Error>;
}

///
/// CompileEnv
/// Everything a compilation borrows from its caller.
///

#[derive(Clone, Copy)]
pub struct CompileEnv<'r> {
    pub registry: &'r Registry,
    pub dialect: &'r dyn Dialect,
    pub orm: &'r dyn Orm,
    pub context: &'r Context,
    pub config: &'r CompilerConfig,
    pub sink: &'r dyn MetricsSink,
}

impl<'r> CompileEnv<'r> {
    #[must_use]
    pub fn new(
        registry: &'r Registry,
        dialect: &'r dyn Dialect,
        orm: &'r dyn Orm,
        context: &'r Context,
        config: &'r CompilerConfig,
    ) -> Self {
        Self {
            registry,
            dialect,
            orm,
            context,
            config,
            sink: &NoopSink,
        }
    }

    #[must_use]
    pub const fn with_sink(mut self, sink: &'r dyn MetricsSink) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub const fn alias_policy(&self) -> AliasPolicy {
        AliasPolicy::from_config(self.config)
    }
}
