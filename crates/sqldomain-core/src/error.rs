use crate::{
    config::ConfigError,
    db::{
        domain::DomainError, expression::CompileError, query::QueryError, session::ExecError,
    },
    model::ModelError,
};
use thiserror::Error as ThisError;

///
/// Error
///
/// Every failure the core can surface. Each layer keeps its own enum; this
/// one only collects them so `?` works across layer boundaries.
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Syntax-level failure in the domain text or structure.
    #[must_use]
    pub const fn is_syntax(&self) -> bool {
        matches!(self, Self::Domain(_))
    }
}
