use derive_more::Display;
use serde::{Deserialize, Serialize};
use sqldomain_core::{
    db::{expression::CompileError, session::ExecError},
    error::Error as CoreError,
};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }
}

impl From<CoreError> for Error {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();

        match err {
            CoreError::Domain(_) => Self::new(
                ErrorKind::Query(QueryErrorKind::Syntax),
                ErrorOrigin::Domain,
                message,
            ),

            CoreError::Compile(err) => {
                let kind = match err {
                    CompileError::UnsupportedOperator { .. }
                    | CompileError::AutoJoinMany2Many { .. } => {
                        ErrorKind::Query(QueryErrorKind::Unsupported)
                    }
                    CompileError::MissingParameter { .. }
                    | CompileError::UnusedParameters { .. } => {
                        ErrorKind::Query(QueryErrorKind::Parameters)
                    }
                    CompileError::Internal(_) => ErrorKind::Internal,
                    _ => ErrorKind::Query(QueryErrorKind::Invalid),
                };
                Self::new(kind, ErrorOrigin::Compiler, message)
            }

            CoreError::Query(_) => Self::new(
                ErrorKind::Query(QueryErrorKind::Invalid),
                ErrorOrigin::Query,
                message,
            ),

            CoreError::Model(_) => Self::new(ErrorKind::Model, ErrorOrigin::Model, message),

            CoreError::Exec(err) => {
                let kind = match err {
                    ExecError::ReadOnlyField { .. } => ErrorKind::Write(WriteErrorKind::ReadOnly),
                    ExecError::Driver { .. } | ExecError::MissingColumn { .. } => {
                        ErrorKind::Execution
                    }
                };
                Self::new(kind, ErrorOrigin::Session, message)
            }

            CoreError::Config(_) => Self::new(ErrorKind::Config, ErrorOrigin::Config, message),
        }
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    Query(QueryErrorKind),
    Write(WriteErrorKind),

    /// Model metadata is inconsistent (unknown model, inheritance cycle).
    Model,

    /// The SQL executor failed or returned an unexpected shape.
    Execution,

    Config,

    /// The caller cannot remediate this.
    Internal,
}

///
/// QueryErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum QueryErrorKind {
    /// Domain text or structure is malformed.
    Syntax,

    /// Well-formed domain naming unknown fields or malformed leaves.
    Invalid,

    /// Valid leaf, but the operator or join is not supported on that field.
    Unsupported,

    /// `?` placeholders and bound parameters disagree.
    Parameters,
}

///
/// WriteErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum WriteErrorKind {
    /// The field has no column of its own.
    ReadOnly,
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Domain,
    Compiler,
    Query,
    Model,
    Session,
    Config,
}
