//! ## Crate layout
//! - `core`: domain language, SQL compiler, query assembly, result cache and
//!   the session that runs statements through an [`Executor`](prelude::Executor).
//! - `error`: the public error taxonomy every core failure maps onto.
//!
//! The `prelude` module is the surface application code needs to describe
//! models, build domains and search through a session.

pub use sqldomain_core as core;

pub mod error;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use error::Error;

///
/// Prelude
///

pub mod prelude {
    pub use crate::core::{
        config::OrmConfig,
        db::{
            dialect::{Dialect, MySql, Postgres},
            domain::{DomainNode, DomainOperator, Operator, parse},
            expression::Context,
            session::{Executor, Record, SearchOptions, Session},
        },
        model::{EntityModel, FieldKind, FieldModel, Registry},
        value::Value,
    };
}
