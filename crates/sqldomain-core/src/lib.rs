//! Core of the sqldomain ORM: the domain language, the domain-to-SQL
//! compiler, query assembly, the result cache and the session glue that
//! ties them to an external SQL executor.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod obs;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_fixtures;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, caches or executors are re-exported here.
///

pub mod prelude {
    pub use crate::{
        db::{
            domain::{DomainNode, DomainOperator, Operator},
            expression::Context,
        },
        model::{EntityModel, FieldKind, FieldModel, Registry},
        value::Value,
    };
}
