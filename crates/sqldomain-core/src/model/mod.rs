//! Runtime model metadata consumed by the compiler: entities, fields and
//! the registry that resolves `_inherits` links.

mod entity;
mod field;
mod registry;


use thiserror::Error as ThisError;

// re-exports
pub use entity::{EntityModel, MAGIC_COLUMNS, Relation};
pub use field::{FieldKind, FieldModel, FieldSearch, Inherited};
pub use registry::{Registry, RegistryBuilder};

///
/// ModelError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ModelError {
    #[error("unknown model '{model}'")]
    UnknownModel { model: String },

    #[error("model '{model}' is registered twice")]
    DuplicateModel { model: String },

    #[error("field '{model}.{field}' points at unknown model '{comodel}'")]
    UnknownComodel {
        model: String,
        field: String,
        comodel: String,
    },

    #[error("inheritance cycle through model '{model}'")]
    InheritanceCycle { model: String },
}
