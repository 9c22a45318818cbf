//! Domain expression language: tokenizing, the domain tree, normalization
//! and negation distribution.
//!
//! The pipeline is `parse` → `normalize` → `distribute_not`; the compiler
//! only ever sees normalized, negation-free domains.

mod lexer;
mod negate;
mod node;
mod normalize;
mod operator;
mod parser;


use thiserror::Error as ThisError;

// re-exports
pub use negate::distribute_not;
pub use node::DomainNode;
pub use normalize::{is_balanced, normalize};
pub use operator::{DomainOperator, Operator};
pub use parser::{DEFAULT_MAX_DEPTH, parse, parse_with_depth};

///
/// DomainError
///
/// Syntax errors raised while reading a domain.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum DomainError {
    #[error("unexpected character '{ch}' at offset {pos} in domain")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("invalid number literal '{text}' at offset {pos} in domain")]
    InvalidNumber { text: String, pos: usize },

    #[error("domain nesting exceeds the maximum depth of {max}")]
    TooDeep { max: usize },

    #[error("domain is syntactically not correct: {domain}")]
    Unbalanced { domain: String },
}

/// Parse, normalize and distribute negations in one step.
pub fn prepare(text: &str, max_depth: usize) -> Result<DomainNode, DomainError> {
    let parsed = parse_with_depth(text, max_depth)?;
    let normalized = normalize(&parsed)?;

    Ok(distribute_not(&normalized))
}
