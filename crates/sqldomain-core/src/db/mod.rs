//! Database-facing layers, bottom-up: the domain language, the expression
//! compiler, query assembly, the result cache and the session.

pub mod cache;
pub mod dialect;
pub mod domain;
pub mod expression;
pub mod query;
pub mod session;
