use crate::{
    config::{AliasOverflow, CompilerConfig},
    db::dialect::Dialect,
    model::EntityModel,
};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use tracing::warn;

///
/// AliasPolicy
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AliasPolicy {
    pub limit: usize,
    pub overflow: AliasOverflow,
}

impl AliasPolicy {
    #[must_use]
    pub const fn from_config(config: &CompilerConfig) -> Self {
        Self {
            limit: config.alias_limit,
            overflow: config.alias_overflow,
        }
    }

    /// Apply the overflow policy to a generated alias.
    #[must_use]
    pub fn apply(&self, alias: String) -> String {
        if alias.len() < self.limit {
            return alias;
        }

        match self.overflow {
            AliasOverflow::Warn => {
                warn!(
                    alias = %alias,
                    limit = self.limit,
                    "table alias exceeds the identifier length limit"
                );
                alias
            }
            AliasOverflow::Hash => hash_alias(&alias, self.limit),
        }
    }
}

impl Default for AliasPolicy {
    fn default() -> Self {
        Self::from_config(&CompilerConfig::default())
    }
}

/// `root__link1__link2...`
#[must_use]
pub fn generate_table_alias(root: &str, links: &[&str]) -> String {
    let mut alias = root.to_string();
    for link in links {
        alias.push_str("__");
        alias.push_str(link);
    }

    alias
}

// Prefix of the alias plus 8 hex digits of its SHA-256, shorter than `limit`.
fn hash_alias(alias: &str, limit: usize) -> String {
    let digest = Sha256::digest(alias.as_bytes());
    let mut suffix = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        let _ = write!(suffix, "{byte:02x}");
    }

    let mut cut = limit.saturating_sub(suffix.len() + 2).min(alias.len());
    while !alias.is_char_boundary(cut) {
        cut -= 1;
    }

    format!("{}_{suffix}", &alias[..cut])
}

///
/// TableRef
/// A FROM-clause table and the alias it is known by.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TableRef {
    pub table: String,
    pub alias: String,
}

impl TableRef {
    #[must_use]
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
        }
    }

    #[must_use]
    pub fn bare(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            alias: table.clone(),
            table,
        }
    }

    /// `"table"` or `"table" as "alias"`.
    #[must_use]
    pub fn sql(&self, dialect: &dyn Dialect) -> String {
        if self.table == self.alias {
            dialect.quote(&self.table)
        } else {
            format!("{} as {}", dialect.quote(&self.table), dialect.quote(&self.alias))
        }
    }
}

///
/// JoinContext
/// One hop of a leaf's join chain.
///

#[derive(Clone, Debug)]
pub struct JoinContext<'r> {
    pub source: &'r EntityModel,
    pub dest: &'r EntityModel,
    pub source_column: String,
    pub dest_column: String,
    pub link: String,
}
