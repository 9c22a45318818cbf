use crate::db::domain::DEFAULT_MAX_DEPTH;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, time::Duration};
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("invalid orm config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid orm config: {0}")]
    Invalid(String),
}

///
/// OrmConfig
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrmConfig {
    pub cache: CacheConfig,
    pub compiler: CompilerConfig,
}

impl OrmConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compiler.max_depth == 0 {
            return Err(ConfigError::Invalid("compiler.max_depth must be > 0".into()));
        }
        if self.compiler.alias_limit < 16 {
            return Err(ConfigError::Invalid(
                "compiler.alias_limit must be at least 16".into(),
            ));
        }
        if self.cache.expired_secs == 0 {
            return Err(ConfigError::Invalid("cache.expired_secs must be > 0".into()));
        }

        Ok(())
    }
}

///
/// CacheConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub active: bool,
    /// Seconds between expiry sweeps.
    pub interval_secs: u64,
    /// Entry time to live.
    pub expired_secs: u64,
    pub disabled_tables: BTreeSet<String>,
}

impl CacheConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub const fn expired(&self) -> Duration {
        Duration::from_secs(self.expired_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            active: true,
            interval_secs: 60,
            expired_secs: 300,
            disabled_tables: BTreeSet::new(),
        }
    }
}

///
/// CompilerConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    pub max_depth: usize,
    /// Aliases at or past this length overflow.
    pub alias_limit: usize,
    pub alias_overflow: AliasOverflow,
    pub active_test: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            alias_limit: 64,
            alias_overflow: AliasOverflow::Warn,
            active_test: true,
        }
    }
}

///
/// AliasOverflow
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasOverflow {
    /// Keep the long alias, log a warning.
    #[default]
    Warn,
    /// Truncate and append a short digest of the full alias.
    Hash,
}
