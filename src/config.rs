//! Engine configuration.
//!
//! # Environment Variables
//!
//! - `LEDGER_MAX_PAGE_SIZE`: upper bound for history page sizes (default 100)
//! - `LEDGER_DEFAULT_PAGE_SIZE`: page size when a query names none (default 10)
//! - `LEDGER_COMMIT_ATTEMPTS`: attempts per mutation on commit conflicts (default 3)

use crate::error::{LedgerError, Result};
use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_page_size: usize,
    pub default_page_size: usize,
    pub max_commit_attempts: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_page_size: 100,
            default_page_size: 10,
            max_commit_attempts: 3,
        }
    }
}

impl EngineConfig {
    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = EngineConfig::default();
        let config = EngineConfig {
            max_page_size: read(&lookup, "LEDGER_MAX_PAGE_SIZE", "max_page_size")?
                .unwrap_or(defaults.max_page_size),
            default_page_size: read(&lookup, "LEDGER_DEFAULT_PAGE_SIZE", "default_page_size")?
                .unwrap_or(defaults.default_page_size),
            max_commit_attempts: read(&lookup, "LEDGER_COMMIT_ATTEMPTS", "max_commit_attempts")?
                .unwrap_or(defaults.max_commit_attempts),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_page_size == 0 {
            return Err(LedgerError::validation("max_page_size", "must be at least 1"));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(LedgerError::validation(
                "default_page_size",
                format!("must be between 1 and {}", self.max_page_size),
            ));
        }
        if self.max_commit_attempts == 0 {
            return Err(LedgerError::validation(
                "max_commit_attempts",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

fn read(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &'static str,
) -> Result<Option<usize>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| LedgerError::validation(field, format!("{key}={raw:?}: {e}"))),
    }
}
