//! Store configuration, loaded from the environment.

use std::path::PathBuf;

use kasir_inventory::LedgerPolicy;

use crate::error::StoreError;

pub const DATABASE_URL_VAR: &str = "KASIR_DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "KASIR_DB_MAX_CONNECTIONS";
pub const ALLOW_NEGATIVE_STOCK_VAR: &str = "KASIR_ALLOW_NEGATIVE_STOCK";

const IN_MEMORY_URL: &str = "sqlite::memory:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    /// SQLite has a single writer; more than one connection only helps readers.
    pub max_connections: u32,
    pub policy: LedgerPolicy,
}

impl StoreConfig {
    /// Read `KASIR_DATABASE_URL`, `KASIR_DB_MAX_CONNECTIONS` and
    /// `KASIR_ALLOW_NEGATIVE_STOCK`.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = match lookup(DATABASE_URL_VAR).filter(|v| !v.trim().is_empty()) {
            Some(url) => url,
            None => default_database_url()?,
        };

        let max_connections = match lookup(MAX_CONNECTIONS_VAR) {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    StoreError::Config(format!("{MAX_CONNECTIONS_VAR} must be a positive integer, got {raw:?}"))
                })?,
            None => 1,
        };

        let allow_negative_stock = match lookup(ALLOW_NEGATIVE_STOCK_VAR) {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                StoreError::Config(format!("{ALLOW_NEGATIVE_STOCK_VAR} must be true or false, got {raw:?}"))
            })?,
            None => false,
        };

        Ok(Self {
            database_url,
            max_connections,
            policy: LedgerPolicy::allow_negative_stock(allow_negative_stock),
        })
    }

    /// A private in-memory database. Used by tests.
    pub fn in_memory() -> Self {
        Self {
            database_url: IN_MEMORY_URL.to_string(),
            max_connections: 1,
            policy: LedgerPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: LedgerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// `{data_dir}/kasir/kasir.db`.
pub fn default_db_path() -> Result<PathBuf, StoreError> {
    let base = dirs::data_dir()
        .ok_or_else(|| StoreError::Config("could not determine the platform data directory".to_string()))?;
    Ok(base.join("kasir").join("kasir.db"))
}

fn default_database_url() -> Result<String, StoreError> {
    Ok(format!("sqlite://{}", default_db_path()?.to_string_lossy()))
}
