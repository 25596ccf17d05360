//! Storage-layer error model.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` by [`map_sqlx_error`]:
//!
//! | SQLx Error | SQLite condition | StoreError |
//! |------------|------------------|------------|
//! | Database (unique violation) | `UNIQUE` constraint | `Conflict` |
//! | Database (foreign key violation) | `FOREIGN KEY` constraint | `Conflict` |
//! | Database (check violation) | `CHECK` constraint | `Database` |
//! | Database (other) | `RAISE(ABORT)`, I/O, ... | `Database` |
//! | PoolClosed / other | N/A | `Database` |

use thiserror::Error;

use kasir_core::DomainError;
use kasir_inventory::LedgerError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A uniqueness or referential constraint refused the write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),

    /// A persisted row could not be turned back into a domain value.
    #[error("corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    pub(crate) fn corrupt(table: &'static str, message: impl ToString) -> Self {
        Self::CorruptRow {
            table,
            message: message.to_string(),
        }
    }
}

/// Map SQLx errors to `StoreError`.
pub fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{} in {}", db_err.message(), operation);
            if db_err.is_unique_violation() || db_err.is_foreign_key_violation() {
                StoreError::Conflict(msg)
            } else {
                StoreError::Database(msg)
            }
        }
        sqlx::Error::PoolClosed => StoreError::Database(format!("connection pool closed in {}", operation)),
        _ => StoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Inside the ledger every storage failure aborts the event the same way.
pub(crate) fn ledger_write_failed(operation: &str, err: sqlx::Error) -> LedgerError {
    LedgerError::StorageWriteFailed(map_sqlx_error(operation, err).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_map_to_database_variant() {
        let err = map_sqlx_error("load_product", sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Database(ref m) if m.contains("load_product")));
    }

    #[test]
    fn ledger_storage_failure_message() {
        let err = ledger_write_failed("insert_mutation", sqlx::Error::RowNotFound);
        assert!(err.to_string().starts_with("ledger write failed: "));
    }
}
