//! SQLite connection and schema.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{info, instrument};

use crate::config::StoreConfig;
use crate::error::{map_sqlx_error, StoreError};

/// Schema statements, applied in order. Every statement is idempotent.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL UNIQUE,
        description TEXT NULL,
        created_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id             TEXT PRIMARY KEY,
        barcode        TEXT NOT NULL UNIQUE,
        name           TEXT NOT NULL,
        category_id    TEXT NULL REFERENCES categories(id),
        purchase_price INTEGER NOT NULL CHECK (purchase_price >= 0),
        selling_price  INTEGER NOT NULL CHECK (selling_price >= 0),
        stock          INTEGER NOT NULL DEFAULT 0,
        initial_stock  INTEGER NOT NULL DEFAULT 0 CHECK (initial_stock >= 0),
        min_stock      INTEGER NOT NULL DEFAULT 0 CHECK (min_stock >= 0),
        unit           TEXT NOT NULL,
        is_active      INTEGER NOT NULL DEFAULT 1,
        created_at     TEXT NOT NULL,
        updated_at     TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_mutations (
        id             TEXT PRIMARY KEY,
        product_id     TEXT NOT NULL REFERENCES products(id),
        mutation_type  TEXT NOT NULL CHECK (mutation_type IN ('in', 'out')),
        quantity       INTEGER NOT NULL CHECK (quantity > 0),
        reference_type TEXT NOT NULL CHECK (reference_type IN ('sale', 'void', 'purchase', 'purchase_delete')),
        reference_id   TEXT NOT NULL,
        user_id        TEXT NOT NULL,
        created_at     TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_stock_mutations_reference ON stock_mutations (reference_type, reference_id)",
    "CREATE INDEX IF NOT EXISTS idx_stock_mutations_product ON stock_mutations (product_id)",
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id              TEXT PRIMARY KEY,
        code            TEXT NOT NULL UNIQUE,
        user_id         TEXT NOT NULL,
        subtotal        INTEGER NOT NULL,
        discount_type   TEXT NULL CHECK (discount_type IN ('percent', 'amount')),
        discount_value  INTEGER NOT NULL DEFAULT 0,
        discount_amount INTEGER NOT NULL DEFAULT 0,
        tax_percent     INTEGER NOT NULL DEFAULT 0,
        tax_amount      INTEGER NOT NULL DEFAULT 0,
        total           INTEGER NOT NULL,
        payment_method  TEXT NOT NULL CHECK (payment_method IN ('cash', 'debit', 'credit', 'qris', 'transfer')),
        payment_amount  INTEGER NOT NULL,
        change_amount   INTEGER NOT NULL DEFAULT 0,
        customer_name   TEXT NULL,
        notes           TEXT NULL,
        status          TEXT NOT NULL DEFAULT 'completed' CHECK (status IN ('completed', 'void')),
        voided_by       TEXT NULL,
        voided_at       TEXT NULL,
        created_at      TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transaction_items (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        transaction_id TEXT NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
        product_id     TEXT NOT NULL REFERENCES products(id),
        product_name   TEXT NOT NULL,
        quantity       INTEGER NOT NULL CHECK (quantity > 0),
        price          INTEGER NOT NULL,
        subtotal       INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS purchases (
        id               TEXT PRIMARY KEY,
        code             TEXT NOT NULL UNIQUE,
        supplier_name    TEXT NOT NULL,
        purchase_date    TEXT NOT NULL,
        total            INTEGER NOT NULL,
        paid_amount      INTEGER NOT NULL DEFAULT 0,
        remaining_amount INTEGER NOT NULL DEFAULT 0,
        payment_status   TEXT NOT NULL CHECK (payment_status IN ('unpaid', 'partial', 'paid')),
        notes            TEXT NULL,
        user_id          TEXT NOT NULL,
        created_at       TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS purchase_items (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        purchase_id    TEXT NOT NULL REFERENCES purchases(id) ON DELETE CASCADE,
        product_id     TEXT NOT NULL REFERENCES products(id),
        quantity       INTEGER NOT NULL CHECK (quantity > 0),
        purchase_price INTEGER NOT NULL,
        subtotal       INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS purchase_payments (
        id          TEXT PRIMARY KEY,
        purchase_id TEXT NOT NULL REFERENCES purchases(id) ON DELETE CASCADE,
        amount      INTEGER NOT NULL CHECK (amount > 0),
        user_id     TEXT NOT NULL,
        paid_at     TEXT NOT NULL
    )
    "#,
];

/// Open a pool with foreign keys enforced.
///
/// For on-disk databases the parent directory is created if missing.
#[instrument(skip(config), fields(database_url = %config.database_url), err)]
pub async fn connect(config: &StoreConfig) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(|e| StoreError::Config(format!("invalid database url {:?}: {}", config.database_url, e)))?
        .create_if_missing(true)
        .foreign_keys(true);

    let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
    if config.is_in_memory() {
        // Each in-memory connection is its own database; never let the pool
        // drop the only one.
        pool_options = pool_options
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    } else {
        let path = options.get_filename();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Config(format!("failed to create database directory {:?}: {}", parent, e))
            })?;
        }
    }

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|e| map_sqlx_error("connect", e))?;
    Ok(pool)
}

/// Create or update the schema.
#[instrument(skip(pool), err)]
pub async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
    }
    tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;

    info!(statements = SCHEMA.len(), "schema is up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn migrate_is_idempotent_and_enforces_foreign_keys() {
        let pool = connect(&StoreConfig::in_memory()).await.unwrap();
        migrate(&pool).await.unwrap();
        migrate(&pool).await.unwrap();

        let fk: i64 = sqlx::query("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get(0);
        assert_eq!(fk, 1);

        let index: Option<String> = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND name = 'idx_stock_mutations_reference'",
        )
        .fetch_optional(&pool)
        .await
        .unwrap()
        .map(|row| row.get(0));
        assert!(index.is_some());
    }
}
