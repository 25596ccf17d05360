//! SQLite-backed stock ledger.
//!
//! One [`StockEvent`] is applied inside one SQLite transaction: for every
//! affected product the cached `products.stock` column is adjusted and one
//! `stock_mutations` row is inserted. Either all of an event's writes commit
//! or none do.
//!
//! Business operations that write their own rows (sale header, purchase
//! header) call [`SqliteStockLedger::apply_in`] with their open transaction so
//! those rows and the ledger writes share one commit.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, info, instrument, warn};

use kasir_core::Session;
use kasir_inventory::{
    plan, LedgerError, LedgerPolicy, LedgerReceipt, MutationId, ReferenceKind, StockEvent, StockMutation,
};
use kasir_products::ProductId;

use crate::error::{ledger_write_failed, map_sqlx_error, StoreError};
use crate::rows;

const MUTATION_COLUMNS: &str =
    "id, product_id, mutation_type, quantity, reference_type, reference_id, user_id, created_at";

#[derive(Debug, Clone)]
pub struct SqliteStockLedger {
    pool: SqlitePool,
    policy: LedgerPolicy,
}

impl SqliteStockLedger {
    pub fn new(pool: SqlitePool, policy: LedgerPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn policy(&self) -> LedgerPolicy {
        self.policy
    }

    /// Apply `event` in its own transaction.
    ///
    /// Re-applying an event whose `(kind, reference_id)` already has mutation
    /// rows writes nothing and returns the recorded rows with `replayed = true`.
    #[instrument(
        skip(self, session, event),
        fields(
            kind = event.kind.as_str(),
            reference_id = %event.reference_id,
            lines = event.lines.len(),
            user_id = %session.user_id()
        ),
        err
    )]
    pub async fn apply(&self, session: &Session, event: &StockEvent) -> Result<LedgerReceipt, LedgerError> {
        // Quantities are checked before any storage access.
        event.validate_quantities()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ledger_write_failed("begin_transaction", e))?;

        match self.apply_in(&mut tx, session, event).await {
            Ok(receipt) => {
                tx.commit().await.map_err(|e| ledger_write_failed("commit", e))?;
                Ok(receipt)
            }
            Err(err) => {
                tx.rollback().await.map_err(|e| ledger_write_failed("rollback", e))?;
                Err(err)
            }
        }
    }

    /// Apply `event` inside the caller's transaction. The caller commits.
    ///
    /// On `Err` nothing has been written by the ledger, but the caller must
    /// still roll back its own writes.
    pub async fn apply_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        session: &Session,
        event: &StockEvent,
    ) -> Result<LedgerReceipt, LedgerError> {
        event.validate_quantities()?;

        let existing = fetch_by_reference(&mut **tx, event.kind, &event.reference_id)
            .await
            .map_err(|e| LedgerError::StorageWriteFailed(e.to_string()))?;
        if !existing.is_empty() {
            debug!(
                kind = event.kind.as_str(),
                reference_id = %event.reference_id,
                mutations = existing.len(),
                "event already applied; replaying recorded mutations"
            );
            return Ok(LedgerReceipt {
                kind: event.kind,
                reference_id: event.reference_id.clone(),
                mutations: existing,
                replayed: true,
            });
        }

        let mut stocks = HashMap::new();
        for product_id in event.product_ids() {
            let stock: Option<i64> = sqlx::query_scalar("SELECT stock FROM products WHERE id = ?")
                .bind(product_id.to_string())
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| ledger_write_failed("load_stock", e))?;
            if let Some(stock) = stock {
                stocks.insert(product_id, stock);
            }
        }

        let planned = plan(
            event,
            |id| stocks.get(id).copied(),
            self.policy,
            session.user_id(),
            Utc::now(),
        )
        .inspect_err(|err| warn!(error = %err, reference_id = %event.reference_id, "stock event refused"))?;

        let mut mutations = Vec::with_capacity(planned.mutations.len());
        for step in planned.mutations {
            let m = step.mutation;
            sqlx::query("UPDATE products SET stock = stock + ?, updated_at = ? WHERE id = ?")
                .bind(m.signed_quantity())
                .bind(m.created_at)
                .bind(m.product_id.to_string())
                .execute(&mut **tx)
                .await
                .map_err(|e| ledger_write_failed("update_stock", e))?;

            sqlx::query(
                r#"
                INSERT INTO stock_mutations (
                    id, product_id, mutation_type, quantity,
                    reference_type, reference_id, user_id, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(m.id.to_string())
            .bind(m.product_id.to_string())
            .bind(m.mutation_type.as_str())
            .bind(m.quantity)
            .bind(m.reference_kind.as_str())
            .bind(&m.reference_id)
            .bind(m.user_id.to_string())
            .bind(m.created_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| ledger_write_failed("insert_mutation", e))?;

            debug!(
                product_id = %m.product_id,
                stock_before = step.stock_before,
                stock_after = step.stock_after,
                "stock adjusted"
            );
            mutations.push(m);
        }

        info!(
            kind = event.kind.as_str(),
            reference_id = %event.reference_id,
            mutations = mutations.len(),
            "stock event applied"
        );

        Ok(LedgerReceipt {
            kind: event.kind,
            reference_id: event.reference_id.clone(),
            mutations,
            replayed: false,
        })
    }

    /// All mutations recorded for one business event.
    pub async fn mutations_for_reference(
        &self,
        kind: ReferenceKind,
        reference_id: &str,
    ) -> Result<Vec<StockMutation>, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        fetch_by_reference(&mut conn, kind, reference_id).await
    }

    /// A product's stock card, oldest first.
    pub async fn mutations_for_product(&self, product_id: ProductId) -> Result<Vec<StockMutation>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MUTATION_COLUMNS} FROM stock_mutations WHERE product_id = ? ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(product_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("mutations_for_product", e))?;

        rows.iter().map(mutation_from_row).collect()
    }
}

async fn fetch_by_reference(
    conn: &mut SqliteConnection,
    kind: ReferenceKind,
    reference_id: &str,
) -> Result<Vec<StockMutation>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {MUTATION_COLUMNS} FROM stock_mutations \
         WHERE reference_type = ? AND reference_id = ? ORDER BY rowid ASC"
    ))
    .bind(kind.as_str())
    .bind(reference_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("mutations_for_reference", e))?;

    rows.iter().map(mutation_from_row).collect()
}

pub(crate) async fn fetch_all_mutations(pool: &SqlitePool) -> Result<Vec<StockMutation>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {MUTATION_COLUMNS} FROM stock_mutations ORDER BY created_at ASC, rowid ASC"
    ))
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error("all_mutations", e))?;

    rows.iter().map(mutation_from_row).collect()
}

pub(crate) fn mutation_from_row(row: &SqliteRow) -> Result<StockMutation, StoreError> {
    const TABLE: &str = "stock_mutations";
    Ok(StockMutation {
        id: MutationId::new(rows::aggregate_id(row, TABLE, "id")?),
        product_id: ProductId::new(rows::aggregate_id(row, TABLE, "product_id")?),
        mutation_type: rows::parsed(row, TABLE, "mutation_type")?,
        quantity: rows::column(row, TABLE, "quantity")?,
        reference_kind: rows::parsed(row, TABLE, "reference_type")?,
        reference_id: rows::column(row, TABLE, "reference_id")?,
        user_id: rows::user_id(row, TABLE, "user_id")?,
        created_at: rows::column(row, TABLE, "created_at")?,
    })
}
