//! Checkout and void, each committed together with its ledger writes.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, info, instrument, warn};

use kasir_core::{Aggregate, AggregateId, DomainError, Session, UserId};
use kasir_events::Event;
use kasir_inventory::LedgerError;
use kasir_products::{Product, ProductId};
use kasir_sales::{
    CompleteSale, Discount, PaymentMethod, SaleCommand, SaleEvent, SaleId, SaleLine, SaleTotals, SaleTransaction,
    VoidSale, TRANSACTION_CODE_PREFIX,
};

use crate::catalog::load_product;
use crate::codes::{next_daily_code, CodedTable};
use crate::error::{map_sqlx_error, StoreError};
use crate::ledger::SqliteStockLedger;
use crate::rows;

/// One cart entry as rung up at the register. Name and price come from the
/// catalog at checkout time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSale {
    pub lines: Vec<CartLine>,
    pub discount: Discount,
    pub tax_percent: i64,
    pub payment_method: PaymentMethod,
    pub payment_amount: i64,
    pub customer_name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SalesService {
    pool: SqlitePool,
    ledger: SqliteStockLedger,
}

impl SalesService {
    pub fn new(pool: SqlitePool, ledger: SqliteStockLedger) -> Self {
        Self { pool, ledger }
    }

    /// Record a completed sale and take its stock out, atomically.
    #[instrument(
        skip(self, session, sale),
        fields(user_id = %session.user_id(), lines = sale.lines.len()),
        err
    )]
    pub async fn complete_sale(&self, session: &Session, sale: NewSale) -> Result<SaleTransaction, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        match self.complete_sale_in(&mut tx, session, sale).await {
            Ok(transaction) => {
                tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
                info!(
                    sale_id = %transaction.id_typed(),
                    code = transaction.code(),
                    total = transaction.totals().map(|t| t.total).unwrap_or(0),
                    "sale completed"
                );
                Ok(transaction)
            }
            Err(err) => {
                tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
                warn!(error = %err, "sale refused");
                Err(err)
            }
        }
    }

    /// Void a completed sale and put its stock back, atomically.
    ///
    /// Only owners and admins may void.
    #[instrument(skip(self, session), fields(sale_id = %sale_id, user_id = %session.user_id()), err)]
    pub async fn void_sale(&self, session: &Session, sale_id: SaleId) -> Result<SaleTransaction, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        match self.void_sale_in(&mut tx, session, sale_id).await {
            Ok(transaction) => {
                tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
                info!(sale_id = %sale_id, code = transaction.code(), "sale voided");
                Ok(transaction)
            }
            Err(err) => {
                tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
                warn!(error = %err, "void refused");
                Err(err)
            }
        }
    }

    pub async fn get_sale(&self, sale_id: SaleId) -> Result<Option<SaleTransaction>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("acquire", e))?;
        load_sale(&mut conn, sale_id).await
    }

    async fn complete_sale_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        session: &Session,
        sale: NewSale,
    ) -> Result<SaleTransaction, StoreError> {
        let mut lines = Vec::with_capacity(sale.lines.len());
        let mut requested: HashMap<ProductId, (i64, i64)> = HashMap::new();

        for cart_line in &sale.lines {
            let product = load_product(&mut **tx, cart_line.product_id)
                .await?
                .ok_or(LedgerError::ProductNotFound(cart_line.product_id))?;
            if !product.can_be_sold() {
                return Err(DomainError::validation(format!("product {} is not active", product.name())).into());
            }
            let unit_price = selling_price(&product)?;

            let entry = requested.entry(cart_line.product_id).or_insert((product.stock(), 0));
            entry.1 = entry.1.checked_add(cart_line.quantity).ok_or(LedgerError::InvalidQuantity {
                product_id: cart_line.product_id,
                quantity: cart_line.quantity,
            })?;

            lines.push(SaleLine {
                product_id: cart_line.product_id,
                product_name: product.name().to_string(),
                quantity: cart_line.quantity,
                unit_price,
            });
        }

        // Checked again by the ledger; failing here gives the cashier the
        // shortage before any row is written.
        if !self.ledger.policy().allow_negative_stock {
            for (product_id, (available, wanted)) in &requested {
                if wanted > available {
                    return Err(LedgerError::InsufficientStock {
                        product_id: *product_id,
                        available: *available,
                        requested: *wanted,
                    }
                    .into());
                }
            }
        }

        let now = Utc::now();
        let code = next_daily_code(&mut **tx, CodedTable::Transactions, TRANSACTION_CODE_PREFIX, now).await?;
        let sale_id = SaleId::new(AggregateId::new());
        let mut transaction = SaleTransaction::empty(sale_id);
        let events = transaction.handle(&SaleCommand::CompleteSale(CompleteSale {
            sale_id,
            code,
            cashier_id: session.user_id(),
            lines,
            discount: sale.discount,
            tax_percent: sale.tax_percent,
            payment_method: sale.payment_method,
            payment_amount: sale.payment_amount,
            customer_name: sale.customer_name,
            notes: sale.notes,
            occurred_at: now,
        }))?;

        for event in &events {
            debug!(
                event_type = event.event_type(),
                version = event.version(),
                occurred_at = %event.occurred_at(),
                "persisting sale event"
            );
            if let SaleEvent::SaleCompleted(e) = event {
                insert_sale(&mut **tx, e).await?;
            }
            self.ledger.apply_in(tx, session, &event.stock_event()).await?;
            transaction.apply(event);
        }
        Ok(transaction)
    }

    async fn void_sale_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        session: &Session,
        sale_id: SaleId,
    ) -> Result<SaleTransaction, StoreError> {
        let mut transaction = load_sale(&mut **tx, sale_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("transaction {sale_id}")))?;

        let events = transaction.handle(&SaleCommand::VoidSale(VoidSale {
            sale_id,
            voided_by: session.user_id(),
            role: session.role(),
            occurred_at: Utc::now(),
        }))?;

        for event in &events {
            debug!(
                event_type = event.event_type(),
                version = event.version(),
                occurred_at = %event.occurred_at(),
                "persisting sale event"
            );
            if let SaleEvent::SaleVoided(e) = event {
                let updated = sqlx::query(
                    "UPDATE transactions SET status = 'void', voided_by = ?, voided_at = ? \
                     WHERE id = ? AND status = 'completed'",
                )
                .bind(e.voided_by.to_string())
                .bind(e.occurred_at)
                .bind(sale_id.to_string())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("void_transaction", e))?
                .rows_affected();
                if updated == 0 {
                    return Err(DomainError::conflict(format!("transaction {sale_id} is already void")).into());
                }
            }
            self.ledger.apply_in(tx, session, &event.stock_event()).await?;
            transaction.apply(event);
        }
        Ok(transaction)
    }
}

/// Checkout price of a stored product.
fn selling_price(product: &Product) -> Result<i64, DomainError> {
    product
        .details()
        .map(|d| d.selling_price)
        .ok_or_else(|| DomainError::invariant(format!("product {} has no details", product.id_typed())))
}

async fn insert_sale(conn: &mut SqliteConnection, e: &kasir_sales::SaleCompleted) -> Result<(), StoreError> {
    let (discount_type, discount_value) = match e.discount {
        Discount::None => (None, 0),
        Discount::Percent(p) => (Some("percent"), p),
        Discount::Amount(a) => (Some("amount"), a),
    };

    sqlx::query(
        r#"
        INSERT INTO transactions (
            id, code, user_id, subtotal, discount_type, discount_value, discount_amount,
            tax_percent, tax_amount, total, payment_method, payment_amount, change_amount,
            customer_name, notes, status, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'completed', ?)
        "#,
    )
    .bind(e.sale_id.to_string())
    .bind(&e.code)
    .bind(e.cashier_id.to_string())
    .bind(e.totals.subtotal)
    .bind(discount_type)
    .bind(discount_value)
    .bind(e.totals.discount_amount)
    .bind(e.tax_percent)
    .bind(e.totals.tax_amount)
    .bind(e.totals.total)
    .bind(e.payment_method.as_str())
    .bind(e.payment_amount)
    .bind(e.change_amount)
    .bind(&e.customer_name)
    .bind(&e.notes)
    .bind(e.occurred_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_transaction", e))?;

    for line in &e.lines {
        sqlx::query(
            r#"
            INSERT INTO transaction_items (transaction_id, product_id, product_name, quantity, price, subtotal)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(e.sale_id.to_string())
        .bind(line.product_id.to_string())
        .bind(&line.product_name)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.subtotal()?)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert_transaction_item", e))?;
    }
    Ok(())
}

pub(crate) async fn load_sale(
    conn: &mut SqliteConnection,
    sale_id: SaleId,
) -> Result<Option<SaleTransaction>, StoreError> {
    let header = sqlx::query(
        r#"
        SELECT id, code, user_id, subtotal, discount_amount, tax_amount, total,
               payment_method, payment_amount, status, voided_by, voided_at
        FROM transactions
        WHERE id = ?
        "#,
    )
    .bind(sale_id.to_string())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_transaction", e))?;

    let Some(header) = header else {
        return Ok(None);
    };

    let items = sqlx::query(
        "SELECT product_id, product_name, quantity, price FROM transaction_items \
         WHERE transaction_id = ? ORDER BY id ASC",
    )
    .bind(sale_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_transaction_items", e))?;

    let lines = items.iter().map(sale_line_from_row).collect::<Result<Vec<_>, _>>()?;
    sale_from_rows(&header, sale_id, lines).map(Some)
}

fn sale_line_from_row(row: &SqliteRow) -> Result<SaleLine, StoreError> {
    const TABLE: &str = "transaction_items";
    Ok(SaleLine {
        product_id: ProductId::new(rows::aggregate_id(row, TABLE, "product_id")?),
        product_name: rows::column(row, TABLE, "product_name")?,
        quantity: rows::column(row, TABLE, "quantity")?,
        unit_price: rows::column(row, TABLE, "price")?,
    })
}

fn sale_from_rows(row: &SqliteRow, sale_id: SaleId, lines: Vec<SaleLine>) -> Result<SaleTransaction, StoreError> {
    const TABLE: &str = "transactions";
    let voided_by: Option<String> = rows::column(row, TABLE, "voided_by")?;
    let voided_by = voided_by
        .map(|raw| raw.parse::<UserId>().map_err(|e| StoreError::corrupt(TABLE, e)))
        .transpose()?;

    Ok(SaleTransaction::restore(
        sale_id,
        rows::column(row, TABLE, "code")?,
        rows::user_id(row, TABLE, "user_id")?,
        lines,
        SaleTotals {
            subtotal: rows::column(row, TABLE, "subtotal")?,
            discount_amount: rows::column(row, TABLE, "discount_amount")?,
            tax_amount: rows::column(row, TABLE, "tax_amount")?,
            total: rows::column(row, TABLE, "total")?,
        },
        rows::parsed(row, TABLE, "payment_method")?,
        rows::column(row, TABLE, "payment_amount")?,
        rows::parsed(row, TABLE, "status")?,
        voided_by,
        rows::column(row, TABLE, "voided_at")?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_without_details_has_no_price() {
        let product = Product::empty(ProductId::new(AggregateId::new()));
        let err = selling_price(&product).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
