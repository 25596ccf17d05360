//! Supplier purchases: receipt, payments and deletion.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, info, instrument, warn};

use kasir_core::{Aggregate, AggregateId, Session};
use kasir_events::Event;
use kasir_inventory::{LedgerError, LedgerReceipt};
use kasir_products::ProductId;
use kasir_purchasing::{
    DeletePurchase, Purchase, PurchaseCommand, PurchaseEvent, PurchaseId, PurchaseLine, RecordPayment,
    RecordPurchase, PURCHASE_CODE_PREFIX,
};

use crate::catalog::load_product;
use crate::codes::{next_daily_code, CodedTable};
use crate::error::{map_sqlx_error, StoreError};
use crate::ledger::SqliteStockLedger;
use crate::rows;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchase {
    pub supplier_name: String,
    pub purchase_date: NaiveDate,
    pub lines: Vec<PurchaseLine>,
    pub paid_amount: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PurchaseService {
    pool: SqlitePool,
    ledger: SqliteStockLedger,
}

impl PurchaseService {
    pub fn new(pool: SqlitePool, ledger: SqliteStockLedger) -> Self {
        Self { pool, ledger }
    }

    /// Record goods received and put them into stock, atomically.
    #[instrument(
        skip(self, session, purchase),
        fields(user_id = %session.user_id(), lines = purchase.lines.len()),
        err
    )]
    pub async fn record_purchase(&self, session: &Session, purchase: NewPurchase) -> Result<Purchase, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        match self.record_purchase_in(&mut tx, session, purchase).await {
            Ok(purchase) => {
                tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
                info!(
                    purchase_id = %purchase.id_typed(),
                    code = purchase.code(),
                    total = purchase.total(),
                    "purchase recorded"
                );
                Ok(purchase)
            }
            Err(err) => {
                tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
                warn!(error = %err, "purchase refused");
                Err(err)
            }
        }
    }

    #[instrument(skip(self, session), fields(purchase_id = %purchase_id, user_id = %session.user_id()), err)]
    pub async fn record_payment(
        &self,
        session: &Session,
        purchase_id: PurchaseId,
        amount: i64,
    ) -> Result<Purchase, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        match self.record_payment_in(&mut tx, session, purchase_id, amount).await {
            Ok(purchase) => {
                tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
                info!(
                    purchase_id = %purchase_id,
                    amount,
                    status = purchase.payment_status().as_str(),
                    "purchase payment recorded"
                );
                Ok(purchase)
            }
            Err(err) => {
                tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
                warn!(error = %err, "payment refused");
                Err(err)
            }
        }
    }

    /// Delete an unpaid purchase and take its stock back out, atomically.
    /// The purchase's stock mutations stay in the audit trail.
    #[instrument(skip(self, session), fields(purchase_id = %purchase_id, user_id = %session.user_id()), err)]
    pub async fn delete_purchase(&self, session: &Session, purchase_id: PurchaseId) -> Result<LedgerReceipt, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        match self.delete_purchase_in(&mut tx, session, purchase_id).await {
            Ok(receipt) => {
                tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
                info!(purchase_id = %purchase_id, "purchase deleted");
                Ok(receipt)
            }
            Err(err) => {
                tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
                warn!(error = %err, "purchase deletion refused");
                Err(err)
            }
        }
    }

    pub async fn get_purchase(&self, purchase_id: PurchaseId) -> Result<Option<Purchase>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("acquire", e))?;
        load_purchase(&mut conn, purchase_id).await
    }

    async fn record_purchase_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        session: &Session,
        new: NewPurchase,
    ) -> Result<Purchase, StoreError> {
        for line in &new.lines {
            if load_product(&mut **tx, line.product_id).await?.is_none() {
                return Err(LedgerError::ProductNotFound(line.product_id).into());
            }
        }

        let now = Utc::now();
        let code = next_daily_code(&mut **tx, CodedTable::Purchases, PURCHASE_CODE_PREFIX, now).await?;
        let purchase_id = PurchaseId::new(AggregateId::new());
        let mut purchase = Purchase::empty(purchase_id);
        let events = purchase.handle(&PurchaseCommand::RecordPurchase(RecordPurchase {
            purchase_id,
            code,
            supplier_name: new.supplier_name,
            purchase_date: new.purchase_date,
            lines: new.lines,
            paid_amount: new.paid_amount,
            notes: new.notes,
            recorded_by: session.user_id(),
            occurred_at: now,
        }))?;

        for event in &events {
            debug!(
                event_type = event.event_type(),
                version = event.version(),
                occurred_at = %event.occurred_at(),
                "persisting purchase event"
            );
            if let PurchaseEvent::PurchaseRecorded(e) = event {
                insert_purchase(&mut **tx, e).await?;
            }
            if let Some(stock_event) = event.stock_event() {
                self.ledger.apply_in(tx, session, &stock_event).await?;
            }
            purchase.apply(event);
        }
        Ok(purchase)
    }

    async fn record_payment_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        session: &Session,
        purchase_id: PurchaseId,
        amount: i64,
    ) -> Result<Purchase, StoreError> {
        let mut purchase = load_purchase(&mut **tx, purchase_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("purchase {purchase_id}")))?;

        let events = purchase.handle(&PurchaseCommand::RecordPayment(RecordPayment {
            purchase_id,
            amount,
            paid_by: session.user_id(),
            occurred_at: Utc::now(),
        }))?;

        for event in &events {
            debug!(
                event_type = event.event_type(),
                version = event.version(),
                occurred_at = %event.occurred_at(),
                "persisting purchase event"
            );
            if let PurchaseEvent::PurchasePaymentRecorded(e) = event {
                insert_payment(&mut **tx, purchase_id, e.amount, e.paid_by.to_string(), e.occurred_at).await?;
                sqlx::query(
                    "UPDATE purchases SET paid_amount = ?, remaining_amount = total - ?, payment_status = ? \
                     WHERE id = ?",
                )
                .bind(e.paid_amount)
                .bind(e.paid_amount)
                .bind(e.payment_status.as_str())
                .bind(purchase_id.to_string())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("update_purchase_payment", e))?;
            }
            purchase.apply(event);
        }
        Ok(purchase)
    }

    async fn delete_purchase_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        session: &Session,
        purchase_id: PurchaseId,
    ) -> Result<LedgerReceipt, StoreError> {
        let purchase = load_purchase(&mut **tx, purchase_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("purchase {purchase_id}")))?;

        let events = purchase.handle(&PurchaseCommand::DeletePurchase(DeletePurchase {
            purchase_id,
            deleted_by: session.user_id(),
            occurred_at: Utc::now(),
        }))?;

        let mut receipt = None;
        for event in &events {
            debug!(
                event_type = event.event_type(),
                version = event.version(),
                occurred_at = %event.occurred_at(),
                "persisting purchase event"
            );
            if let Some(stock_event) = event.stock_event() {
                receipt = Some(self.ledger.apply_in(tx, session, &stock_event).await?);
            }
            if let PurchaseEvent::PurchaseDeleted(_) = event {
                sqlx::query("DELETE FROM purchase_items WHERE purchase_id = ?")
                    .bind(purchase_id.to_string())
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| map_sqlx_error("delete_purchase_items", e))?;
                sqlx::query("DELETE FROM purchases WHERE id = ?")
                    .bind(purchase_id.to_string())
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| map_sqlx_error("delete_purchase", e))?;
            }
        }

        receipt.ok_or_else(|| StoreError::Database(format!("purchase {purchase_id} produced no stock event")))
    }
}

async fn insert_purchase(
    conn: &mut SqliteConnection,
    e: &kasir_purchasing::PurchaseRecorded,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO purchases (
            id, code, supplier_name, purchase_date, total, paid_amount, remaining_amount,
            payment_status, notes, user_id, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(e.purchase_id.to_string())
    .bind(&e.code)
    .bind(&e.supplier_name)
    .bind(e.purchase_date)
    .bind(e.total)
    .bind(e.paid_amount)
    .bind(e.total - e.paid_amount)
    .bind(e.payment_status.as_str())
    .bind(&e.notes)
    .bind(e.recorded_by.to_string())
    .bind(e.occurred_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_purchase", e))?;

    for line in &e.lines {
        sqlx::query(
            r#"
            INSERT INTO purchase_items (purchase_id, product_id, quantity, purchase_price, subtotal)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(e.purchase_id.to_string())
        .bind(line.product_id.to_string())
        .bind(line.quantity)
        .bind(line.purchase_price)
        .bind(line.subtotal()?)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert_purchase_item", e))?;
    }

    if e.paid_amount > 0 {
        insert_payment(conn, e.purchase_id, e.paid_amount, e.recorded_by.to_string(), e.occurred_at).await?;
    }
    Ok(())
}

async fn insert_payment(
    conn: &mut SqliteConnection,
    purchase_id: PurchaseId,
    amount: i64,
    user_id: String,
    paid_at: chrono::DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO purchase_payments (id, purchase_id, amount, user_id, paid_at) VALUES (?, ?, ?, ?, ?)")
        .bind(AggregateId::new().to_string())
        .bind(purchase_id.to_string())
        .bind(amount)
        .bind(user_id)
        .bind(paid_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert_purchase_payment", e))?;
    Ok(())
}

pub(crate) async fn load_purchase(
    conn: &mut SqliteConnection,
    purchase_id: PurchaseId,
) -> Result<Option<Purchase>, StoreError> {
    const TABLE: &str = "purchases";

    let header = sqlx::query(
        "SELECT code, supplier_name, purchase_date, paid_amount, notes, user_id FROM purchases WHERE id = ?",
    )
    .bind(purchase_id.to_string())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_purchase", e))?;

    let Some(header) = header else {
        return Ok(None);
    };

    let items = sqlx::query(
        "SELECT product_id, quantity, purchase_price FROM purchase_items WHERE purchase_id = ? ORDER BY id ASC",
    )
    .bind(purchase_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_purchase_items", e))?;

    let lines = items
        .iter()
        .map(|row| -> Result<PurchaseLine, StoreError> {
            Ok(PurchaseLine {
                product_id: ProductId::new(rows::aggregate_id(row, "purchase_items", "product_id")?),
                quantity: rows::column(row, "purchase_items", "quantity")?,
                purchase_price: rows::column(row, "purchase_items", "purchase_price")?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let purchase = Purchase::restore(
        purchase_id,
        rows::column(&header, TABLE, "code")?,
        rows::column(&header, TABLE, "supplier_name")?,
        rows::column(&header, TABLE, "purchase_date")?,
        lines,
        rows::column(&header, TABLE, "paid_amount")?,
        rows::column(&header, TABLE, "notes")?,
        rows::user_id(&header, TABLE, "user_id")?,
    )?;
    Ok(Some(purchase))
}
