//! Stock consistency audit: cached stock vs. replayed audit trail.

use std::collections::HashMap;

use sqlx::SqlitePool;
use tracing::{debug, instrument, warn};

use kasir_inventory::{check_consistency, StockDrift, StockMutation};
use kasir_products::ProductId;

use crate::error::{map_sqlx_error, StoreError};
use crate::ledger::fetch_all_mutations;
use crate::rows;

/// Every product whose cached `stock` differs from `initial_stock` plus the
/// signed sum of its stock mutations. Empty when the ledger is consistent.
#[instrument(skip(pool), err)]
pub async fn verify_stock_consistency(pool: &SqlitePool) -> Result<Vec<StockDrift>, StoreError> {
    let products = sqlx::query("SELECT id, initial_stock, stock FROM products ORDER BY name ASC")
        .fetch_all(pool)
        .await
        .map_err(|e| map_sqlx_error("load_product_stock", e))?;

    let mut by_product: HashMap<ProductId, Vec<StockMutation>> = HashMap::new();
    for mutation in fetch_all_mutations(pool).await? {
        by_product.entry(mutation.product_id).or_default().push(mutation);
    }

    let mut drift = Vec::new();
    for row in &products {
        let product_id = ProductId::new(rows::aggregate_id(row, "products", "id")?);
        let initial_stock: i64 = rows::column(row, "products", "initial_stock")?;
        let cached: i64 = rows::column(row, "products", "stock")?;
        let history = by_product.get(&product_id).map(Vec::as_slice).unwrap_or_default();

        let checked = check_consistency(product_id, initial_stock, cached, history)
            .map_err(|e| StoreError::corrupt("stock_mutations", e))?;
        if let Some(d) = checked {
            warn!(
                product_id = %d.product_id,
                cached = d.cached,
                replayed = d.replayed,
                "cached stock disagrees with stock mutations"
            );
            drift.push(d);
        }
    }

    debug!(products = products.len(), drifted = drift.len(), "stock audit finished");
    Ok(drift)
}
