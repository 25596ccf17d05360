//! Rebuilding cached stock from the audit trail.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use kasir_products::ProductId;

use crate::mutation::StockMutation;

/// A product whose cached stock disagrees with its mutation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDrift {
    pub product_id: ProductId,
    pub cached: i64,
    pub replayed: i64,
}

impl StockDrift {
    pub fn difference(&self) -> i64 {
        self.cached - self.replayed
    }
}

/// A product's mutation history sums past the range of `i64`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("stock history of product {0} overflows")]
pub struct ReplayOverflow(pub ProductId);

/// Initial stock plus the signed sum of `mutations`, or `None` on overflow.
pub fn replay<'a>(initial_stock: i64, mutations: impl IntoIterator<Item = &'a StockMutation>) -> Option<i64> {
    mutations
        .into_iter()
        .try_fold(initial_stock, |stock, m| stock.checked_add(m.signed_quantity()))
}

/// Compare a product's cached stock against the replay of its mutations.
///
/// Mutations belonging to other products are ignored.
pub fn check_consistency<'a>(
    product_id: ProductId,
    initial_stock: i64,
    cached_stock: i64,
    mutations: impl IntoIterator<Item = &'a StockMutation>,
) -> Result<Option<StockDrift>, ReplayOverflow> {
    let replayed = replay(
        initial_stock,
        mutations.into_iter().filter(|m| m.product_id == product_id),
    )
    .ok_or(ReplayOverflow(product_id))?;
    Ok((replayed != cached_stock).then_some(StockDrift {
        product_id,
        cached: cached_stock,
        replayed,
    }))
}
