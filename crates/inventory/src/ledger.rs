//! Ledger planning: turning one [`StockEvent`] into stock deltas + audit rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use kasir_core::{AggregateId, UserId};
use kasir_products::ProductId;

use crate::event::StockEvent;
use crate::mutation::{MutationId, MutationType, ReferenceKind, StockMutation};

/// Failure of a ledger application. Any of these aborts the whole event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: i64 },

    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    #[error("ledger write failed: {0}")]
    StorageWriteFailed(String),
}

/// Knobs the caller chooses explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerPolicy {
    /// When false, an `out` line that would drive stock below zero fails the event.
    pub allow_negative_stock: bool,
}

impl LedgerPolicy {
    pub fn allow_negative_stock(allow: bool) -> Self {
        Self {
            allow_negative_stock: allow,
        }
    }
}

/// One product's share of a planned event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMutation {
    pub mutation: StockMutation,
    pub stock_before: i64,
    pub stock_after: i64,
}

/// Everything one `apply` has to write, in line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerPlan {
    pub kind: ReferenceKind,
    pub reference_id: String,
    pub mutations: Vec<PlannedMutation>,
}

impl LedgerPlan {
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Result of an `apply`, as reported to the calling business operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub kind: ReferenceKind,
    pub reference_id: String,
    pub mutations: Vec<StockMutation>,
    /// True when the event had already been applied and nothing was written.
    pub replayed: bool,
}

/// Plan the ledger writes for `event`.
///
/// `current_stock` returns the cached stock of a product, or `None` if it does
/// not exist. Checks run in this order: quantities, product existence, stock
/// policy. Nothing is written here; an `Err` means the storage layer must not
/// write anything for this event.
pub fn plan<F>(
    event: &StockEvent,
    mut current_stock: F,
    policy: LedgerPolicy,
    actor: UserId,
    now: DateTime<Utc>,
) -> Result<LedgerPlan, LedgerError>
where
    F: FnMut(&ProductId) -> Option<i64>,
{
    event.validate_quantities()?;

    let direction = event.direction();
    let lines = event.consolidated_lines()?;
    let mut mutations = Vec::with_capacity(lines.len());

    for line in lines {
        let stock_before =
            current_stock(&line.product_id).ok_or(LedgerError::ProductNotFound(line.product_id))?;

        let stock_after = match direction {
            MutationType::In => stock_before.checked_add(line.quantity),
            MutationType::Out => stock_before.checked_sub(line.quantity),
        }
        .ok_or(LedgerError::InvalidQuantity {
            product_id: line.product_id,
            quantity: line.quantity,
        })?;

        if direction == MutationType::Out && stock_after < 0 && !policy.allow_negative_stock {
            return Err(LedgerError::InsufficientStock {
                product_id: line.product_id,
                available: stock_before,
                requested: line.quantity,
            });
        }

        mutations.push(PlannedMutation {
            mutation: StockMutation {
                id: MutationId::new(AggregateId::new()),
                product_id: line.product_id,
                mutation_type: direction,
                quantity: line.quantity,
                reference_kind: event.kind,
                reference_id: event.reference_id.clone(),
                user_id: actor,
                created_at: now,
            },
            stock_before,
            stock_after,
        });
    }

    Ok(LedgerPlan {
        kind: event.kind,
        reference_id: event.reference_id.clone(),
        mutations,
    })
}
