use serde::{Deserialize, Serialize};

use kasir_core::ValueObject;
use kasir_products::ProductId;

use crate::ledger::LedgerError;
use crate::mutation::{MutationType, ReferenceKind};

/// One (product, quantity) pair of a stock event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl ValueObject for LineItem {}

impl LineItem {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// A stock-affecting business event as the ledger sees it.
///
/// `reference_id` is the originating business event's id (transaction or
/// purchase id). Together with `kind` it is the ledger's idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEvent {
    pub kind: ReferenceKind,
    pub reference_id: String,
    pub lines: Vec<LineItem>,
}

impl StockEvent {
    pub fn new(kind: ReferenceKind, reference_id: impl Into<String>, lines: Vec<LineItem>) -> Self {
        Self {
            kind,
            reference_id: reference_id.into(),
            lines,
        }
    }

    pub fn direction(&self) -> MutationType {
        self.kind.direction()
    }

    /// Reject zero or negative quantities. Runs before any storage access.
    pub fn validate_quantities(&self) -> Result<(), LedgerError> {
        match self.lines.iter().find(|line| line.quantity <= 0) {
            Some(line) => Err(LedgerError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            }),
            None => Ok(()),
        }
    }

    /// Lines merged per product (quantities summed), in first-seen order.
    ///
    /// The ledger writes exactly one mutation row per affected product per event.
    /// A merged quantity that does not fit in an `i64` is an invalid quantity.
    pub fn consolidated_lines(&self) -> Result<Vec<LineItem>, LedgerError> {
        let mut merged: Vec<LineItem> = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            match merged.iter_mut().find(|m| m.product_id == line.product_id) {
                Some(existing) => {
                    existing.quantity =
                        existing
                            .quantity
                            .checked_add(line.quantity)
                            .ok_or(LedgerError::InvalidQuantity {
                                product_id: line.product_id,
                                quantity: line.quantity,
                            })?;
                }
                None => merged.push(*line),
            }
        }
        Ok(merged)
    }

    /// Distinct products touched by the event, in first-seen order.
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            if !ids.contains(&line.product_id) {
                ids.push(line.product_id);
            }
        }
        ids
    }
}
