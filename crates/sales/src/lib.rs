//! Sales domain: cashier checkout and voids.
//!
//! A completed sale takes stock out through the ledger; voiding it puts the
//! same quantities back. Pure domain logic (no IO, no storage).

pub mod totals;
pub mod transaction;

pub use totals::{compute_totals, Discount, SaleTotals};
pub use transaction::{
    CompleteSale, PaymentMethod, SaleCommand, SaleCompleted, SaleEvent, SaleId, SaleLine,
    SaleStatus, SaleTransaction, SaleVoided, VoidSale, TRANSACTION_CODE_PREFIX,
};
