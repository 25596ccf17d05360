//! Stock ledger domain.
//!
//! Every stock-affecting business event (sale, void, purchase, purchase
//! deletion) is expressed as a [`StockEvent`]. [`plan`] turns one event into
//! the exact set of stock deltas and [`StockMutation`] audit rows to write;
//! the storage layer then writes the whole plan in a single transaction.
//!
//! Pure domain logic: no IO, no storage.

pub mod event;
pub mod ledger;
pub mod mutation;
pub mod replay;

pub use event::{LineItem, StockEvent};
pub use ledger::{plan, LedgerError, LedgerPlan, LedgerPolicy, LedgerReceipt, PlannedMutation};
pub use mutation::{MutationId, MutationType, ReferenceKind, StockMutation};
pub use replay::{check_consistency, replay, ReplayOverflow, StockDrift};
