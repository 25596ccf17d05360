//! Purchasing domain module (supplier purchases).
//!
//! Business rules for recording goods bought from suppliers, paying them off
//! and deleting unpaid purchases. Pure domain logic; the stock consequences
//! are expressed as [`kasir_inventory::StockEvent`]s for the ledger.

pub mod purchase;

pub use purchase::{
    DeletePurchase, PaymentStatus, Purchase, PurchaseCommand, PurchaseDeleted, PurchaseEvent,
    PurchaseId, PurchaseLine, PurchasePaymentRecorded, PurchaseRecorded, RecordPayment,
    RecordPurchase, PURCHASE_CODE_PREFIX,
};
