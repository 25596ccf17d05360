//! Infrastructure layer: SQLite persistence for the stock ledger, catalog,
//! sales and purchasing.

pub mod audit;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod purchasing;
pub mod sales;
pub mod store;

mod codes;
mod integration_tests;
mod rows;

pub use catalog::Catalog;
pub use config::StoreConfig;
pub use error::{map_sqlx_error, StoreError};
pub use ledger::SqliteStockLedger;
pub use purchasing::{NewPurchase, PurchaseService};
pub use sales::{CartLine, NewSale, SalesService};
pub use store::Store;
