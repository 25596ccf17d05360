//! Product catalog domain.
//!
//! Business rules for products and categories, implemented as deterministic
//! domain logic (no IO, no storage). Product stock is never changed here: it
//! moves only through the stock ledger in `kasir-inventory`.

pub mod category;
pub mod product;
pub mod stock_status;

pub use category::{Category, CategoryId};
pub use product::{
    CreateProduct, Product, ProductCommand, ProductCreated, ProductDetails, ProductEvent,
    ProductId, ProductStatusChanged, ProductUpdated, ToggleActive, UpdateProduct,
};
pub use stock_status::StockStatus;
