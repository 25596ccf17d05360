use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kasir_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use kasir_events::Event;

use crate::category::CategoryId;
use crate::stock_status::StockStatus;

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Editable catalog fields of a product.
///
/// Prices are in the smallest currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub barcode: String,
    pub name: String,
    pub category_id: Option<CategoryId>,
    pub purchase_price: i64,
    pub selling_price: i64,
    pub min_stock: i64,
    pub unit: String,
}

impl ProductDetails {
    /// Validate and normalize (trim) the fields.
    pub fn validated(&self) -> Result<ProductDetails, DomainError> {
        let barcode = self.barcode.trim();
        if barcode.is_empty() {
            return Err(DomainError::validation("barcode cannot be empty"));
        }
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        let unit = self.unit.trim();
        if unit.is_empty() {
            return Err(DomainError::validation("unit cannot be empty"));
        }
        if self.purchase_price < 0 || self.selling_price < 0 {
            return Err(DomainError::validation("prices cannot be negative"));
        }
        if self.selling_price < self.purchase_price {
            return Err(DomainError::validation(format!(
                "selling price ({}) must not be below purchase price ({})",
                self.selling_price, self.purchase_price
            )));
        }
        if self.min_stock < 0 {
            return Err(DomainError::validation("minimum stock cannot be negative"));
        }

        Ok(ProductDetails {
            barcode: barcode.to_string(),
            name: name.to_string(),
            category_id: self.category_id,
            purchase_price: self.purchase_price,
            selling_price: self.selling_price,
            min_stock: self.min_stock,
            unit: unit.to_string(),
        })
    }
}

/// Aggregate root: Product.
///
/// `stock` is a snapshot of the cached stock column at load time. The
/// aggregate never changes it; only the stock ledger does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    details: Option<ProductDetails>,
    initial_stock: i64,
    stock: i64,
    is_active: bool,
    version: u64,
}

impl Product {
    /// Create an empty, not-yet-created instance (target of `CreateProduct`).
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            details: None,
            initial_stock: 0,
            stock: 0,
            is_active: false,
            version: 0,
        }
    }

    /// Rehydrate a persisted product from its row.
    pub fn restore(
        id: ProductId,
        details: ProductDetails,
        initial_stock: i64,
        stock: i64,
        is_active: bool,
    ) -> Self {
        Self {
            id,
            details: Some(details),
            initial_stock,
            stock,
            is_active,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn details(&self) -> Option<&ProductDetails> {
        self.details.as_ref()
    }

    pub fn name(&self) -> &str {
        self.details.as_ref().map(|d| d.name.as_str()).unwrap_or("")
    }

    pub fn initial_stock(&self) -> i64 {
        self.initial_stock
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn exists(&self) -> bool {
        self.details.is_some()
    }

    /// Only active products can be rung up at the register.
    pub fn can_be_sold(&self) -> bool {
        self.exists() && self.is_active
    }

    pub fn stock_status(&self) -> StockStatus {
        let min_stock = self.details.as_ref().map(|d| d.min_stock).unwrap_or(0);
        StockStatus::classify(self.stock, min_stock)
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub initial_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProduct (catalog fields only; stock is untouched).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ToggleActive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleActive {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProduct(UpdateProduct),
    ToggleActive(ToggleActive),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub initial_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStatusChanged {
    pub product_id: ProductId,
    pub is_active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductUpdated(ProductUpdated),
    ProductStatusChanged(ProductStatusChanged),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::ProductUpdated(_) => "products.product.updated",
            ProductEvent::ProductStatusChanged(_) => "products.product.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductUpdated(e) => e.occurred_at,
            ProductEvent::ProductStatusChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.details = Some(e.details.clone());
                self.initial_stock = e.initial_stock;
                self.stock = e.initial_stock;
                self.is_active = true;
            }
            ProductEvent::ProductUpdated(e) => {
                self.details = Some(e.details.clone());
            }
            ProductEvent::ProductStatusChanged(e) => {
                self.is_active = e.is_active;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProduct(cmd) => self.handle_update(cmd),
            ProductCommand::ToggleActive(cmd) => self.handle_toggle(cmd),
        }
    }
}

impl Product {
    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.exists() {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.initial_stock < 0 {
            return Err(DomainError::validation("initial stock cannot be negative"));
        }
        // Barcode uniqueness needs storage; the repository enforces it with a
        // UNIQUE constraint.
        let details = cmd.details.validated()?;

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            details,
            initial_stock: cmd.initial_stock,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        self.ensure_product_id(cmd.product_id)?;
        let details = cmd.details.validated()?;

        Ok(vec![ProductEvent::ProductUpdated(ProductUpdated {
            product_id: cmd.product_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_toggle(&self, cmd: &ToggleActive) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        self.ensure_product_id(cmd.product_id)?;

        Ok(vec![ProductEvent::ProductStatusChanged(ProductStatusChanged {
            product_id: cmd.product_id,
            is_active: !self.is_active,
            occurred_at: cmd.occurred_at,
        })])
    }
}
