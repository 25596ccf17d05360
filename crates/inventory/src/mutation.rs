use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kasir_core::{AggregateId, DomainError, Entity, UserId};
use kasir_products::ProductId;

/// Stock mutation (audit row) identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(pub AggregateId);

impl MutationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MutationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Direction of a stock change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationType {
    In,
    Out,
}

impl MutationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationType::In => "in",
            MutationType::Out => "out",
        }
    }

    /// +1 for `in`, -1 for `out`.
    pub fn sign(&self) -> i64 {
        match self {
            MutationType::In => 1,
            MutationType::Out => -1,
        }
    }
}

impl FromStr for MutationType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(MutationType::In),
            "out" => Ok(MutationType::Out),
            other => Err(DomainError::validation(format!("unknown mutation type: {other}"))),
        }
    }
}

/// Which kind of business event caused a stock change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Sale,
    Void,
    Purchase,
    PurchaseDelete,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Sale => "sale",
            ReferenceKind::Void => "void",
            ReferenceKind::Purchase => "purchase",
            ReferenceKind::PurchaseDelete => "purchase_delete",
        }
    }

    /// The direction policy: sales and purchase deletions take stock out,
    /// voids and purchases put it back in.
    pub fn direction(&self) -> MutationType {
        match self {
            ReferenceKind::Sale | ReferenceKind::PurchaseDelete => MutationType::Out,
            ReferenceKind::Void | ReferenceKind::Purchase => MutationType::In,
        }
    }
}

impl FromStr for ReferenceKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sale" => Ok(ReferenceKind::Sale),
            "void" => Ok(ReferenceKind::Void),
            "purchase" => Ok(ReferenceKind::Purchase),
            "purchase_delete" => Ok(ReferenceKind::PurchaseDelete),
            other => Err(DomainError::validation(format!("unknown reference kind: {other}"))),
        }
    }
}

/// Append-only audit record of one stock change for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMutation {
    pub id: MutationId,
    pub product_id: ProductId,
    pub mutation_type: MutationType,
    /// Always > 0; the direction lives in `mutation_type`.
    pub quantity: i64,
    pub reference_kind: ReferenceKind,
    pub reference_id: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl StockMutation {
    pub fn signed_quantity(&self) -> i64 {
        self.mutation_type.sign() * self.quantity
    }
}

impl Entity for StockMutation {
    type Id = MutationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
