use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kasir_core::{code, Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, Role, UserId, ValueObject};
use kasir_events::Event;
use kasir_inventory::{LineItem, ReferenceKind, StockEvent};
use kasir_products::ProductId;

use crate::totals::{compute_totals, Discount, SaleTotals};

pub const TRANSACTION_CODE_PREFIX: &str = "TRX";

/// Sale transaction identifier. Also the stock ledger's reference id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleId(pub AggregateId);

impl SaleId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SaleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Completed,
    Void,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Completed => "completed",
            SaleStatus::Void => "void",
        }
    }
}

impl FromStr for SaleStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(SaleStatus::Completed),
            "void" => Ok(SaleStatus::Void),
            other => Err(DomainError::validation(format!("unknown sale status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Debit,
    Credit,
    Qris,
    Transfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Debit => "debit",
            PaymentMethod::Credit => "credit",
            PaymentMethod::Qris => "qris",
            PaymentMethod::Transfer => "transfer",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "debit" => Ok(PaymentMethod::Debit),
            "credit" => Ok(PaymentMethod::Credit),
            "qris" => Ok(PaymentMethod::Qris),
            "transfer" => Ok(PaymentMethod::Transfer),
            other => Err(DomainError::validation(format!("unknown payment method: {other}"))),
        }
    }
}

/// One cart line. The product name is captured at sale time for receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: i64,
}

impl ValueObject for SaleLine {}

impl SaleLine {
    pub fn subtotal(&self) -> DomainResult<i64> {
        self.quantity
            .checked_mul(self.unit_price)
            .ok_or_else(|| DomainError::validation("line subtotal overflow"))
    }
}

/// Aggregate root: SaleTransaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleTransaction {
    id: SaleId,
    code: String,
    cashier_id: Option<UserId>,
    lines: Vec<SaleLine>,
    totals: Option<SaleTotals>,
    payment_method: Option<PaymentMethod>,
    payment_amount: i64,
    status: SaleStatus,
    voided_by: Option<UserId>,
    voided_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl SaleTransaction {
    /// Create an empty, not-yet-created instance.
    pub fn empty(id: SaleId) -> Self {
        Self {
            id,
            code: String::new(),
            cashier_id: None,
            lines: Vec::new(),
            totals: None,
            payment_method: None,
            payment_amount: 0,
            status: SaleStatus::Completed,
            voided_by: None,
            voided_at: None,
            version: 0,
            created: false,
        }
    }

    /// Rehydrate from persisted rows.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: SaleId,
        code: String,
        cashier_id: UserId,
        lines: Vec<SaleLine>,
        totals: SaleTotals,
        payment_method: PaymentMethod,
        payment_amount: i64,
        status: SaleStatus,
        voided_by: Option<UserId>,
        voided_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            code,
            cashier_id: Some(cashier_id),
            lines,
            totals: Some(totals),
            payment_method: Some(payment_method),
            payment_amount,
            status,
            voided_by,
            voided_at,
            version: 0,
            created: true,
        }
    }

    pub fn id_typed(&self) -> SaleId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn cashier_id(&self) -> Option<UserId> {
        self.cashier_id
    }

    pub fn lines(&self) -> &[SaleLine] {
        &self.lines
    }

    pub fn totals(&self) -> Option<SaleTotals> {
        self.totals
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    pub fn payment_amount(&self) -> i64 {
        self.payment_amount
    }

    pub fn change_amount(&self) -> i64 {
        self.totals.map(|t| self.payment_amount - t.total).unwrap_or(0)
    }

    pub fn status(&self) -> SaleStatus {
        self.status
    }

    pub fn voided_by(&self) -> Option<UserId> {
        self.voided_by
    }

    pub fn voided_at(&self) -> Option<DateTime<Utc>> {
        self.voided_at
    }
}

impl AggregateRoot for SaleTransaction {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CompleteSale (checkout).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteSale {
    pub sale_id: SaleId,
    pub code: String,
    pub cashier_id: UserId,
    pub lines: Vec<SaleLine>,
    pub discount: Discount,
    pub tax_percent: i64,
    pub payment_method: PaymentMethod,
    pub payment_amount: i64,
    pub customer_name: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VoidSale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidSale {
    pub sale_id: SaleId,
    pub voided_by: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleCommand {
    CompleteSale(CompleteSale),
    VoidSale(VoidSale),
}

/// Event: SaleCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleCompleted {
    pub sale_id: SaleId,
    pub code: String,
    pub cashier_id: UserId,
    pub lines: Vec<SaleLine>,
    pub discount: Discount,
    pub tax_percent: i64,
    pub totals: SaleTotals,
    pub payment_method: PaymentMethod,
    pub payment_amount: i64,
    pub change_amount: i64,
    pub customer_name: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SaleVoided.
///
/// Carries the sold lines so the stock can be returned without reloading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleVoided {
    pub sale_id: SaleId,
    pub voided_by: UserId,
    pub lines: Vec<SaleLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleEvent {
    SaleCompleted(SaleCompleted),
    SaleVoided(SaleVoided),
}

impl SaleEvent {
    /// The ledger event this sale event causes: `sale` (out) for a
    /// completion, `void` (in) for a void. Both reference the sale id.
    pub fn stock_event(&self) -> StockEvent {
        let (kind, sale_id, lines) = match self {
            SaleEvent::SaleCompleted(e) => (ReferenceKind::Sale, e.sale_id, &e.lines),
            SaleEvent::SaleVoided(e) => (ReferenceKind::Void, e.sale_id, &e.lines),
        };
        StockEvent::new(
            kind,
            sale_id.to_string(),
            lines
                .iter()
                .map(|l| LineItem::new(l.product_id, l.quantity))
                .collect(),
        )
    }
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::SaleCompleted(_) => "sales.transaction.completed",
            SaleEvent::SaleVoided(_) => "sales.transaction.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::SaleCompleted(e) => e.occurred_at,
            SaleEvent::SaleVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SaleTransaction {
    type Command = SaleCommand;
    type Event = SaleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleEvent::SaleCompleted(e) => {
                self.id = e.sale_id;
                self.code = e.code.clone();
                self.cashier_id = Some(e.cashier_id);
                self.lines = e.lines.clone();
                self.totals = Some(e.totals);
                self.payment_method = Some(e.payment_method);
                self.payment_amount = e.payment_amount;
                self.status = SaleStatus::Completed;
                self.created = true;
            }
            SaleEvent::SaleVoided(e) => {
                self.status = SaleStatus::Void;
                self.voided_by = Some(e.voided_by);
                self.voided_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleCommand::CompleteSale(cmd) => self.handle_complete(cmd),
            SaleCommand::VoidSale(cmd) => self.handle_void(cmd),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl SaleTransaction {
    fn ensure_sale_id(&self, sale_id: SaleId) -> Result<(), DomainError> {
        if self.id != sale_id {
            return Err(DomainError::invariant("sale_id mismatch"));
        }
        Ok(())
    }

    fn handle_complete(&self, cmd: &CompleteSale) -> Result<Vec<SaleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("transaction already exists"));
        }
        code::validate(TRANSACTION_CODE_PREFIX, &cmd.code)?;

        if cmd.lines.is_empty() {
            return Err(DomainError::validation("cart is empty"));
        }
        for line in &cmd.lines {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "quantity for {} must be greater than zero",
                    line.product_name
                )));
            }
            if line.unit_price < 0 {
                return Err(DomainError::validation(format!(
                    "price for {} cannot be negative",
                    line.product_name
                )));
            }
        }

        let totals = compute_totals(&cmd.lines, cmd.discount, cmd.tax_percent)?;
        if cmd.payment_amount < totals.total {
            return Err(DomainError::validation(format!(
                "payment amount {} is less than total {}",
                cmd.payment_amount, totals.total
            )));
        }

        Ok(vec![SaleEvent::SaleCompleted(SaleCompleted {
            sale_id: cmd.sale_id,
            code: cmd.code.clone(),
            cashier_id: cmd.cashier_id,
            lines: cmd.lines.clone(),
            discount: cmd.discount,
            tax_percent: cmd.tax_percent,
            totals,
            payment_method: cmd.payment_method,
            payment_amount: cmd.payment_amount,
            change_amount: cmd.payment_amount - totals.total,
            customer_name: non_blank(&cmd.customer_name),
            notes: non_blank(&cmd.notes),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidSale) -> Result<Vec<SaleEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_sale_id(cmd.sale_id)?;

        if !cmd.role.is_supervisor() {
            return Err(DomainError::unauthorized("only owner or admin may void a transaction"));
        }
        if self.status == SaleStatus::Void {
            return Err(DomainError::conflict(format!("transaction {} is already void", self.code)));
        }

        Ok(vec![SaleEvent::SaleVoided(SaleVoided {
            sale_id: cmd.sale_id,
            voided_by: cmd.voided_by,
            lines: self.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
