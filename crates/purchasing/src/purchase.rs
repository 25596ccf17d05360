use core::str::FromStr;
use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use kasir_core::{code, Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, UserId, ValueObject};
use kasir_events::Event;
use kasir_inventory::{LineItem, ReferenceKind, StockEvent};
use kasir_products::ProductId;

pub const PURCHASE_CODE_PREFIX: &str = "PO";

/// Purchase identifier. Also the stock ledger's reference id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseId(pub AggregateId);

impl PurchaseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Settlement state, always derived from paid vs total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn derive(paid: i64, total: i64) -> Self {
        if paid >= total {
            PaymentStatus::Paid
        } else if paid <= 0 {
            PaymentStatus::Unpaid
        } else {
            PaymentStatus::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "partial" => Ok(PaymentStatus::Partial),
            "paid" => Ok(PaymentStatus::Paid),
            other => Err(DomainError::validation(format!("unknown payment status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub purchase_price: i64,
}

impl ValueObject for PurchaseLine {}

impl PurchaseLine {
    pub fn subtotal(&self) -> DomainResult<i64> {
        self.quantity
            .checked_mul(self.purchase_price)
            .ok_or_else(|| DomainError::validation("line subtotal overflow"))
    }
}

/// Aggregate root: Purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    id: PurchaseId,
    code: String,
    supplier_name: String,
    purchase_date: Option<NaiveDate>,
    lines: Vec<PurchaseLine>,
    total: i64,
    paid_amount: i64,
    notes: Option<String>,
    recorded_by: Option<UserId>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl Purchase {
    /// Create an empty, not-yet-created instance.
    pub fn empty(id: PurchaseId) -> Self {
        Self {
            id,
            code: String::new(),
            supplier_name: String::new(),
            purchase_date: None,
            lines: Vec::new(),
            total: 0,
            paid_amount: 0,
            notes: None,
            recorded_by: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    /// Rehydrate from persisted rows. The total is recomputed from the lines.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: PurchaseId,
        code: String,
        supplier_name: String,
        purchase_date: NaiveDate,
        lines: Vec<PurchaseLine>,
        paid_amount: i64,
        notes: Option<String>,
        recorded_by: UserId,
    ) -> DomainResult<Self> {
        let total = total_of(&lines)?;
        Ok(Self {
            id,
            code,
            supplier_name,
            purchase_date: Some(purchase_date),
            lines,
            total,
            paid_amount,
            notes,
            recorded_by: Some(recorded_by),
            version: 0,
            created: true,
            deleted: false,
        })
    }

    pub fn id_typed(&self) -> PurchaseId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn supplier_name(&self) -> &str {
        &self.supplier_name
    }

    pub fn purchase_date(&self) -> Option<NaiveDate> {
        self.purchase_date
    }

    pub fn lines(&self) -> &[PurchaseLine] {
        &self.lines
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    pub fn paid_amount(&self) -> i64 {
        self.paid_amount
    }

    pub fn remaining_amount(&self) -> i64 {
        self.total - self.paid_amount
    }

    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::derive(self.paid_amount, self.total)
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn recorded_by(&self) -> Option<UserId> {
        self.recorded_by
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

fn total_of(lines: &[PurchaseLine]) -> DomainResult<i64> {
    let mut total: i64 = 0;
    for line in lines {
        total = total
            .checked_add(line.subtotal()?)
            .ok_or_else(|| DomainError::validation("purchase total overflow"))?;
    }
    Ok(total)
}

impl AggregateRoot for Purchase {
    type Id = PurchaseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordPurchase (goods received from a supplier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPurchase {
    pub purchase_id: PurchaseId,
    pub code: String,
    pub supplier_name: String,
    pub purchase_date: NaiveDate,
    pub lines: Vec<PurchaseLine>,
    pub paid_amount: i64,
    pub notes: Option<String>,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment (settle part or all of the remaining amount).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub purchase_id: PurchaseId,
    pub amount: i64,
    pub paid_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeletePurchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePurchase {
    pub purchase_id: PurchaseId,
    pub deleted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseCommand {
    RecordPurchase(RecordPurchase),
    RecordPayment(RecordPayment),
    DeletePurchase(DeletePurchase),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecorded {
    pub purchase_id: PurchaseId,
    pub code: String,
    pub supplier_name: String,
    pub purchase_date: NaiveDate,
    pub lines: Vec<PurchaseLine>,
    pub total: i64,
    pub paid_amount: i64,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasePaymentRecorded {
    pub purchase_id: PurchaseId,
    pub amount: i64,
    /// Cumulative paid amount after this payment.
    pub paid_amount: i64,
    pub payment_status: PaymentStatus,
    pub paid_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseDeleted {
    pub purchase_id: PurchaseId,
    pub deleted_by: UserId,
    pub lines: Vec<PurchaseLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseEvent {
    PurchaseRecorded(PurchaseRecorded),
    PurchasePaymentRecorded(PurchasePaymentRecorded),
    PurchaseDeleted(PurchaseDeleted),
}

impl PurchaseEvent {
    /// The ledger event this purchase event causes, if any. Payments do not
    /// move stock.
    pub fn stock_event(&self) -> Option<StockEvent> {
        let (kind, purchase_id, lines) = match self {
            PurchaseEvent::PurchaseRecorded(e) => (ReferenceKind::Purchase, e.purchase_id, &e.lines),
            PurchaseEvent::PurchaseDeleted(e) => (ReferenceKind::PurchaseDelete, e.purchase_id, &e.lines),
            PurchaseEvent::PurchasePaymentRecorded(_) => return None,
        };
        Some(StockEvent::new(
            kind,
            purchase_id.to_string(),
            lines
                .iter()
                .map(|l| LineItem::new(l.product_id, l.quantity))
                .collect(),
        ))
    }
}

impl Event for PurchaseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseEvent::PurchaseRecorded(_) => "purchasing.purchase.recorded",
            PurchaseEvent::PurchasePaymentRecorded(_) => "purchasing.purchase.payment_recorded",
            PurchaseEvent::PurchaseDeleted(_) => "purchasing.purchase.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseEvent::PurchaseRecorded(e) => e.occurred_at,
            PurchaseEvent::PurchasePaymentRecorded(e) => e.occurred_at,
            PurchaseEvent::PurchaseDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Purchase {
    type Command = PurchaseCommand;
    type Event = PurchaseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseEvent::PurchaseRecorded(e) => {
                self.id = e.purchase_id;
                self.code = e.code.clone();
                self.supplier_name = e.supplier_name.clone();
                self.purchase_date = Some(e.purchase_date);
                self.lines = e.lines.clone();
                self.total = e.total;
                self.paid_amount = e.paid_amount;
                self.notes = e.notes.clone();
                self.recorded_by = Some(e.recorded_by);
                self.created = true;
            }
            PurchaseEvent::PurchasePaymentRecorded(e) => {
                self.paid_amount = e.paid_amount;
            }
            PurchaseEvent::PurchaseDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseCommand::RecordPurchase(cmd) => self.handle_record(cmd),
            PurchaseCommand::RecordPayment(cmd) => self.handle_payment(cmd),
            PurchaseCommand::DeletePurchase(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Purchase {
    fn ensure_live(&self, purchase_id: PurchaseId) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found());
        }
        if self.id != purchase_id {
            return Err(DomainError::invariant("purchase_id mismatch"));
        }
        Ok(())
    }

    fn handle_record(&self, cmd: &RecordPurchase) -> Result<Vec<PurchaseEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase already exists"));
        }
        code::validate(PURCHASE_CODE_PREFIX, &cmd.code)?;

        let supplier_name = cmd.supplier_name.trim();
        if supplier_name.is_empty() {
            return Err(DomainError::validation("supplier name is required"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("purchase must have at least one line"));
        }

        let mut seen = HashSet::new();
        for line in &cmd.lines {
            if !seen.insert(line.product_id) {
                return Err(DomainError::validation(format!(
                    "product {} appears more than once",
                    line.product_id
                )));
            }
            if line.quantity <= 0 {
                return Err(DomainError::validation("quantity must be greater than zero"));
            }
            if line.purchase_price < 0 {
                return Err(DomainError::validation("purchase price cannot be negative"));
            }
        }

        let total = total_of(&cmd.lines)?;
        if cmd.paid_amount < 0 {
            return Err(DomainError::validation("paid amount cannot be negative"));
        }
        if cmd.paid_amount > total {
            return Err(DomainError::validation(format!(
                "paid amount {} exceeds total {}",
                cmd.paid_amount, total
            )));
        }

        Ok(vec![PurchaseEvent::PurchaseRecorded(PurchaseRecorded {
            purchase_id: cmd.purchase_id,
            code: cmd.code.clone(),
            supplier_name: supplier_name.to_string(),
            purchase_date: cmd.purchase_date,
            lines: cmd.lines.clone(),
            total,
            paid_amount: cmd.paid_amount,
            payment_status: PaymentStatus::derive(cmd.paid_amount, total),
            notes: cmd
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            recorded_by: cmd.recorded_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_payment(&self, cmd: &RecordPayment) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_live(cmd.purchase_id)?;

        if self.payment_status() == PaymentStatus::Paid {
            return Err(DomainError::conflict(format!("purchase {} is already paid", self.code)));
        }
        if cmd.amount <= 0 {
            return Err(DomainError::validation("payment amount must be greater than zero"));
        }
        let remaining = self.remaining_amount();
        if cmd.amount > remaining {
            return Err(DomainError::validation(format!(
                "payment amount {} exceeds remaining {}",
                cmd.amount, remaining
            )));
        }

        let paid_amount = self.paid_amount + cmd.amount;
        Ok(vec![PurchaseEvent::PurchasePaymentRecorded(PurchasePaymentRecorded {
            purchase_id: cmd.purchase_id,
            amount: cmd.amount,
            paid_amount,
            payment_status: PaymentStatus::derive(paid_amount, self.total),
            paid_by: cmd.paid_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeletePurchase) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_live(cmd.purchase_id)?;

        if self.paid_amount > 0 {
            return Err(DomainError::conflict(format!(
                "purchase {} has recorded payments and cannot be deleted",
                self.code
            )));
        }

        Ok(vec![PurchaseEvent::PurchaseDeleted(PurchaseDeleted {
            purchase_id: cmd.purchase_id,
            deleted_by: cmd.deleted_by,
            lines: self.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kasir_inventory::MutationType;

    fn test_purchase_id() -> PurchaseId {
        PurchaseId::new(AggregateId::new())
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn record_cmd(purchase_id: PurchaseId, lines: Vec<PurchaseLine>, paid_amount: i64) -> RecordPurchase {
        RecordPurchase {
            purchase_id,
            code: "PO-20260131-0007".to_string(),
            supplier_name: " CV Sumber Rejeki ".to_string(),
            purchase_date: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            lines,
            paid_amount,
            notes: None,
            recorded_by: UserId::new(),
            occurred_at: Utc::now(),
        }
    }

    fn line(product_id: ProductId, quantity: i64, purchase_price: i64) -> PurchaseLine {
        PurchaseLine {
            product_id,
            quantity,
            purchase_price,
        }
    }

    fn recorded(purchase_id: PurchaseId, product_id: ProductId, paid_amount: i64) -> Purchase {
        let mut purchase = Purchase::empty(purchase_id);
        let events = purchase
            .handle(&PurchaseCommand::RecordPurchase(record_cmd(
                purchase_id,
                vec![line(product_id, 20, 2_500)],
                paid_amount,
            )))
            .unwrap();
        purchase.apply(&events[0]);
        purchase
    }

    #[test]
    fn record_purchase_derives_total_and_status() {
        let purchase_id = test_purchase_id();
        let product_id = test_product_id();
        let purchase = recorded(purchase_id, product_id, 10_000);

        assert_eq!(purchase.total(), 50_000);
        assert_eq!(purchase.remaining_amount(), 40_000);
        assert_eq!(purchase.payment_status(), PaymentStatus::Partial);
        assert_eq!(purchase.supplier_name(), "CV Sumber Rejeki");
        assert_eq!(purchase.version(), 1);
    }

    #[test]
    fn recorded_event_maps_to_purchase_stock_event() {
        let purchase_id = test_purchase_id();
        let product_id = test_product_id();
        let events = Purchase::empty(purchase_id)
            .handle(&PurchaseCommand::RecordPurchase(record_cmd(
                purchase_id,
                vec![line(product_id, 20, 2_500)],
                0,
            )))
            .unwrap();

        assert_eq!(events[0].event_type(), "purchasing.purchase.recorded");
        assert_eq!(events[0].version(), 1);

        let stock_event = events[0].stock_event().unwrap();
        assert_eq!(stock_event.kind, ReferenceKind::Purchase);
        assert_eq!(stock_event.direction(), MutationType::In);
        assert_eq!(stock_event.reference_id, purchase_id.to_string());
        assert_eq!(stock_event.lines, vec![LineItem::new(product_id, 20)]);
    }

    #[test]
    fn duplicate_products_are_rejected() {
        let purchase_id = test_purchase_id();
        let product_id = test_product_id();
        let err = Purchase::empty(purchase_id)
            .handle(&PurchaseCommand::RecordPurchase(record_cmd(
                purchase_id,
                vec![line(product_id, 1, 100), line(product_id, 2, 100)],
                0,
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn overpaying_on_record_is_rejected() {
        let purchase_id = test_purchase_id();
        let err = Purchase::empty(purchase_id)
            .handle(&PurchaseCommand::RecordPurchase(record_cmd(
                purchase_id,
                vec![line(test_product_id(), 2, 100)],
                201,
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn payments_settle_the_purchase() {
        let purchase_id = test_purchase_id();
        let mut purchase = recorded(purchase_id, test_product_id(), 0);
        assert_eq!(purchase.payment_status(), PaymentStatus::Unpaid);

        let pay = |amount| {
            PurchaseCommand::RecordPayment(RecordPayment {
                purchase_id,
                amount,
                paid_by: UserId::new(),
                occurred_at: Utc::now(),
            })
        };

        let err = purchase.handle(&pay(50_001)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(purchase.handle(&pay(0)).is_err());

        let events = purchase.handle(&pay(50_000)).unwrap();
        assert!(events[0].stock_event().is_none());
        purchase.apply(&events[0]);
        assert_eq!(purchase.payment_status(), PaymentStatus::Paid);

        let err = purchase.handle(&pay(1)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn unpaid_purchase_delete_reverses_stock() {
        let purchase_id = test_purchase_id();
        let product_id = test_product_id();
        let mut purchase = recorded(purchase_id, product_id, 0);
        let cmd = PurchaseCommand::DeletePurchase(DeletePurchase {
            purchase_id,
            deleted_by: UserId::new(),
            occurred_at: Utc::now(),
        });

        let events = purchase.handle(&cmd).unwrap();
        let stock_event = events[0].stock_event().unwrap();
        assert_eq!(stock_event.kind, ReferenceKind::PurchaseDelete);
        assert_eq!(stock_event.direction(), MutationType::Out);
        assert_eq!(stock_event.lines, vec![LineItem::new(product_id, 20)]);

        purchase.apply(&events[0]);
        assert!(purchase.is_deleted());
        assert_eq!(purchase.handle(&cmd).unwrap_err(), DomainError::NotFound);
    }

    #[test]
    fn paid_purchase_cannot_be_deleted() {
        let purchase_id = test_purchase_id();
        let purchase = recorded(purchase_id, test_product_id(), 1);
        let err = purchase
            .handle(&PurchaseCommand::DeletePurchase(DeletePurchase {
                purchase_id,
                deleted_by: UserId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: paying in installments never exceeds the total and
            /// the status follows the paid amount.
            #[test]
            fn installments_never_overpay(
                quantity in 1i64..100,
                price in 1i64..100_000,
                installments in prop::collection::vec(1i64..50_000, 1..10),
            ) {
                let purchase_id = test_purchase_id();
                let mut purchase = Purchase::empty(purchase_id);
                let events = purchase
                    .handle(&PurchaseCommand::RecordPurchase(record_cmd(
                        purchase_id,
                        vec![line(test_product_id(), quantity, price)],
                        0,
                    )))
                    .unwrap();
                purchase.apply(&events[0]);

                for amount in installments {
                    let cmd = PurchaseCommand::RecordPayment(RecordPayment {
                        purchase_id,
                        amount,
                        paid_by: UserId::new(),
                        occurred_at: Utc::now(),
                    });
                    if let Ok(events) = purchase.handle(&cmd) {
                        purchase.apply(&events[0]);
                    }
                    prop_assert!(purchase.paid_amount() <= purchase.total());
                    prop_assert_eq!(
                        purchase.payment_status(),
                        PaymentStatus::derive(purchase.paid_amount(), purchase.total())
                    );
                }
            }
        }
    }
}
