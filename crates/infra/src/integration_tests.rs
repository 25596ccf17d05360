//! End-to-end tests against in-memory SQLite.
//!
//! Tests: business operation → ledger → products.stock + stock_mutations
//!
//! Verifies:
//! - Every event's writes commit or roll back together
//! - Cached stock always equals the replay of the audit trail
//! - Refused operations leave no rows behind

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use kasir_core::{code, DomainError, Role, Session, UserId};
    use kasir_inventory::{LedgerError, LedgerPolicy, LineItem, MutationType, ReferenceKind, StockEvent};
    use kasir_products::{ProductDetails, ProductId};
    use kasir_purchasing::{PaymentStatus, PurchaseLine, PURCHASE_CODE_PREFIX};
    use kasir_sales::{Discount, PaymentMethod, SaleStatus, TRANSACTION_CODE_PREFIX};

    use crate::config::StoreConfig;
    use crate::error::StoreError;
    use crate::purchasing::NewPurchase;
    use crate::sales::{CartLine, NewSale};
    use crate::store::Store;

    const PRICE: i64 = 4_000;

    async fn open_store(policy: LedgerPolicy) -> Store {
        Store::open(&StoreConfig::in_memory().with_policy(policy))
            .await
            .unwrap()
    }

    fn owner() -> Session {
        Session::new(UserId::new(), "owner", Role::Owner)
    }

    fn cashier() -> Session {
        Session::new(UserId::new(), "kasir1", Role::Kasir)
    }

    fn details(barcode: &str) -> ProductDetails {
        ProductDetails {
            barcode: barcode.to_string(),
            name: format!("Product {barcode}"),
            category_id: None,
            purchase_price: 2_500,
            selling_price: PRICE,
            min_stock: 5,
            unit: "pcs".to_string(),
        }
    }

    async fn product(store: &Store, barcode: &str, initial_stock: i64) -> ProductId {
        store
            .catalog
            .create_product(details(barcode), initial_stock)
            .await
            .unwrap()
            .id_typed()
    }

    async fn stock_of(store: &Store, product_id: ProductId) -> i64 {
        store
            .catalog
            .get_product(product_id)
            .await
            .unwrap()
            .unwrap()
            .stock()
    }

    async fn count(store: &Store, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    fn cash_sale(lines: &[(ProductId, i64)], payment_amount: i64) -> NewSale {
        NewSale {
            lines: lines
                .iter()
                .map(|(product_id, quantity)| CartLine {
                    product_id: *product_id,
                    quantity: *quantity,
                })
                .collect(),
            discount: Discount::None,
            tax_percent: 0,
            payment_method: PaymentMethod::Cash,
            payment_amount,
            customer_name: None,
            notes: None,
        }
    }

    fn purchase_of(lines: &[(ProductId, i64)], paid_amount: i64) -> NewPurchase {
        NewPurchase {
            supplier_name: "CV Sumber Rejeki".to_string(),
            purchase_date: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            lines: lines
                .iter()
                .map(|(product_id, quantity)| PurchaseLine {
                    product_id: *product_id,
                    quantity: *quantity,
                    purchase_price: 2_500,
                })
                .collect(),
            paid_amount,
            notes: None,
        }
    }

    async fn seed_transaction_code(store: &Store, code: &str) {
        sqlx::query(
            "INSERT INTO transactions (id, code, user_id, subtotal, total, payment_method, payment_amount, created_at) \
             VALUES (?, ?, ?, 0, 0, 'cash', 0, ?)",
        )
        .bind(kasir_core::AggregateId::new().to_string())
        .bind(code)
        .bind(UserId::new().to_string())
        .bind(Utc::now())
        .execute(store.pool())
        .await
        .unwrap();
    }

    async fn fail_mutation_inserts_for(store: &Store, product_id: ProductId) {
        sqlx::query(&format!(
            "CREATE TRIGGER fail_mutation BEFORE INSERT ON stock_mutations \
             WHEN NEW.product_id = '{product_id}' \
             BEGIN SELECT RAISE(ABORT, 'simulated disk failure'); END"
        ))
        .execute(store.pool())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn sale_void_purchase_delete_round_trip() {
        let store = open_store(LedgerPolicy::default()).await;
        let p = product(&store, "8991002101234", 50).await;

        // A: sale of 5
        let sale = store
            .sales
            .complete_sale(&cashier(), cash_sale(&[(p, 5)], 5 * PRICE))
            .await
            .unwrap();
        assert_eq!(stock_of(&store, p).await, 45);
        let sale_rows = store
            .ledger
            .mutations_for_reference(ReferenceKind::Sale, &sale.id_typed().to_string())
            .await
            .unwrap();
        assert_eq!(sale_rows.len(), 1);
        assert_eq!(sale_rows[0].mutation_type, MutationType::Out);
        assert_eq!(sale_rows[0].quantity, 5);

        // B: void
        let voided = store.sales.void_sale(&owner(), sale.id_typed()).await.unwrap();
        assert_eq!(voided.status(), SaleStatus::Void);
        assert_eq!(stock_of(&store, p).await, 50);
        let void_rows = store
            .ledger
            .mutations_for_reference(ReferenceKind::Void, &sale.id_typed().to_string())
            .await
            .unwrap();
        assert_eq!(void_rows.len(), 1);
        assert_eq!(void_rows[0].mutation_type, MutationType::In);
        assert_eq!(void_rows[0].quantity, 5);

        // C: purchase of 20
        let purchase = store
            .purchasing
            .record_purchase(&owner(), purchase_of(&[(p, 20)], 0))
            .await
            .unwrap();
        assert_eq!(purchase.payment_status(), PaymentStatus::Unpaid);
        assert_eq!(stock_of(&store, p).await, 70);

        // D: delete the unpaid purchase
        let receipt = store
            .purchasing
            .delete_purchase(&owner(), purchase.id_typed())
            .await
            .unwrap();
        assert_eq!(receipt.kind, ReferenceKind::PurchaseDelete);
        assert_eq!(receipt.mutations[0].mutation_type, MutationType::Out);
        assert_eq!(receipt.mutations[0].quantity, 20);
        assert_eq!(stock_of(&store, p).await, 50);
        assert!(store.purchasing.get_purchase(purchase.id_typed()).await.unwrap().is_none());

        let card = store.ledger.mutations_for_product(p).await.unwrap();
        let kinds: Vec<_> = card.iter().map(|m| m.reference_kind).collect();
        assert_eq!(
            kinds,
            vec![
                ReferenceKind::Sale,
                ReferenceKind::Void,
                ReferenceKind::Purchase,
                ReferenceKind::PurchaseDelete
            ]
        );
        assert!(store.verify_stock_consistency().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_write_mid_event_leaves_nothing_behind() {
        let store = open_store(LedgerPolicy::default()).await;
        let a = product(&store, "A-1", 10).await;
        let b = product(&store, "B-2", 10).await;
        let c = product(&store, "C-3", 10).await;
        fail_mutation_inserts_for(&store, b).await;

        let event = StockEvent::new(
            ReferenceKind::Purchase,
            "external-ref-1",
            vec![LineItem::new(a, 1), LineItem::new(b, 2), LineItem::new(c, 3)],
        );
        let err = store.ledger.apply(&owner(), &event).await.unwrap_err();
        assert!(matches!(err, LedgerError::StorageWriteFailed(_)));

        for id in [a, b, c] {
            assert_eq!(stock_of(&store, id).await, 10);
        }
        assert_eq!(count(&store, "stock_mutations").await, 0);
    }

    #[tokio::test]
    async fn failed_ledger_write_rolls_back_the_sale_header() {
        let store = open_store(LedgerPolicy::default()).await;
        let a = product(&store, "A-1", 10).await;
        let b = product(&store, "B-2", 10).await;
        fail_mutation_inserts_for(&store, b).await;

        let err = store
            .sales
            .complete_sale(&cashier(), cash_sale(&[(a, 1), (b, 1)], 2 * PRICE))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Ledger(LedgerError::StorageWriteFailed(_))));

        assert_eq!(count(&store, "transactions").await, 0);
        assert_eq!(count(&store, "transaction_items").await, 0);
        assert_eq!(stock_of(&store, a).await, 10);
    }

    #[tokio::test]
    async fn reapplying_an_event_is_a_no_op() {
        let store = open_store(LedgerPolicy::default()).await;
        let p = product(&store, "P-1", 10).await;
        let event = StockEvent::new(ReferenceKind::Purchase, "po-42", vec![LineItem::new(p, 4)]);

        let first = store.ledger.apply(&owner(), &event).await.unwrap();
        let second = store.ledger.apply(&owner(), &event).await.unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.mutations, second.mutations);
        assert_eq!(stock_of(&store, p).await, 14);
        assert_eq!(count(&store, "stock_mutations").await, 1);
    }

    #[tokio::test]
    async fn non_positive_quantities_write_nothing() {
        let store = open_store(LedgerPolicy::default()).await;
        let p = product(&store, "P-1", 10).await;

        for quantity in [0, -3] {
            let event = StockEvent::new(ReferenceKind::Sale, "bad", vec![LineItem::new(p, quantity)]);
            let err = store.ledger.apply(&owner(), &event).await.unwrap_err();
            assert_eq!(err, LedgerError::InvalidQuantity { product_id: p, quantity });
        }
        assert_eq!(stock_of(&store, p).await, 10);
        assert_eq!(count(&store, "stock_mutations").await, 0);
    }

    #[tokio::test]
    async fn unknown_product_aborts_the_whole_event() {
        let store = open_store(LedgerPolicy::default()).await;
        let p = product(&store, "P-1", 10).await;
        let ghost = ProductId::new(kasir_core::AggregateId::new());

        let event = StockEvent::new(
            ReferenceKind::Purchase,
            "po-7",
            vec![LineItem::new(p, 1), LineItem::new(ghost, 1)],
        );
        let err = store.ledger.apply(&owner(), &event).await.unwrap_err();
        assert_eq!(err, LedgerError::ProductNotFound(ghost));
        assert_eq!(stock_of(&store, p).await, 10);
        assert_eq!(count(&store, "stock_mutations").await, 0);
    }

    #[tokio::test]
    async fn negative_stock_is_refused_by_default() {
        let store = open_store(LedgerPolicy::default()).await;
        let p = product(&store, "P-1", 2).await;

        let event = StockEvent::new(ReferenceKind::Sale, "s-1", vec![LineItem::new(p, 3)]);
        let err = store.ledger.apply(&owner(), &event).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                product_id: p,
                available: 2,
                requested: 3
            }
        );
        assert_eq!(stock_of(&store, p).await, 2);

        let err = store
            .sales
            .complete_sale(&cashier(), cash_sale(&[(p, 3)], 3 * PRICE))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Ledger(LedgerError::InsufficientStock { .. })));
        assert_eq!(count(&store, "transactions").await, 0);
    }

    #[tokio::test]
    async fn negative_stock_is_recorded_when_allowed() {
        let store = open_store(LedgerPolicy::allow_negative_stock(true)).await;
        let p = product(&store, "P-1", 2).await;

        store
            .sales
            .complete_sale(&cashier(), cash_sale(&[(p, 3)], 3 * PRICE))
            .await
            .unwrap();
        assert_eq!(stock_of(&store, p).await, -1);
        assert!(store.verify_stock_consistency().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_and_duplicate_lines() {
        let store = open_store(LedgerPolicy::default()).await;
        let p = product(&store, "P-1", 10).await;

        let empty = StockEvent::new(ReferenceKind::Purchase, "po-empty", vec![]);
        let receipt = store.ledger.apply(&owner(), &empty).await.unwrap();
        assert!(receipt.mutations.is_empty());
        assert!(!receipt.replayed);

        let event = StockEvent::new(
            ReferenceKind::Purchase,
            "po-dup",
            vec![LineItem::new(p, 2), LineItem::new(p, 3)],
        );
        let receipt = store.ledger.apply(&owner(), &event).await.unwrap();
        assert_eq!(receipt.mutations.len(), 1);
        assert_eq!(receipt.mutations[0].quantity, 5);
        assert_eq!(stock_of(&store, p).await, 15);
    }

    #[tokio::test]
    async fn void_rules() {
        let store = open_store(LedgerPolicy::default()).await;
        let p = product(&store, "P-1", 10).await;
        let sale = store
            .sales
            .complete_sale(&cashier(), cash_sale(&[(p, 2)], 10_000))
            .await
            .unwrap();
        assert_eq!(sale.change_amount(), 2_000);

        let err = store.sales.void_sale(&cashier(), sale.id_typed()).await.unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::Unauthorized(_))));
        assert_eq!(stock_of(&store, p).await, 8);

        store.sales.void_sale(&owner(), sale.id_typed()).await.unwrap();
        let err = store.sales.void_sale(&owner(), sale.id_typed()).await.unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::Conflict(_))));
        assert_eq!(stock_of(&store, p).await, 10);

        let reloaded = store.sales.get_sale(sale.id_typed()).await.unwrap().unwrap();
        assert_eq!(reloaded.status(), SaleStatus::Void);
        assert_eq!(reloaded.lines().len(), 1);
    }

    #[tokio::test]
    async fn inactive_products_cannot_be_sold() {
        let store = open_store(LedgerPolicy::default()).await;
        let p = product(&store, "P-1", 10).await;
        store.catalog.toggle_active(p).await.unwrap();

        let err = store
            .sales
            .complete_sale(&cashier(), cash_sale(&[(p, 1)], PRICE))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::Validation(_))));
        assert_eq!(stock_of(&store, p).await, 10);
    }

    #[tokio::test]
    async fn paid_purchase_cannot_be_deleted() {
        let store = open_store(LedgerPolicy::default()).await;
        let p = product(&store, "P-1", 0).await;
        let purchase = store
            .purchasing
            .record_purchase(&owner(), purchase_of(&[(p, 4)], 1_000))
            .await
            .unwrap();
        assert_eq!(purchase.payment_status(), PaymentStatus::Partial);
        assert_eq!(count(&store, "purchase_payments").await, 1);

        let err = store
            .purchasing
            .delete_purchase(&owner(), purchase.id_typed())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::Conflict(_))));
        assert_eq!(stock_of(&store, p).await, 4);
    }

    #[tokio::test]
    async fn purchase_payments_settle_the_balance() {
        let store = open_store(LedgerPolicy::default()).await;
        let p = product(&store, "P-1", 0).await;
        let purchase = store
            .purchasing
            .record_purchase(&owner(), purchase_of(&[(p, 4)], 0))
            .await
            .unwrap();
        let id = purchase.id_typed();

        let partial = store.purchasing.record_payment(&owner(), id, 4_000).await.unwrap();
        assert_eq!(partial.payment_status(), PaymentStatus::Partial);
        assert_eq!(partial.remaining_amount(), 6_000);

        let err = store.purchasing.record_payment(&owner(), id, 6_001).await.unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::Validation(_))));

        let paid = store.purchasing.record_payment(&owner(), id, 6_000).await.unwrap();
        assert_eq!(paid.payment_status(), PaymentStatus::Paid);
        assert_eq!(count(&store, "purchase_payments").await, 2);

        let reloaded = store.purchasing.get_purchase(id).await.unwrap().unwrap();
        assert_eq!(reloaded.paid_amount(), 10_000);
    }

    #[tokio::test]
    async fn catalog_delete_guards() {
        let store = open_store(LedgerPolicy::default()).await;
        let drinks = store.catalog.create_category("Minuman", None).await.unwrap();

        let mut with_category = details("P-1");
        with_category.category_id = Some(drinks.id);
        let p = store
            .catalog
            .create_product(with_category, 10)
            .await
            .unwrap()
            .id_typed();

        let err = store.catalog.delete_category(drinks.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let sold = product(&store, "P-2", 10).await;
        store
            .sales
            .complete_sale(&cashier(), cash_sale(&[(sold, 1)], PRICE))
            .await
            .unwrap();
        let err = store.catalog.delete_product(sold).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        store.catalog.delete_product(p).await.unwrap();
        store.catalog.delete_category(drinks.id).await.unwrap();
        assert!(store.catalog.list_categories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn barcode_is_unique_and_low_stock_is_listed() {
        let store = open_store(LedgerPolicy::default()).await;
        let low = product(&store, "P-1", 3).await;
        product(&store, "P-2", 50).await;

        let err = store.catalog.create_product(details("P-1"), 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let listed: Vec<_> = store
            .catalog
            .list_low_stock()
            .await
            .unwrap()
            .iter()
            .map(|p| p.id_typed())
            .collect();
        assert_eq!(listed, vec![low]);

        let found = store.catalog.find_by_barcode(" P-1 ").await.unwrap().unwrap();
        assert_eq!(found.id_typed(), low);
    }

    #[tokio::test]
    async fn audit_reports_drift_from_direct_writes() {
        let store = open_store(LedgerPolicy::default()).await;
        let p = product(&store, "P-1", 10).await;

        sqlx::query("UPDATE products SET stock = 99 WHERE id = ?")
            .bind(p.to_string())
            .execute(store.pool())
            .await
            .unwrap();

        let drift = store.verify_stock_consistency().await.unwrap();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].cached, 99);
        assert_eq!(drift[0].replayed, 10);
    }

    #[tokio::test]
    async fn codes_continue_the_daily_sequence() {
        let store = open_store(LedgerPolicy::default()).await;
        let p = product(&store, "P-1", 10).await;
        let today = code::daily_prefix(TRANSACTION_CODE_PREFIX, Utc::now());
        seed_transaction_code(&store, &format!("{today}0041")).await;

        let first = store
            .sales
            .complete_sale(&cashier(), cash_sale(&[(p, 1)], PRICE))
            .await
            .unwrap();
        let second = store
            .sales
            .complete_sale(&cashier(), cash_sale(&[(p, 1)], PRICE))
            .await
            .unwrap();
        assert_eq!(first.code(), format!("{today}0042"));
        assert_eq!(second.code(), format!("{today}0043"));

        let po_today = code::daily_prefix(PURCHASE_CODE_PREFIX, Utc::now());
        let po = store
            .purchasing
            .record_purchase(&owner(), purchase_of(&[(p, 5)], 0))
            .await
            .unwrap();
        assert_eq!(po.code(), format!("{po_today}0001"));
    }

    #[tokio::test]
    async fn used_up_daily_codes_refuse_the_sale_cleanly() {
        let store = open_store(LedgerPolicy::default()).await;
        let p = product(&store, "P-1", 10).await;
        let today = code::daily_prefix(TRANSACTION_CODE_PREFIX, Utc::now());
        seed_transaction_code(&store, &format!("{today}9999")).await;

        let err = store
            .sales
            .complete_sale(&cashier(), cash_sale(&[(p, 1)], PRICE))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::Conflict(_))));
        assert_eq!(count(&store, "transactions").await, 1);
        assert_eq!(count(&store, "stock_mutations").await, 0);
        assert_eq!(stock_of(&store, p).await, 10);
    }

    #[tokio::test]
    async fn oversized_cart_quantities_are_refused() {
        let store = open_store(LedgerPolicy::allow_negative_stock(true)).await;
        let p = product(&store, "P-1", 10).await;

        let err = store
            .sales
            .complete_sale(&cashier(), cash_sale(&[(p, i64::MAX), (p, 1)], PRICE))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Ledger(LedgerError::InvalidQuantity { product_id, .. }) if product_id == p
        ));
        assert_eq!(count(&store, "transactions").await, 0);
        assert_eq!(stock_of(&store, p).await, 10);
    }
}
