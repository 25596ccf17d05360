//! Product and category repository.
//!
//! Product stock is written only by the ledger; nothing here touches
//! `products.stock` after the initial insert.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, instrument, warn};

use kasir_core::{Aggregate, AggregateId};
use kasir_events::Event;
use kasir_products::{
    Category, CategoryId, CreateProduct, Product, ProductCommand, ProductDetails, ProductEvent, ProductId,
    ToggleActive, UpdateProduct,
};

use crate::error::{map_sqlx_error, StoreError};
use crate::rows;

const PRODUCT_COLUMNS: &str = "id, barcode, name, category_id, purchase_price, selling_price, \
     stock, initial_stock, min_stock, unit, is_active";

#[derive(Debug, Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, description), err)]
    pub async fn create_category(&self, name: &str, description: Option<&str>) -> Result<Category, StoreError> {
        let category = Category::new(CategoryId::new(AggregateId::new()), name, description, Utc::now())?;

        sqlx::query("INSERT INTO categories (id, name, description, created_at) VALUES (?, ?, ?, ?)")
            .bind(category.id.to_string())
            .bind(&category.name)
            .bind(&category.description)
            .bind(category.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_category", e))?;

        info!(category_id = %category.id, name = %category.name, "category created");
        Ok(category)
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows = sqlx::query("SELECT id, name, description, created_at FROM categories ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_categories", e))?;

        rows.iter()
            .map(|row| -> Result<Category, StoreError> {
                Ok(Category {
                    id: CategoryId::new(rows::aggregate_id(row, "categories", "id")?),
                    name: rows::column(row, "categories", "name")?,
                    description: rows::column(row, "categories", "description")?,
                    created_at: rows::column(row, "categories", "created_at")?,
                })
            })
            .collect()
    }

    /// Refused while any product still references the category.
    #[instrument(skip(self), fields(category_id = %category_id), err)]
    pub async fn delete_category(&self, category_id: CategoryId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let in_use: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE category_id = ?")
            .bind(category_id.to_string())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("count_category_products", e))?;
        if in_use > 0 {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            warn!(%category_id, products = in_use, "category still in use");
            return Err(StoreError::Conflict(format!(
                "category {category_id} is used by {in_use} product(s)"
            )));
        }

        let deleted = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(category_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_category", e))?
            .rows_affected();
        if deleted == 0 {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::NotFound(format!("category {category_id}")));
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }

    /// Insert a new product. Its cached stock starts at `initial_stock`.
    #[instrument(skip(self, details), fields(barcode = %details.barcode), err)]
    pub async fn create_product(&self, details: ProductDetails, initial_stock: i64) -> Result<Product, StoreError> {
        let product_id = ProductId::new(AggregateId::new());
        let mut product = Product::empty(product_id);
        let events = product.handle(&ProductCommand::CreateProduct(CreateProduct {
            product_id,
            details,
            initial_stock,
            occurred_at: Utc::now(),
        }))?;

        for event in &events {
            debug!(
                event_type = event.event_type(),
                version = event.version(),
                occurred_at = %event.occurred_at(),
                "persisting product event"
            );
            if let ProductEvent::ProductCreated(e) = event {
                let d = &e.details;
                sqlx::query(
                    r#"
                    INSERT INTO products (
                        id, barcode, name, category_id, purchase_price, selling_price,
                        stock, initial_stock, min_stock, unit, is_active, created_at, updated_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
                    "#,
                )
                .bind(product_id.to_string())
                .bind(&d.barcode)
                .bind(&d.name)
                .bind(d.category_id.map(|c| c.to_string()))
                .bind(d.purchase_price)
                .bind(d.selling_price)
                .bind(e.initial_stock)
                .bind(e.initial_stock)
                .bind(d.min_stock)
                .bind(&d.unit)
                .bind(e.occurred_at)
                .bind(e.occurred_at)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("create_product", e))?;
            }
            product.apply(event);
        }

        info!(product_id = %product_id, "product created");
        Ok(product)
    }

    /// Update catalog fields. Stock is untouched.
    #[instrument(skip(self, details), fields(product_id = %product_id), err)]
    pub async fn update_product(&self, product_id: ProductId, details: ProductDetails) -> Result<Product, StoreError> {
        let mut product = self.require_product(product_id).await?;
        let events = product.handle(&ProductCommand::UpdateProduct(UpdateProduct {
            product_id,
            details,
            occurred_at: Utc::now(),
        }))?;

        for event in &events {
            debug!(
                event_type = event.event_type(),
                version = event.version(),
                occurred_at = %event.occurred_at(),
                "persisting product event"
            );
            if let ProductEvent::ProductUpdated(e) = event {
                let d = &e.details;
                sqlx::query(
                    r#"
                    UPDATE products
                    SET barcode = ?, name = ?, category_id = ?, purchase_price = ?,
                        selling_price = ?, min_stock = ?, unit = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&d.barcode)
                .bind(&d.name)
                .bind(d.category_id.map(|c| c.to_string()))
                .bind(d.purchase_price)
                .bind(d.selling_price)
                .bind(d.min_stock)
                .bind(&d.unit)
                .bind(e.occurred_at)
                .bind(product_id.to_string())
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("update_product", e))?;
            }
            product.apply(event);
        }
        Ok(product)
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn toggle_active(&self, product_id: ProductId) -> Result<Product, StoreError> {
        let mut product = self.require_product(product_id).await?;
        let events = product.handle(&ProductCommand::ToggleActive(ToggleActive {
            product_id,
            occurred_at: Utc::now(),
        }))?;

        for event in &events {
            debug!(
                event_type = event.event_type(),
                version = event.version(),
                occurred_at = %event.occurred_at(),
                "persisting product event"
            );
            if let ProductEvent::ProductStatusChanged(e) = event {
                sqlx::query("UPDATE products SET is_active = ?, updated_at = ? WHERE id = ?")
                    .bind(e.is_active)
                    .bind(e.occurred_at)
                    .bind(product_id.to_string())
                    .execute(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("toggle_active", e))?;
            }
            product.apply(event);
        }
        Ok(product)
    }

    /// Refused while any stock mutation references the product; the audit
    /// trail is never orphaned.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn delete_product(&self, product_id: ProductId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let referenced: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_mutations WHERE product_id = ?")
            .bind(product_id.to_string())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("count_product_mutations", e))?;
        if referenced > 0 {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            warn!(%product_id, mutations = referenced, "product has stock history");
            return Err(StoreError::Conflict(format!(
                "product {product_id} has {referenced} stock mutation(s)"
            )));
        }

        let deleted = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(product_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?
            .rows_affected();
        if deleted == 0 {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::NotFound(format!("product {product_id}")));
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }

    pub async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("acquire", e))?;
        load_product(&mut conn, product_id).await
    }

    pub async fn find_by_barcode(&self, barcode: &str) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE barcode = ?"))
            .bind(barcode.trim())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_barcode", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;
        rows.iter().map(product_from_row).collect()
    }

    /// Active products whose stock status is `low` or `out`, lowest stock first.
    pub async fn list_low_stock(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE is_active = 1 AND (stock <= 0 OR stock < min_stock) ORDER BY stock ASC, name ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_low_stock", e))?;

        let products = rows.iter().map(product_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(products
            .into_iter()
            .filter(|p| p.stock_status().needs_restock())
            .collect())
    }

    async fn require_product(&self, product_id: ProductId) -> Result<Product, StoreError> {
        self.get_product(product_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("product {product_id}")))
    }
}

pub(crate) async fn load_product(
    conn: &mut SqliteConnection,
    product_id: ProductId,
) -> Result<Option<Product>, StoreError> {
    let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"))
        .bind(product_id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load_product", e))?;
    row.as_ref().map(product_from_row).transpose()
}

fn product_from_row(row: &SqliteRow) -> Result<Product, StoreError> {
    const TABLE: &str = "products";
    let details = ProductDetails {
        barcode: rows::column(row, TABLE, "barcode")?,
        name: rows::column(row, TABLE, "name")?,
        category_id: rows::optional_aggregate_id(row, TABLE, "category_id")?.map(CategoryId::new),
        purchase_price: rows::column(row, TABLE, "purchase_price")?,
        selling_price: rows::column(row, TABLE, "selling_price")?,
        min_stock: rows::column(row, TABLE, "min_stock")?,
        unit: rows::column(row, TABLE, "unit")?,
    };
    Ok(Product::restore(
        ProductId::new(rows::aggregate_id(row, TABLE, "id")?),
        details,
        rows::column(row, TABLE, "initial_stock")?,
        rows::column(row, TABLE, "stock")?,
        rows::column(row, TABLE, "is_active")?,
    ))
}
