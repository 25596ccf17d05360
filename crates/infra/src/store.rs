use sqlx::SqlitePool;

use kasir_inventory::{LedgerPolicy, StockDrift};

use crate::audit;
use crate::catalog::Catalog;
use crate::config::StoreConfig;
use crate::db;
use crate::error::StoreError;
use crate::ledger::SqliteStockLedger;
use crate::purchasing::PurchaseService;
use crate::sales::SalesService;

/// All repositories and services over one pool and one ledger policy.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
    pub ledger: SqliteStockLedger,
    pub catalog: Catalog,
    pub sales: SalesService,
    pub purchasing: PurchaseService,
}

impl Store {
    /// Connect and bring the schema up to date.
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let pool = db::connect(config).await?;
        db::migrate(&pool).await?;
        Ok(Self::from_pool(pool, config.policy))
    }

    pub fn from_pool(pool: SqlitePool, policy: LedgerPolicy) -> Self {
        let ledger = SqliteStockLedger::new(pool.clone(), policy);
        Self {
            catalog: Catalog::new(pool.clone()),
            sales: SalesService::new(pool.clone(), ledger.clone()),
            purchasing: PurchaseService::new(pool.clone(), ledger.clone()),
            ledger,
            pool,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn verify_stock_consistency(&self) -> Result<Vec<StockDrift>, StoreError> {
        audit::verify_stock_consistency(&self.pool).await
    }
}
