use serde::{Deserialize, Serialize};

/// Stock level classification shown next to each product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    /// Nothing left to sell (zero, or negative when the ledger policy allows it).
    Out,
    /// Below the product's minimum-stock threshold.
    Low,
    Safe,
}

impl StockStatus {
    pub fn classify(stock: i64, min_stock: i64) -> Self {
        if stock <= 0 {
            StockStatus::Out
        } else if stock < min_stock {
            StockStatus::Low
        } else {
            StockStatus::Safe
        }
    }

    pub fn needs_restock(&self) -> bool {
        !matches!(self, StockStatus::Safe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_thresholds() {
        assert_eq!(StockStatus::classify(0, 5), StockStatus::Out);
        assert_eq!(StockStatus::classify(-2, 5), StockStatus::Out);
        assert_eq!(StockStatus::classify(4, 5), StockStatus::Low);
        assert_eq!(StockStatus::classify(5, 5), StockStatus::Safe);
        assert_eq!(StockStatus::classify(1, 0), StockStatus::Safe);
    }

    #[test]
    fn low_and_out_need_restock() {
        assert!(StockStatus::Out.needs_restock());
        assert!(StockStatus::Low.needs_restock());
        assert!(!StockStatus::Safe.needs_restock());
    }
}
