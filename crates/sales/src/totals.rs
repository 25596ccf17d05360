//! Checkout arithmetic.
//!
//! All amounts are integers in the smallest currency unit. Percentages round
//! half up to the nearest unit.

use serde::{Deserialize, Serialize};

use kasir_core::{DomainError, DomainResult, ValueObject};

use crate::transaction::SaleLine;

/// Discount applied to the whole cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Discount {
    #[default]
    None,
    /// Whole percent, 0..=100.
    Percent(i64),
    /// Fixed amount, at most the subtotal.
    Amount(i64),
}

impl ValueObject for Discount {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotals {
    pub subtotal: i64,
    pub discount_amount: i64,
    pub tax_amount: i64,
    pub total: i64,
}

impl ValueObject for SaleTotals {}

fn overflow() -> DomainError {
    DomainError::validation("amount overflow")
}

fn percent_of(amount: i64, percent: i64) -> DomainResult<i64> {
    let scaled = amount
        .checked_mul(percent)
        .and_then(|s| s.checked_add(50))
        .ok_or_else(overflow)?;
    Ok(scaled / 100)
}

/// Subtotal, discount, tax and total for a cart.
///
/// Tax is charged on the discounted subtotal.
pub fn compute_totals(lines: &[SaleLine], discount: Discount, tax_percent: i64) -> DomainResult<SaleTotals> {
    let mut subtotal: i64 = 0;
    for line in lines {
        subtotal = subtotal.checked_add(line.subtotal()?).ok_or_else(overflow)?;
    }

    let discount_amount = match discount {
        Discount::None => 0,
        Discount::Percent(p) => {
            if !(0..=100).contains(&p) {
                return Err(DomainError::validation("discount percent must be between 0 and 100"));
            }
            percent_of(subtotal, p)?
        }
        Discount::Amount(a) => {
            if a < 0 {
                return Err(DomainError::validation("discount amount cannot be negative"));
            }
            if a > subtotal {
                return Err(DomainError::validation("discount amount exceeds subtotal"));
            }
            a
        }
    };

    if !(0..=100).contains(&tax_percent) {
        return Err(DomainError::validation("tax percent must be between 0 and 100"));
    }
    let taxable = subtotal - discount_amount;
    let tax_amount = percent_of(taxable, tax_percent)?;

    Ok(SaleTotals {
        subtotal,
        discount_amount,
        tax_amount,
        total: taxable.checked_add(tax_amount).ok_or_else(overflow)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kasir_core::AggregateId;
    use kasir_products::ProductId;

    fn line(quantity: i64, unit_price: i64) -> SaleLine {
        SaleLine {
            product_id: ProductId::new(AggregateId::new()),
            product_name: "Indomie Goreng".to_string(),
            quantity,
            unit_price,
        }
    }

    #[test]
    fn plain_cart() {
        let totals = compute_totals(&[line(2, 3_500), line(1, 12_000)], Discount::None, 0).unwrap();
        assert_eq!(totals.subtotal, 19_000);
        assert_eq!(totals.total, 19_000);
    }

    #[test]
    fn percent_discount_then_tax_on_discounted_amount() {
        let totals = compute_totals(&[line(1, 100_000)], Discount::Percent(10), 11).unwrap();
        assert_eq!(totals.discount_amount, 10_000);
        assert_eq!(totals.tax_amount, 9_900);
        assert_eq!(totals.total, 99_900);
    }

    #[test]
    fn rounding_is_half_up() {
        // 5% of 1_010 = 50.5 -> 51
        let totals = compute_totals(&[line(1, 1_010)], Discount::Percent(5), 0).unwrap();
        assert_eq!(totals.discount_amount, 51);
    }

    #[test]
    fn amount_discount_cannot_exceed_subtotal() {
        let err = compute_totals(&[line(1, 1_000)], Discount::Amount(1_001), 0).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn rounding_overflow_is_an_error() {
        // i64::MAX - 49 passes the multiply at 1% but not the rounding add.
        let err = percent_of(i64::MAX - 49, 1).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(percent_of(1_010, 5).unwrap(), 51);
    }

    #[test]
    fn out_of_range_percentages_are_rejected() {
        assert!(compute_totals(&[line(1, 1_000)], Discount::Percent(101), 0).is_err());
        assert!(compute_totals(&[line(1, 1_000)], Discount::None, -1).is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: total = subtotal - discount + tax, and the discount never
            /// exceeds the subtotal.
            #[test]
            fn totals_are_consistent(
                cart in prop::collection::vec((1i64..20, 0i64..200_000), 1..8),
                discount_pct in 0i64..=100,
                tax_pct in 0i64..=100,
            ) {
                let lines: Vec<SaleLine> = cart.iter().map(|(q, p)| line(*q, *p)).collect();
                let t = compute_totals(&lines, Discount::Percent(discount_pct), tax_pct).unwrap();
                prop_assert!(t.discount_amount <= t.subtotal);
                prop_assert!(t.tax_amount >= 0);
                prop_assert_eq!(t.total, t.subtotal - t.discount_amount + t.tax_amount);
            }
        }
    }
}
