//! Human-readable business codes (`TRX-20260131-0042`, `PO-20260131-0007`).
//!
//! Codes are shown on receipts and purchase lists. The trailing number is a
//! per-day sequence starting at `0001`; the storage layer hands out the next
//! one inside the transaction that inserts the record.

use chrono::{DateTime, Utc};

use crate::error::DomainError;

/// Highest sequence number a four-digit suffix can hold.
pub const MAX_DAILY_SEQUENCE: u32 = 9_999;

/// `{prefix}-{YYYYMMDD}-`, the part shared by every code of one business day.
pub fn daily_prefix(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}-", prefix, at.format("%Y%m%d"))
}

/// The `sequence`-th code of the day, `{prefix}-{YYYYMMDD}-{NNNN}`.
///
/// Fails with a conflict once the day's sequence is used up.
pub fn daily_code(prefix: &str, at: DateTime<Utc>, sequence: u32) -> Result<String, DomainError> {
    if sequence == 0 || sequence > MAX_DAILY_SEQUENCE {
        return Err(DomainError::conflict(format!(
            "{prefix} codes for {} are used up",
            at.format("%Y-%m-%d")
        )));
    }
    Ok(format!("{}{:04}", daily_prefix(prefix, at), sequence))
}

/// Check that `code` has the `{prefix}-{8 digits}-{4 digits}` shape.
pub fn validate(prefix: &str, code: &str) -> Result<(), DomainError> {
    let malformed = || DomainError::validation(format!("malformed {prefix} code: {code}"));

    let rest = code
        .strip_prefix(prefix)
        .and_then(|r| r.strip_prefix('-'))
        .ok_or_else(malformed)?;
    let (date, suffix) = rest.split_once('-').ok_or_else(malformed)?;

    let all_digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(date, 8) || !all_digits(suffix, 4) {
        return Err(malformed());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn daily_codes_validate() {
        let at = Utc.with_ymd_and_hms(2026, 1, 31, 10, 0, 0).unwrap();
        assert_eq!(daily_prefix("TRX", at), "TRX-20260131-");
        let code = daily_code("TRX", at, 42).unwrap();
        assert_eq!(code, "TRX-20260131-0042");
        validate("TRX", &code).unwrap();
    }

    #[test]
    fn sequence_outside_four_digits_is_refused() {
        let at = Utc.with_ymd_and_hms(2026, 1, 31, 10, 0, 0).unwrap();
        assert_eq!(daily_code("PO", at, MAX_DAILY_SEQUENCE).unwrap(), "PO-20260131-9999");
        assert!(matches!(daily_code("PO", at, MAX_DAILY_SEQUENCE + 1), Err(DomainError::Conflict(_))));
        assert!(daily_code("PO", at, 0).is_err());
    }

    #[test]
    fn validate_rejects_wrong_prefix_and_shape() {
        assert!(validate("PO", "TRX-20260131-0001").is_err());
        assert!(validate("PO", "PO-2026013-0001").is_err());
        assert!(validate("PO", "PO-20260131-01").is_err());
        assert!(validate("PO", "PO-20260131-00a1").is_err());
        assert!(validate("PO", "PO-20260131-0001").is_ok());
    }
}
