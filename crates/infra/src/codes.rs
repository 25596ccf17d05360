//! Per-day sequences behind transaction and purchase codes.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use kasir_core::code;

use crate::error::{map_sqlx_error, StoreError};

/// Tables whose rows carry a unique daily code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CodedTable {
    Transactions,
    Purchases,
}

impl CodedTable {
    fn max_sequence_sql(self) -> &'static str {
        match self {
            Self::Transactions => {
                "SELECT MAX(CAST(substr(code, ?) AS INTEGER)) FROM transactions WHERE code LIKE ?"
            }
            Self::Purchases => "SELECT MAX(CAST(substr(code, ?) AS INTEGER)) FROM purchases WHERE code LIKE ?",
        }
    }
}

/// The next unused `{prefix}-{YYYYMMDD}-{NNNN}` code for `at`'s day.
///
/// Must run on the connection of the transaction that inserts the row, so the
/// read and the insert see the same table.
pub(crate) async fn next_daily_code(
    conn: &mut SqliteConnection,
    table: CodedTable,
    prefix: &str,
    at: DateTime<Utc>,
) -> Result<String, StoreError> {
    let daily = code::daily_prefix(prefix, at);
    let last: Option<i64> = sqlx::query_scalar(table.max_sequence_sql())
        .bind(daily.len() as i64 + 1)
        .bind(format!("{daily}%"))
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("next_daily_code", e))?;

    // Anything that does not fit is past the four-digit range and refused below.
    let sequence = last
        .unwrap_or(0)
        .checked_add(1)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(u32::MAX);
    Ok(code::daily_code(prefix, at, sequence)?)
}
