//! Decoding helpers shared by the repositories.
//!
//! Ids are stored as TEXT (hyphenated UUIDs), timestamps as TEXT via the sqlx
//! chrono codec, money and quantities as INTEGER.

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{Decode, Row, Sqlite, Type};

use kasir_core::{AggregateId, UserId};

use crate::error::StoreError;

pub(crate) fn column<'r, T>(row: &'r SqliteRow, table: &'static str, name: &str) -> Result<T, StoreError>
where
    T: Decode<'r, Sqlite> + Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::corrupt(table, format!("column {name}: {e}")))
}

pub(crate) fn aggregate_id(row: &SqliteRow, table: &'static str, name: &str) -> Result<AggregateId, StoreError> {
    let raw: String = column(row, table, name)?;
    AggregateId::from_str(&raw).map_err(|e| StoreError::corrupt(table, e))
}

pub(crate) fn optional_aggregate_id(
    row: &SqliteRow,
    table: &'static str,
    name: &str,
) -> Result<Option<AggregateId>, StoreError> {
    let raw: Option<String> = column(row, table, name)?;
    raw.map(|r| AggregateId::from_str(&r).map_err(|e| StoreError::corrupt(table, e)))
        .transpose()
}

pub(crate) fn user_id(row: &SqliteRow, table: &'static str, name: &str) -> Result<UserId, StoreError> {
    let raw: String = column(row, table, name)?;
    UserId::from_str(&raw).map_err(|e| StoreError::corrupt(table, e))
}

/// Parse a TEXT column holding one of the domain enums (`as_str` / `FromStr`).
pub(crate) fn parsed<T>(row: &SqliteRow, table: &'static str, name: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: ToString,
{
    let raw: String = column(row, table, name)?;
    raw.parse().map_err(|e: T::Err| StoreError::corrupt(table, e.to_string()))
}
