//! Value object marker: equality by value, not identity.

/// Marker trait for immutable values compared by their attributes
/// (line items, money breakdowns, discounts).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
