//! Entity trait: identity that survives state changes.

/// Entity marker + minimal interface.
///
/// Implemented by records that are looked up by id but are not aggregates,
/// such as stock mutation audit rows.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
