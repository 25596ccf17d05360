//! Aggregate traits for the POS domain models (products, sales, purchases).

/// Aggregate root marker + minimal interface.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Number of events applied to this instance since it was rehydrated.
    fn version(&self) -> u64;
}

/// Decision/evolution split used by every business aggregate.
///
/// - `handle(&self, cmd)` validates a command against current state and returns
///   the events describing what happened.
/// - `apply(&mut self, event)` evolves in-memory state.
///
/// Aggregates never perform IO. The infrastructure layer persists the emitted
/// events as row writes (and stock ledger applications) inside one storage
/// transaction.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Evolve in-memory state from a single event.
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit given the current state and a command.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
