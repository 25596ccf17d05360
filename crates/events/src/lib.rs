//! Domain events emitted by the POS aggregates.

pub mod event;

pub use event::Event;
