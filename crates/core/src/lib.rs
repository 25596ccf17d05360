//! `kasir-core` — shared domain building blocks.
//!
//! Identifiers, the domain error model, the aggregate/entity/value-object
//! traits and the explicit [`Session`] that carries the acting user. Nothing in
//! here touches storage.

pub mod aggregate;
pub mod code;
pub mod entity;
pub mod error;
pub mod id;
pub mod session;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, UserId};
pub use session::{Role, Session};
pub use value_object::ValueObject;
