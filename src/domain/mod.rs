//! # Domain Layer
//!
//! Pure business logic: value objects, entities, domain events and domain
//! errors. Nothing in this layer performs IO or depends on the application
//! or infrastructure layers.

pub mod entities;
pub mod errors;
pub mod events;
pub mod value_objects;

pub use errors::{DomainError, DomainResult};
