//! # Persistence Layer
//!
//! Repository traits (ports) and implementations.
//!
//! ## Repository Traits
//!
//! - [`TradeRepository`]: Persistence for trade aggregates
//! - [`OfferRepository`]: Persistence for offers
//!
//! ## Implementations
//!
//! - `in_memory`: Thread-safe in-memory implementations

pub mod in_memory;
pub mod traits;

pub use traits::{OfferRepository, RepositoryError, RepositoryResult, TradeRepository};
