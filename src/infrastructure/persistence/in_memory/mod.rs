//! In-memory repository implementations.

pub mod offer_repository;
pub mod trade_repository;

pub use offer_repository::InMemoryOfferRepository;
pub use trade_repository::InMemoryTradeRepository;
