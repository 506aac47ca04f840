//! # Repository Traits
//!
//! Port definitions for persistence abstraction.
//!
//! Trades and offers are persisted after every state change, before any
//! externally observable message is sent. Implementations can use
//! different backends; the in-memory ones back the test suite.
//!
//! # Available Repositories
//!
//! - [`TradeRepository`]: Persistence for trade aggregates
//! - [`OfferRepository`]: Persistence for offers

use crate::domain::entities::offer::Offer;
use crate::domain::entities::trade::Trade;
use crate::domain::value_objects::{OfferId, TradeId};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Error type for repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Entity not found.
    #[error("entity not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of entity.
        entity_type: &'static str,
        /// Entity identifier.
        id: String,
    },

    /// Duplicate entity.
    #[error("duplicate entity: {entity_type} with id {id} already exists")]
    Duplicate {
        /// Type of entity.
        entity_type: &'static str,
        /// Entity identifier.
        id: String,
    },

    /// Optimistic locking conflict.
    #[error("version conflict: {entity_type} with id {id} has been modified")]
    VersionConflict {
        /// Type of entity.
        entity_type: &'static str,
        /// Entity identifier.
        id: String,
        /// Expected version.
        expected: u64,
        /// Actual version.
        actual: u64,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RepositoryError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a duplicate error.
    #[must_use]
    pub fn duplicate(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::Duplicate {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a version conflict error.
    #[must_use]
    pub fn version_conflict(
        entity_type: &'static str,
        id: impl Into<String>,
        expected: u64,
        actual: u64,
    ) -> Self {
        Self::VersionConflict {
            entity_type,
            id: id.into(),
            expected,
            actual,
        }
    }

    /// Creates a storage error.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Returns true if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is a version conflict.
    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Repository for trade aggregates.
///
/// # Examples
///
/// ```ignore
/// use escrow_engine::infrastructure::persistence::traits::TradeRepository;
///
/// async fn active_trades(repo: &impl TradeRepository) {
///     let pending = repo.find_active().await.unwrap();
///     println!("{} trades in flight", pending.len());
/// }
/// ```
#[async_trait]
pub trait TradeRepository: Send + Sync + fmt::Debug {
    /// Saves a trade, inserting or updating.
    async fn save(&self, trade: &Trade) -> RepositoryResult<()>;

    /// Gets a trade by id.
    ///
    /// Returns `None` if the trade does not exist.
    async fn get(&self, id: &TradeId) -> RepositoryResult<Option<Trade>>;

    /// Finds all non-terminal trades (the pending collection).
    async fn find_active(&self) -> RepositoryResult<Vec<Trade>>;

    /// Finds all failed trades.
    async fn find_failed(&self) -> RepositoryResult<Vec<Trade>>;

    /// Deletes a trade by id.
    ///
    /// Returns `Ok(true)` if the trade was deleted, `Ok(false)` if it
    /// didn't exist.
    async fn delete(&self, id: &TradeId) -> RepositoryResult<bool>;

    /// Counts all trades.
    async fn count(&self) -> RepositoryResult<u64>;
}

/// Repository for offers.
#[async_trait]
pub trait OfferRepository: Send + Sync + fmt::Debug {
    /// Saves an offer, inserting or updating.
    async fn save(&self, offer: &Offer) -> RepositoryResult<()>;

    /// Gets an offer by id.
    ///
    /// Returns `None` if the offer does not exist.
    async fn get(&self, id: &OfferId) -> RepositoryResult<Option<Offer>>;

    /// Finds all offers currently available to take.
    async fn find_available(&self) -> RepositoryResult<Vec<Offer>>;

    /// Deletes an offer by id.
    ///
    /// Returns `Ok(true)` if the offer was deleted, `Ok(false)` if it
    /// didn't exist.
    async fn delete(&self, id: &OfferId) -> RepositoryResult<bool>;
}
