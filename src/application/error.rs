//! # Application Errors
//!
//! Error taxonomy for protocol execution.
//!
//! Every failure is classified before it is handled:
//!
//! ```text
//! ProtocolError
//! ├── Transient            - Retry with backoff; never fails the trade
//! ├── ProtocolViolation    - Drop the input; the trade stays where it was
//! ├── Fatal(FatalReason)   - Move the trade to the failed collection
//! ├── Domain(DomainError)  - Business rule violation (validation class)
//! ├── Repository/Wallet/Transport/Signing - wrapped port errors
//! └── ... (lookup and command errors)
//! ```
//!
//! A transient error that exhausts its retry budget surfaces as
//! [`ProtocolError::ManualInterventionRequired`], it still does not fail
//! the trade.

use crate::domain::errors::DomainError;
use crate::domain::value_objects::{FatalReason, TradeId};
use crate::infrastructure::persistence::RepositoryError;
use crate::infrastructure::transport::client::TransportError;
use crate::infrastructure::transport::signing::SigningError;
use crate::infrastructure::wallet::client::WalletError;
use thiserror::Error;

/// Application layer error.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Recoverable failure; retry, never fail the trade.
    #[error("transient failure in {operation} (attempt {attempts}): {message}")]
    Transient {
        /// The operation that failed.
        operation: String,
        /// What went wrong.
        message: String,
        /// How many attempts were made.
        attempts: u32,
    },

    /// Counterparty misbehavior; the offending input is dropped.
    #[error("protocol violation on trade {trade_id}: {reason}")]
    ProtocolViolation {
        /// The trade the input claimed to belong to.
        trade_id: TradeId,
        /// What was wrong with it.
        reason: String,
    },

    /// Unrecoverable condition; the trade moves to the failed collection.
    #[error("fatal: {0}")]
    Fatal(FatalReason),

    /// Retry budget exhausted; an operator must look at the trade.
    #[error("manual intervention required for trade {trade_id} in {operation}: {message}")]
    ManualInterventionRequired {
        /// The trade needing attention.
        trade_id: TradeId,
        /// The operation that gave up.
        operation: String,
        /// The last failure seen.
        message: String,
    },

    /// Business rule violation.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// Persistence failure.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Wallet failure.
    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    /// Transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Signing failure.
    #[error("signing error: {0}")]
    Signing(#[from] SigningError),

    /// Trade not found.
    #[error("trade not found: {0}")]
    TradeNotFound(String),

    /// Offer not found.
    #[error("offer not found: {0}")]
    OfferNotFound(String),

    /// Command rejected in the trade's current state.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl ProtocolError {
    /// Creates a transient error.
    #[must_use]
    pub fn transient(
        operation: impl Into<String>,
        message: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self::Transient {
            operation: operation.into(),
            message: message.into(),
            attempts,
        }
    }

    /// Creates a protocol violation.
    #[must_use]
    pub fn violation(trade_id: TradeId, reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            trade_id,
            reason: reason.into(),
        }
    }

    /// Creates a manual intervention error.
    #[must_use]
    pub fn manual_intervention(
        trade_id: TradeId,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ManualInterventionRequired {
            trade_id,
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a trade not found error.
    #[must_use]
    pub fn trade_not_found(id: impl Into<String>) -> Self {
        Self::TradeNotFound(id.into())
    }

    /// Creates an offer not found error.
    #[must_use]
    pub fn offer_not_found(id: impl Into<String>) -> Self {
        Self::OfferNotFound(id.into())
    }

    /// Creates an invalid command error.
    #[must_use]
    pub fn invalid_command(message: impl Into<String>) -> Self {
        Self::InvalidCommand(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transient { .. } => true,
            Self::Wallet(e) => e.is_retryable(),
            Self::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns true if this error must fail the trade.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Returns true if this is a counterparty protocol violation.
    #[must_use]
    pub fn is_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation { .. })
    }
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
