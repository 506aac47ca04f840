//! # Domain Errors
//!
//! Error types for business-rule violations.
//!
//! Domain errors are synchronous validation failures: they never mutate
//! state and are surfaced to callers (trader, arbitrator or operator) as
//! rejections. Transient infrastructure failures live in the application
//! layer's [`ProtocolError`](crate::application::error::ProtocolError).

use crate::domain::value_objects::enums::{OfferState, TradeRole};
use crate::domain::value_objects::trade_phase::{TradePhase, TradeState};
use thiserror::Error;

/// Business-rule violation in the trade protocol domain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Checked arithmetic failed.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// A price value was rejected.
    #[error("invalid price: {0}")]
    InvalidPrice(String),

    /// An amount or amount range was rejected.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// An offer violated a construction or lifecycle rule.
    #[error("invalid offer: {0}")]
    InvalidOffer(String),

    /// An offer-book state transition was rejected.
    #[error("invalid offer transition from {from} to {to}")]
    InvalidOfferTransition {
        /// Current offer state.
        from: OfferState,
        /// Rejected target state.
        to: OfferState,
    },

    /// A trade state transition was rejected.
    #[error("invalid state transition from {from} ({from_phase}) to {to} ({to_phase})")]
    InvalidStateTransition {
        /// Current trade state.
        from: TradeState,
        /// Phase of the current state.
        from_phase: TradePhase,
        /// Rejected target state.
        to: TradeState,
        /// Phase of the target state.
        to_phase: TradePhase,
    },

    /// A payout computation produced an illegal split.
    #[error("invalid payout: {0}")]
    InvalidPayout(String),

    /// A second, different deposit transaction was recorded for a role.
    #[error("deposit tx already recorded for {role}: {existing}")]
    DepositAlreadyRecorded {
        /// The role a deposit is already recorded for.
        role: TradeRole,
        /// The already recorded transaction id.
        existing: String,
    },

    /// A dispute result was submitted for an already closed dispute.
    #[error("dispute already closed for trade {0}")]
    DisputeAlreadyClosed(String),

    /// No open dispute exists where one is required.
    #[error("no open dispute for trade {0}")]
    NoOpenDispute(String),

    /// A failed trade could not be re-admitted to pending.
    #[error("unfail rejected: {0}")]
    UnfailRejected(String),

    /// Generic validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),
}

impl DomainError {
    /// Creates an invalid-state-transition error from the two states.
    #[must_use]
    pub fn invalid_transition(from: TradeState, to: TradeState) -> Self {
        Self::InvalidStateTransition {
            from,
            from_phase: from.phase(),
            to,
            to_phase: to.phase(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
