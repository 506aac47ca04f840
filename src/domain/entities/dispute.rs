//! # Dispute Entity
//!
//! Arbitrated resolution of a failed cooperative path.
//!
//! A [`Dispute`] is opened by one party against a live trade and assigned to
//! a resolution channel (arbitrator or refund agent). It is closed exactly
//! once with a [`DisputeResult`] carrying the winner and the final payout
//! amounts, which must satisfy the conservation rule checked by the
//! [`PayoutCalculator`](crate::application::services::payout_calculator).

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{
    Amount, DisputeChannel, DisputeReason, TradeId, TraderId, TraderPosition,
};
use serde::{Deserialize, Serialize};

/// The arbitrator's or refund agent's decision closing a dispute.
///
/// # Invariants
///
/// - For an arbitrator decision, `buyer_payout + seller_payout` equals the
///   total available escrow; for a refund agent it may be less, the
///   residual stays in the escrow
/// - Created once, closed once; never edited after close
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeResult {
    /// The disputed trade.
    pub trade_id: TradeId,
    /// The party who opened the dispute.
    pub opened_by: TraderId,
    /// The winning position.
    pub winner: TraderPosition,
    /// Why the dispute was opened.
    pub reason: DisputeReason,
    /// Final buyer payout.
    pub buyer_payout_amount: Amount,
    /// Final seller payout.
    pub seller_payout_amount: Amount,
    /// Free-form notes from the resolver.
    pub summary_notes: String,
    /// When the dispute was closed.
    pub closed_at: Timestamp,
}

/// Lifecycle state of a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeState {
    /// Awaiting resolution.
    Open,
    /// Resolved; result attached.
    Closed,
}

/// A dispute over a live trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    /// The disputed trade.
    trade_id: TradeId,
    /// The party who opened the dispute.
    opened_by: TraderId,
    /// The resolution channel.
    channel: DisputeChannel,
    /// Why the dispute was opened.
    reason: DisputeReason,
    /// Current state.
    state: DisputeState,
    /// The closing decision, once resolved.
    result: Option<DisputeResult>,
    /// When the dispute was opened.
    opened_at: Timestamp,
}

impl Dispute {
    /// Opens a new dispute.
    #[must_use]
    pub fn open(
        trade_id: TradeId,
        opened_by: TraderId,
        channel: DisputeChannel,
        reason: DisputeReason,
    ) -> Self {
        Self {
            trade_id,
            opened_by,
            channel,
            reason,
            state: DisputeState::Open,
            result: None,
            opened_at: Timestamp::now(),
        }
    }

    /// Closes the dispute with the resolver's decision.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::DisputeAlreadyClosed`] on a second close.
    pub fn close(&mut self, result: DisputeResult) -> DomainResult<()> {
        if self.state == DisputeState::Closed {
            return Err(DomainError::DisputeAlreadyClosed(
                self.trade_id.as_str().to_string(),
            ));
        }
        self.state = DisputeState::Closed;
        self.result = Some(result);
        Ok(())
    }

    /// Returns the disputed trade id.
    #[inline]
    #[must_use]
    pub fn trade_id(&self) -> &TradeId {
        &self.trade_id
    }

    /// Returns the opener.
    #[inline]
    #[must_use]
    pub fn opened_by(&self) -> &TraderId {
        &self.opened_by
    }

    /// Returns the resolution channel.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> DisputeChannel {
        self.channel
    }

    /// Returns the reason the dispute was opened.
    #[inline]
    #[must_use]
    pub fn reason(&self) -> DisputeReason {
        self.reason
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> DisputeState {
        self.state
    }

    /// Returns true if the dispute is still open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == DisputeState::Open
    }

    /// Returns the closing decision, if resolved.
    #[inline]
    #[must_use]
    pub fn result(&self) -> Option<&DisputeResult> {
        self.result.as_ref()
    }

    /// Returns when the dispute was opened.
    #[inline]
    #[must_use]
    pub fn opened_at(&self) -> Timestamp {
        self.opened_at
    }
}
