//! # Trade Events
//!
//! Domain events emitted on trade lifecycle changes.
//!
//! Events are advisory: they are published *after* the corresponding state
//! change was persisted, and carry enough context for observers (UI,
//! notifications, metrics) without re-reading the trade.
//!
//! # Event Flow
//!
//! ```text
//! TradeCreated -> PhaseChanged* -> DepositPublished -> DepositsUnlocked
//!              -> PaymentStartedReceived -> PaymentReceivedReceived
//!              -> PayoutPublished -> PhaseChanged(COMPLETED)
//!              |
//!              +-> TradeFailed (from any non-terminal phase)
//!              +-> TradePeriodElapsed (advisory, any time after unlock)
//! ```

use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{
    Amount, EventId, FatalReason, TradeId, TradePeriodPhase, TradePhase, TradeRole, TradeState,
    TxId,
};
use serde::{Deserialize, Serialize};

/// Common metadata carried by every trade event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique identifier for this event.
    pub event_id: EventId,
    /// The trade this event relates to.
    pub trade_id: TradeId,
    /// When this event occurred.
    pub timestamp: Timestamp,
}

impl EventMetadata {
    /// Creates new event metadata with a generated event id.
    #[must_use]
    pub fn for_trade(trade_id: TradeId) -> Self {
        Self {
            event_id: EventId::new_v4(),
            trade_id,
            timestamp: Timestamp::now(),
        }
    }
}

/// A trade lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeEvent {
    /// A new trade was registered.
    TradeCreated {
        /// Event metadata.
        metadata: EventMetadata,
        /// The local party's role.
        role: TradeRole,
        /// The agreed trade amount.
        amount: Amount,
    },
    /// The trade advanced to a new phase.
    PhaseChanged {
        /// Event metadata.
        metadata: EventMetadata,
        /// The phase left behind.
        from: TradePhase,
        /// The phase entered.
        to: TradePhase,
        /// The fine-grained state entered.
        state: TradeState,
    },
    /// A party's deposit transaction was broadcast.
    DepositPublished {
        /// Event metadata.
        metadata: EventMetadata,
        /// Whose deposit it is.
        role: TradeRole,
        /// The deposit transaction.
        tx_id: TxId,
    },
    /// Both deposits reached their confirmation thresholds.
    DepositsUnlocked {
        /// Event metadata.
        metadata: EventMetadata,
        /// End of the trade period started by the unlock.
        max_trade_period_date: Timestamp,
    },
    /// The seller accepted a payment-started message.
    PaymentStartedReceived {
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// The buyer accepted a payment-received message.
    PaymentReceivedReceived {
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// The payout transaction was broadcast.
    PayoutPublished {
        /// Event metadata.
        metadata: EventMetadata,
        /// The payout transaction.
        tx_id: TxId,
        /// The buyer's share.
        buyer_payout: Amount,
        /// The seller's share.
        seller_payout: Amount,
    },
    /// The trade crossed a trade-period threshold (advisory).
    TradePeriodChanged {
        /// Event metadata.
        metadata: EventMetadata,
        /// The threshold crossed.
        period_phase: TradePeriodPhase,
    },
    /// The trade failed on a fatal condition.
    TradeFailed {
        /// Event metadata.
        metadata: EventMetadata,
        /// Why it failed.
        reason: FatalReason,
    },
}

impl TradeEvent {
    /// Returns the metadata common to all variants.
    #[must_use]
    pub fn metadata(&self) -> &EventMetadata {
        match self {
            Self::TradeCreated { metadata, .. }
            | Self::PhaseChanged { metadata, .. }
            | Self::DepositPublished { metadata, .. }
            | Self::DepositsUnlocked { metadata, .. }
            | Self::PaymentStartedReceived { metadata }
            | Self::PaymentReceivedReceived { metadata }
            | Self::PayoutPublished { metadata, .. }
            | Self::TradePeriodChanged { metadata, .. }
            | Self::TradeFailed { metadata, .. } => metadata,
        }
    }

    /// Returns the trade this event relates to.
    #[must_use]
    pub fn trade_id(&self) -> &TradeId {
        &self.metadata().trade_id
    }

    /// Returns the human-readable event name.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::TradeCreated { .. } => "TradeCreated",
            Self::PhaseChanged { .. } => "PhaseChanged",
            Self::DepositPublished { .. } => "DepositPublished",
            Self::DepositsUnlocked { .. } => "DepositsUnlocked",
            Self::PaymentStartedReceived { .. } => "PaymentStartedReceived",
            Self::PaymentReceivedReceived { .. } => "PaymentReceivedReceived",
            Self::PayoutPublished { .. } => "PayoutPublished",
            Self::TradePeriodChanged { .. } => "TradePeriodChanged",
            Self::TradeFailed { .. } => "TradeFailed",
        }
    }
}
