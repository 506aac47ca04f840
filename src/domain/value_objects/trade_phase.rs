//! # Trade Phase and State
//!
//! Trade lifecycle state machine.
//!
//! The lifecycle is a pair: [`TradePhase`] is the coarse, externally visible
//! stage, [`TradeState`] the fine-grained protocol step used for idempotent
//! retry. Every state maps to exactly one phase via
//! [`TradeState::phase`], and a state transition is legal only when its
//! phase stays put (message-delivery refinement) or advances by exactly one
//! stage; `Failed` is reachable from anywhere.
//!
//! # State Machine
//!
//! ```text
//! Init → DepositPublished → DepositsUnlocked → PaymentSent → PaymentReceived → Completed
//!   ↓            ↓                  ↓               ↓               ↓
//!   └────────────┴──────────────────┴───────────────┴───────────────┴→ Failed
//! ```
//!
//! Buyer and seller observe different states for the same phase: the buyer
//! enters `PaymentSent` through its own send/ack states, the seller through
//! [`TradeState::SellerReceivedPaymentSentMsg`].
//!
//! # Examples
//!
//! ```
//! use escrow_engine::domain::value_objects::trade_phase::{TradePhase, TradeState};
//!
//! let state = TradeState::DepositTxsUnlockedInBlockchain;
//! assert_eq!(state.phase(), TradePhase::DepositsUnlocked);
//! assert!(state.can_transition_to(TradeState::SellerReceivedPaymentSentMsg));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse lifecycle stage of a trade.
///
/// Phases form a total order and advance one stage at a time; the only
/// permitted jump is onto the orthogonal terminal [`Failed`](Self::Failed)
/// branch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum TradePhase {
    /// Offer has been taken; contract and deposit negotiation in progress.
    #[default]
    Init = 0,
    /// Deposit transactions broadcast to the network.
    DepositPublished = 1,
    /// Deposit transactions confirmed; escrow is live.
    DepositsUnlocked = 2,
    /// Buyer asserted the off-chain payment was started.
    PaymentSent = 3,
    /// Seller asserted the off-chain payment arrived.
    PaymentReceived = 4,
    /// Payout transaction published; trade done (terminal).
    Completed = 5,
    /// Trade moved to the failed collection (terminal).
    Failed = 6,
}

impl TradePhase {
    /// Returns true if this is a terminal phase.
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the next phase in the cooperative path, if any.
    #[must_use]
    pub const fn next(&self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::DepositPublished),
            Self::DepositPublished => Some(Self::DepositsUnlocked),
            Self::DepositsUnlocked => Some(Self::PaymentSent),
            Self::PaymentSent => Some(Self::PaymentReceived),
            Self::PaymentReceived => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    /// Returns true if this phase can advance to the target.
    ///
    /// Legal moves are staying put, advancing exactly one stage, or jumping
    /// to [`Failed`](Self::Failed) from any non-terminal phase.
    #[must_use]
    pub fn can_advance_to(&self, target: Self) -> bool {
        if *self == target {
            return true;
        }
        if target == Self::Failed {
            return !self.is_terminal();
        }
        match self.next() {
            Some(next) => next == target,
            None => false,
        }
    }

    /// Returns the numeric value of this phase.
    #[inline]
    #[must_use]
    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for TradePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "INIT",
            Self::DepositPublished => "DEPOSIT_PUBLISHED",
            Self::DepositsUnlocked => "DEPOSITS_UNLOCKED",
            Self::PaymentSent => "PAYMENT_SENT",
            Self::PaymentReceived => "PAYMENT_RECEIVED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// Error returned when converting an invalid u8 to a [`TradePhase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTradePhaseError(
    /// The invalid u8 value.
    pub u8,
);

impl fmt::Display for InvalidTradePhaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid trade phase value: {}", self.0)
    }
}

impl std::error::Error for InvalidTradePhaseError {}

impl TryFrom<u8> for TradePhase {
    type Error = InvalidTradePhaseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Init),
            1 => Ok(Self::DepositPublished),
            2 => Ok(Self::DepositsUnlocked),
            3 => Ok(Self::PaymentSent),
            4 => Ok(Self::PaymentReceived),
            5 => Ok(Self::Completed),
            6 => Ok(Self::Failed),
            _ => Err(InvalidTradePhaseError(value)),
        }
    }
}

/// Fine-grained protocol step of a trade.
///
/// States refine their phase with each party's view of message delivery:
/// `Sent` means handed to the transport, `SawArrived` means the delivery was
/// acknowledged, `StoredInMailbox` means the transport fell back to
/// store-and-forward, `SendFailed` means the send errored and a resend timer
/// is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum TradeState {
    // --- Init ---
    /// Trade object created from a take-offer request.
    #[default]
    Initialized = 0,
    /// Both parties signed the contract.
    ContractSigned = 1,

    // --- DepositPublished ---
    /// Deposit transactions broadcast.
    DepositTxsPublished = 2,

    // --- DepositsUnlocked ---
    /// Deposit transactions reached the required confirmation count.
    DepositTxsUnlockedInBlockchain = 3,

    // --- PaymentSent (buyer view) ---
    /// Buyer handed the payment-started message to the transport.
    BuyerSentPaymentSentMsg = 4,
    /// Buyer received the delivery acknowledgement.
    BuyerSawArrivedPaymentSentMsg = 5,
    /// Transport stored the payment-started message in the peer's mailbox.
    BuyerStoredInMailboxPaymentSentMsg = 6,
    /// Sending the payment-started message failed; resend armed.
    BuyerSendFailedPaymentSentMsg = 7,

    // --- PaymentSent (seller view) ---
    /// Seller received and accepted the payment-started message.
    SellerReceivedPaymentSentMsg = 8,

    // --- PaymentReceived (seller view) ---
    /// Seller handed the payment-received message to the transport.
    SellerSentPaymentReceivedMsg = 9,
    /// Seller received the delivery acknowledgement.
    SellerSawArrivedPaymentReceivedMsg = 10,
    /// Transport stored the payment-received message in the peer's mailbox.
    SellerStoredInMailboxPaymentReceivedMsg = 11,
    /// Sending the payment-received message failed; resend armed.
    SellerSendFailedPaymentReceivedMsg = 12,

    // --- PaymentReceived (buyer view) ---
    /// Buyer received and accepted the payment-received message.
    BuyerReceivedPaymentReceivedMsg = 13,
    /// Payout transaction broadcast.
    PayoutTxPublished = 14,

    // --- Completed ---
    /// Payout settled; trade moved to the completed collection.
    TradeCompleted = 15,

    // --- Failed ---
    /// Trade moved to the failed collection.
    Failed = 16,
}

impl TradeState {
    /// Returns the phase this state belongs to.
    #[must_use]
    pub const fn phase(&self) -> TradePhase {
        match self {
            Self::Initialized | Self::ContractSigned => TradePhase::Init,
            Self::DepositTxsPublished => TradePhase::DepositPublished,
            Self::DepositTxsUnlockedInBlockchain => TradePhase::DepositsUnlocked,
            Self::BuyerSentPaymentSentMsg
            | Self::BuyerSawArrivedPaymentSentMsg
            | Self::BuyerStoredInMailboxPaymentSentMsg
            | Self::BuyerSendFailedPaymentSentMsg
            | Self::SellerReceivedPaymentSentMsg => TradePhase::PaymentSent,
            Self::SellerSentPaymentReceivedMsg
            | Self::SellerSawArrivedPaymentReceivedMsg
            | Self::SellerStoredInMailboxPaymentReceivedMsg
            | Self::SellerSendFailedPaymentReceivedMsg
            | Self::BuyerReceivedPaymentReceivedMsg
            | Self::PayoutTxPublished => TradePhase::PaymentReceived,
            Self::TradeCompleted => TradePhase::Completed,
            Self::Failed => TradePhase::Failed,
        }
    }

    /// Returns true if this is a terminal state.
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.phase().is_terminal()
    }

    /// Returns true if this state can transition to the target.
    ///
    /// A transition is legal when the target's phase equals the current
    /// phase (refinement of message-delivery bookkeeping), advances exactly
    /// one stage, or is [`TradeState::Failed`] from any non-terminal state.
    /// Self-transitions are not transitions; replay no-ops are handled by
    /// the trade aggregate.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        if *self == target {
            return false;
        }
        self.phase().can_advance_to(target.phase())
    }

    /// Returns the numeric value of this state.
    #[inline]
    #[must_use]
    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initialized => "INITIALIZED",
            Self::ContractSigned => "CONTRACT_SIGNED",
            Self::DepositTxsPublished => "DEPOSIT_TXS_PUBLISHED",
            Self::DepositTxsUnlockedInBlockchain => "DEPOSIT_TXS_UNLOCKED_IN_BLOCKCHAIN",
            Self::BuyerSentPaymentSentMsg => "BUYER_SENT_PAYMENT_SENT_MSG",
            Self::BuyerSawArrivedPaymentSentMsg => "BUYER_SAW_ARRIVED_PAYMENT_SENT_MSG",
            Self::BuyerStoredInMailboxPaymentSentMsg => "BUYER_STORED_IN_MAILBOX_PAYMENT_SENT_MSG",
            Self::BuyerSendFailedPaymentSentMsg => "BUYER_SEND_FAILED_PAYMENT_SENT_MSG",
            Self::SellerReceivedPaymentSentMsg => "SELLER_RECEIVED_PAYMENT_SENT_MSG",
            Self::SellerSentPaymentReceivedMsg => "SELLER_SENT_PAYMENT_RECEIVED_MSG",
            Self::SellerSawArrivedPaymentReceivedMsg => "SELLER_SAW_ARRIVED_PAYMENT_RECEIVED_MSG",
            Self::SellerStoredInMailboxPaymentReceivedMsg => {
                "SELLER_STORED_IN_MAILBOX_PAYMENT_RECEIVED_MSG"
            }
            Self::SellerSendFailedPaymentReceivedMsg => "SELLER_SEND_FAILED_PAYMENT_RECEIVED_MSG",
            Self::BuyerReceivedPaymentReceivedMsg => "BUYER_RECEIVED_PAYMENT_RECEIVED_MSG",
            Self::PayoutTxPublished => "PAYOUT_TX_PUBLISHED",
            Self::TradeCompleted => "TRADE_COMPLETED",
            Self::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}
