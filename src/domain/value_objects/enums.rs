//! # Domain Enums
//!
//! Enumeration types for protocol concepts.
//!
//! This module provides the core enumerations used throughout the escrow
//! trade engine:
//!
//! - [`OfferDirection`] - Buy or Sell of the base asset, from the maker's view
//! - [`TradeRole`] - Maker or Taker
//! - [`TraderPosition`] - Buyer or Seller, derived from direction and role
//! - [`OfferState`] - Offer-book lifecycle states
//! - [`DisputeReason`] - Enumerated reasons for opening a dispute
//! - [`DisputeChannel`] - Arbitrator or refund-agent resolution path
//! - [`PayoutPolicy`] - Arbitrated payout selection
//! - [`FatalReason`] - The only conditions that move a trade to failed
//! - [`TradePeriodPhase`] - Advisory trade-period thresholds

use crate::domain::value_objects::amount::Amount;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when parsing an enum from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError(
    /// The enum type name.
    pub &'static str,
    /// The rejected input.
    pub String,
);

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} value: {}", self.0, self.1)
    }
}

impl std::error::Error for ParseEnumError {}

/// Direction of an offer: whether the maker buys or sells the base asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum OfferDirection {
    /// The maker buys the base asset, paying in quote currency.
    Buy = 0,
    /// The maker sells the base asset, receiving quote currency.
    Sell = 1,
}

impl OfferDirection {
    /// Returns the opposite direction.
    #[inline]
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OfferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for OfferDirection {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            _ => Err(ParseEnumError("OfferDirection", s.to_string())),
        }
    }
}

/// Role of a party relative to the offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum TradeRole {
    /// The party who published the offer.
    Maker = 0,
    /// The party who accepted the offer.
    Taker = 1,
}

impl TradeRole {
    /// Returns the counterparty role.
    #[inline]
    #[must_use]
    pub const fn counterparty(self) -> Self {
        match self {
            Self::Maker => Self::Taker,
            Self::Taker => Self::Maker,
        }
    }
}

impl fmt::Display for TradeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maker => write!(f, "MAKER"),
            Self::Taker => write!(f, "TAKER"),
        }
    }
}

/// Economic position of a party in the trade.
///
/// Derived from the offer direction and the party's role: the maker of a
/// SELL offer is the seller, so the taker is the buyer, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum TraderPosition {
    /// Receives the base asset from escrow, pays off-chain.
    Buyer = 0,
    /// Gives up the base asset, receives the off-chain payment.
    Seller = 1,
}

impl TraderPosition {
    /// Derives the position of `role` for an offer of the given direction.
    ///
    /// # Examples
    ///
    /// ```
    /// use escrow_engine::domain::value_objects::enums::{
    ///     OfferDirection, TradeRole, TraderPosition,
    /// };
    ///
    /// let p = TraderPosition::derive(OfferDirection::Sell, TradeRole::Taker);
    /// assert_eq!(p, TraderPosition::Buyer);
    /// ```
    #[must_use]
    pub const fn derive(direction: OfferDirection, role: TradeRole) -> Self {
        match (direction, role) {
            (OfferDirection::Sell, TradeRole::Maker) | (OfferDirection::Buy, TradeRole::Taker) => {
                Self::Seller
            }
            (OfferDirection::Sell, TradeRole::Taker) | (OfferDirection::Buy, TradeRole::Maker) => {
                Self::Buyer
            }
        }
    }

    /// Returns the counterparty position.
    #[inline]
    #[must_use]
    pub const fn counterparty(self) -> Self {
        match self {
            Self::Buyer => Self::Seller,
            Self::Seller => Self::Buyer,
        }
    }

    /// Returns true if this is the buyer.
    #[inline]
    #[must_use]
    pub const fn is_buyer(self) -> bool {
        matches!(self, Self::Buyer)
    }
}

impl fmt::Display for TraderPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buyer => write!(f, "BUYER"),
            Self::Seller => write!(f, "SELLER"),
        }
    }
}

/// Offer-book lifecycle state of an offer.
///
/// ```text
/// Pending → Available ⇄ Reserved
///    ↓          ↓           ↓
///    └──────────┴───────────┴→ Canceled
/// ```
///
/// `Reserved → Available` happens when a take attempt fails before deposit
/// negotiation starts; a completed take consumes the offer instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum OfferState {
    /// Created but not yet published to the offer book.
    #[default]
    Pending = 0,
    /// Published and takeable.
    Available = 1,
    /// Held by an in-progress take attempt.
    Reserved = 2,
    /// Withdrawn by the maker or fully consumed (terminal).
    Canceled = 3,
}

impl OfferState {
    /// Returns true if this is a terminal state.
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Returns true if this state can transition to the target state.
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Available)
                | (Self::Pending, Self::Canceled)
                | (Self::Available, Self::Reserved)
                | (Self::Available, Self::Canceled)
                | (Self::Reserved, Self::Available)
                | (Self::Reserved, Self::Canceled)
        )
    }
}

impl fmt::Display for OfferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Available => "AVAILABLE",
            Self::Reserved => "RESERVED",
            Self::Canceled => "CANCELED",
        };
        write!(f, "{s}")
    }
}

/// Reason given when a dispute is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum DisputeReason {
    /// Software defect.
    Bug = 0,
    /// Usability problem.
    Usability = 1,
    /// Counterparty violated the trade protocol.
    ProtocolViolation = 2,
    /// Counterparty stopped responding.
    NoReply = 3,
    /// Suspected scam.
    Scam = 4,
    /// Payment blocked by bank issues.
    BankProblems = 5,
    /// Anything not covered by the other reasons.
    Other = 6,
    /// Dispute over an option trade.
    OptionTrade = 7,
    /// Seller did not confirm payment receipt.
    SellerNotResponding = 8,
    /// Payment arrived from an unexpected sender account.
    WrongSenderAccount = 9,
    /// Counterparty acted after the trade period.
    PeerWasLate = 10,
    /// The trade was already settled outside the protocol.
    TradeAlreadySettled = 11,
}

impl fmt::Display for DisputeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bug => "BUG",
            Self::Usability => "USABILITY",
            Self::ProtocolViolation => "PROTOCOL_VIOLATION",
            Self::NoReply => "NO_REPLY",
            Self::Scam => "SCAM",
            Self::BankProblems => "BANK_PROBLEMS",
            Self::Other => "OTHER",
            Self::OptionTrade => "OPTION_TRADE",
            Self::SellerNotResponding => "SELLER_NOT_RESPONDING",
            Self::WrongSenderAccount => "WRONG_SENDER_ACCOUNT",
            Self::PeerWasLate => "PEER_WAS_LATE",
            Self::TradeAlreadySettled => "TRADE_ALREADY_SETTLED",
        };
        write!(f, "{s}")
    }
}

/// Resolution path of a dispute.
///
/// The conservation rule differs between the two: an arbitrator result must
/// pay out the full escrow, a refund agent may leave a residual unspent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum DisputeChannel {
    /// Binding arbitration over the full escrow.
    Arbitrator = 0,
    /// Refund-agent resolution; residual may remain unspent.
    RefundAgent = 1,
}

impl fmt::Display for DisputeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arbitrator => write!(f, "ARBITRATOR"),
            Self::RefundAgent => write!(f, "REFUND_AGENT"),
        }
    }
}

/// Payout policy selected by the arbitrator when closing a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutPolicy {
    /// Buyer wins: trade amount plus own deposit; seller keeps own deposit.
    BuyerGetsTradeAmount,
    /// Buyer receives the entire escrow.
    BuyerGetsAll,
    /// Seller wins: trade amount plus own deposit; buyer keeps own deposit.
    SellerGetsTradeAmount,
    /// Seller receives the entire escrow.
    SellerGetsAll,
    /// Arbitrator supplies the buyer payout directly; the seller receives
    /// the remainder.
    Custom {
        /// The buyer's payout amount.
        buyer_payout: Amount,
    },
}

impl fmt::Display for PayoutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuyerGetsTradeAmount => write!(f, "BUYER_GETS_TRADE_AMOUNT"),
            Self::BuyerGetsAll => write!(f, "BUYER_GETS_ALL"),
            Self::SellerGetsTradeAmount => write!(f, "SELLER_GETS_TRADE_AMOUNT"),
            Self::SellerGetsAll => write!(f, "SELLER_GETS_ALL"),
            Self::Custom { buyer_payout } => write!(f, "CUSTOM({buyer_payout})"),
        }
    }
}

/// The enumerated fatal conditions that may move a trade to the failed
/// collection.
///
/// Transient network or wallet errors are never represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum FatalReason {
    /// A protocol message carried an invalid counterparty signature on a
    /// contract-critical payload.
    SignatureMismatch = 0,
    /// The parties' contract copies diverge.
    ContractMismatch = 1,
    /// A deposit transaction was confirmed double-spent.
    DepositDoubleSpend = 2,
    /// The operator explicitly aborted the trade.
    OperatorAbort = 3,
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SignatureMismatch => "SIGNATURE_MISMATCH",
            Self::ContractMismatch => "CONTRACT_MISMATCH",
            Self::DepositDoubleSpend => "DEPOSIT_DOUBLE_SPEND",
            Self::OperatorAbort => "OPERATOR_ABORT",
        };
        write!(f, "{s}")
    }
}

/// Advisory position of `now` within the trade period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum TradePeriodPhase {
    /// Before the halfway point of the trade period.
    FirstHalf = 0,
    /// Past the halfway point but before the deadline.
    SecondHalf = 1,
    /// Past the deadline; dispute eligibility increases.
    Over = 2,
}

impl fmt::Display for TradePeriodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FirstHalf => "FIRST_HALF",
            Self::SecondHalf => "SECOND_HALF",
            Self::Over => "TRADE_PERIOD_OVER",
        };
        write!(f, "{s}")
    }
}
