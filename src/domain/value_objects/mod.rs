//! # Value Objects
//!
//! Immutable types with validation and domain semantics.
//!
//! ## Identity Types
//!
//! - [`OfferId`], [`TradeId`], [`TraderId`], [`TxId`]: string-based identifiers
//! - [`MessageId`], [`EventId`]: uuid-based identifiers
//!
//! ## Numeric Types
//!
//! - [`Amount`]: atomic-unit amount with checked arithmetic
//! - [`Price`] / [`PriceSpec`]: decimal price and offer price policy
//!
//! ## Lifecycle Types
//!
//! - [`TradePhase`] / [`TradeState`]: the coarse/fine trade lifecycle pair
//! - `OfferState`, `TradePeriodPhase` and the other domain enums

pub mod amount;
pub mod enums;
pub mod ids;
pub mod price;
pub mod timestamp;
pub mod trade_phase;

pub use amount::Amount;
pub use enums::{
    DisputeChannel, DisputeReason, FatalReason, OfferDirection, OfferState, PayoutPolicy,
    TradePeriodPhase, TradeRole, TraderPosition,
};
pub use ids::{EventId, MessageId, OfferId, TradeId, TraderId, TxId};
pub use price::{Price, PriceSpec};
pub use timestamp::Timestamp;
pub use trade_phase::{TradePhase, TradeState};
