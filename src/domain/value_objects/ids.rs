//! # Identity Value Objects
//!
//! Newtype identifiers for domain entities.
//!
//! String-based ids ([`OfferId`], [`TradeId`], [`TraderId`], [`TxId`]) carry
//! externally assigned identity: an offer id is minted by the maker, a trade
//! id always equals the id of the offer it was taken from, and transaction
//! ids come from the wallet. Uuid-based ids ([`MessageId`], [`EventId`]) are
//! generated locally.
//!
//! # Examples
//!
//! ```
//! use escrow_engine::domain::value_objects::ids::{OfferId, TradeId};
//!
//! let offer_id = OfferId::new("offer-1");
//! let trade_id = TradeId::from_offer(&offer_id);
//! assert_eq!(trade_id.as_str(), "offer-1");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new id from the given value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the id as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id! {
    /// Identifier of an offer, assigned by the maker at creation.
    OfferId
}

string_id! {
    /// Identifier of a trade.
    ///
    /// A trade id always equals the id of the offer it was taken from.
    TradeId
}

string_id! {
    /// Identifier of a trading peer (maker, taker, arbitrator or refund agent).
    TraderId
}

string_id! {
    /// Identifier of an on-chain transaction, assigned by the wallet.
    TxId
}

impl TradeId {
    /// Derives the trade id from the originating offer.
    #[must_use]
    pub fn from_offer(offer_id: &OfferId) -> Self {
        Self(offer_id.as_str().to_string())
    }
}

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random id.
            #[must_use]
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the underlying uuid.
            #[inline]
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id! {
    /// Identifier of a protocol message envelope.
    MessageId
}

uuid_id! {
    /// Identifier of a domain event.
    EventId
}
