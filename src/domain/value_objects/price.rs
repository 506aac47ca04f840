//! # Price Value Objects
//!
//! Trade price and the offer price policy.
//!
//! [`Price`] is a positive decimal quote-currency price for one unit of the
//! base asset. [`PriceSpec`] is the maker's pricing policy frozen into an
//! offer: either a fixed price, or a percentage margin over the market price
//! with an optional trigger price below/above which the offer should be
//! deactivated by the offer book.
//!
//! # Examples
//!
//! ```
//! use escrow_engine::domain::value_objects::price::{Price, PriceSpec};
//! use rust_decimal::Decimal;
//!
//! let fixed = PriceSpec::fixed(Price::new(Decimal::new(43_250, 0)).unwrap());
//! assert!(fixed.is_fixed());
//! ```

use crate::domain::errors::{DomainError, DomainResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A positive decimal price in quote currency per unit of base asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Creates a new price.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidPrice`] if the value is not positive.
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice(format!(
                "price must be positive, got {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Returns the underlying decimal value.
    #[inline]
    #[must_use]
    pub const fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pricing policy of an offer.
///
/// Immutable once the offer becomes available; the offer book reads it, the
/// contract freezes the resolved trade price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceSpec {
    /// A fixed price set by the maker.
    Fixed {
        /// The fixed price.
        price: Price,
    },
    /// A percentage margin over (positive) or under (negative) the market
    /// price, with an optional trigger price.
    MarketMargin {
        /// Margin in percent; may be negative.
        margin_percent: Decimal,
        /// Price at which the offer book deactivates the offer, if set.
        trigger_price: Option<Price>,
    },
}

impl PriceSpec {
    /// Creates a fixed-price spec.
    #[must_use]
    pub const fn fixed(price: Price) -> Self {
        Self::Fixed { price }
    }

    /// Creates a market-margin spec.
    #[must_use]
    pub const fn market_margin(margin_percent: Decimal, trigger_price: Option<Price>) -> Self {
        Self::MarketMargin {
            margin_percent,
            trigger_price,
        }
    }

    /// Returns true if this is a fixed-price spec.
    #[inline]
    #[must_use]
    pub const fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed { .. })
    }

    /// Resolves the effective price given the current market price.
    ///
    /// For a fixed spec the market price is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidPrice`] if the margin-adjusted price is
    /// not positive.
    pub fn resolve(&self, market_price: Price) -> DomainResult<Price> {
        match self {
            Self::Fixed { price } => Ok(*price),
            Self::MarketMargin { margin_percent, .. } => {
                let factor = Decimal::ONE + *margin_percent / Decimal::ONE_HUNDRED;
                Price::new(market_price.value() * factor)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn price(n: i64) -> Price {
        Price::new(Decimal::new(n, 0)).unwrap()
    }

    #[test]
    fn price_must_be_positive() {
        assert!(Price::new(Decimal::ZERO).is_err());
        assert!(Price::new(Decimal::new(-1, 0)).is_err());
        assert!(Price::new(Decimal::ONE).is_ok());
    }

    #[test]
    fn fixed_spec_ignores_market_price() {
        let spec = PriceSpec::fixed(price(50_000));
        assert_eq!(spec.resolve(price(99_999)).unwrap(), price(50_000));
    }

    #[test]
    fn margin_spec_applies_percentage() {
        let spec = PriceSpec::market_margin(Decimal::new(2, 0), None);
        let resolved = spec.resolve(price(100)).unwrap();
        assert_eq!(resolved.value(), Decimal::new(102, 0));
    }

    #[test]
    fn negative_margin_below_market() {
        let spec = PriceSpec::market_margin(Decimal::new(-5, 0), None);
        let resolved = spec.resolve(price(100)).unwrap();
        assert_eq!(resolved.value(), Decimal::new(95, 0));
    }

    #[test]
    fn margin_cannot_produce_non_positive_price() {
        let spec = PriceSpec::market_margin(Decimal::new(-100, 0), None);
        assert!(spec.resolve(price(100)).is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let spec = PriceSpec::market_margin(Decimal::new(15, 1), Some(price(40_000)));
        let json = serde_json::to_string(&spec).unwrap();
        let back: PriceSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
