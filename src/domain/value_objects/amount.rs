//! # Amount Value Object
//!
//! Monetary amount in atomic currency units with checked arithmetic.
//!
//! Escrow amounts are exact integers (satoshi-style atomic units), so
//! [`Amount`] wraps a `u64` rather than a decimal. All arithmetic is
//! checked: overflow or underflow surfaces as a
//! [`DomainError::Arithmetic`](crate::domain::errors::DomainError::Arithmetic),
//! never a panic or a silent wrap.
//!
//! # Examples
//!
//! ```
//! use escrow_engine::domain::value_objects::amount::Amount;
//!
//! let trade_amount = Amount::from_atomic(10_000_000);
//! let deposit = Amount::from_atomic(1_500_000);
//!
//! let total = trade_amount.checked_add(deposit).unwrap();
//! assert_eq!(total.as_atomic(), 11_500_000);
//! ```

use crate::domain::errors::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A monetary amount in atomic currency units.
///
/// # Invariants
///
/// - Never negative (unsigned representation)
/// - Arithmetic never wraps: all operations are checked
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from atomic units.
    #[inline]
    #[must_use]
    pub const fn from_atomic(value: u64) -> Self {
        Self(value)
    }

    /// Returns the amount in atomic units.
    #[inline]
    #[must_use]
    pub const fn as_atomic(&self) -> u64 {
        self.0
    }

    /// Returns true if this amount is zero.
    #[inline]
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts, failing on overflow.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Arithmetic`] if the sum overflows `u64`.
    pub fn checked_add(self, other: Self) -> DomainResult<Self> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or_else(|| DomainError::Arithmetic(format!("{} + {} overflows", self.0, other.0)))
    }

    /// Subtracts `other` from this amount, failing on underflow.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Arithmetic`] if `other` exceeds this amount.
    pub fn checked_sub(self, other: Self) -> DomainResult<Self> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or_else(|| DomainError::Arithmetic(format!("{} - {} underflows", self.0, other.0)))
    }

    /// Sums an iterator of amounts, failing on overflow.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Arithmetic`] if any partial sum overflows.
    pub fn checked_sum<I: IntoIterator<Item = Self>>(amounts: I) -> DomainResult<Self> {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, a| acc.checked_add(a))
    }

    /// Computes `percent` percent of this amount, rounding down.
    ///
    /// Used for security-deposit percentages; intermediate math is done in
    /// `u128` so it cannot overflow.
    #[must_use]
    pub fn percent_of(self, percent: u64) -> Self {
        let value = (u128::from(self.0) * u128::from(percent)) / 100;
        // Cannot exceed u64 for percent <= 100; saturate for larger inputs.
        Self(u64::try_from(value).unwrap_or(u64::MAX))
    }

    /// Splits this amount in half; the second half takes the odd unit.
    #[must_use]
    pub const fn split_half(self) -> (Self, Self) {
        let first = self.0 / 2;
        (Self(first), Self(self.0 - first))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
