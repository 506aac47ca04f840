//! # Offer Entity
//!
//! An immutable-once-published intent to trade.
//!
//! An [`Offer`] is created by the maker, published to the offer book, and
//! consumed by a take. Its price policy and amount bounds are fixed at
//! construction; the only mutation after publication is the offer-book
//! membership state ([`OfferState`]).
//!
//! # Examples
//!
//! ```
//! use escrow_engine::domain::entities::offer::Offer;
//! use escrow_engine::domain::value_objects::{
//!     Amount, OfferDirection, OfferId, PriceSpec, Price, TraderId,
//! };
//! use rust_decimal::Decimal;
//!
//! let offer = Offer::new(
//!     OfferId::new("offer-1"),
//!     TraderId::new("maker-1"),
//!     OfferDirection::Sell,
//!     Amount::from_atomic(10_000_000),
//!     Amount::from_atomic(1_000_000),
//!     PriceSpec::fixed(Price::new(Decimal::new(43_000, 0)).unwrap()),
//!     15,
//!     "pay-acct-1",
//! )
//! .unwrap();
//!
//! assert_eq!(offer.security_deposit().as_atomic(), 1_500_000);
//! ```

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{Amount, OfferDirection, OfferId, OfferState, PriceSpec, TraderId};
use serde::{Deserialize, Serialize};

/// An intent to trade, published by the maker.
///
/// # Invariants
///
/// - `min_amount <= amount`
/// - Price policy is immutable once published (no mutator exists)
/// - Offer-book transitions only via [`OfferState::can_transition_to`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    /// Unique identifier; the trade created by a take reuses it.
    id: OfferId,
    /// The maker who published the offer.
    maker_id: TraderId,
    /// Whether the maker buys or sells the base asset.
    direction: OfferDirection,
    /// Maximum trade amount.
    amount: Amount,
    /// Minimum trade amount.
    min_amount: Amount,
    /// Pricing policy, frozen at creation.
    price_spec: PriceSpec,
    /// Security-deposit percentage of the trade amount, per side.
    security_deposit_percent: u64,
    /// Reference to the maker's payment account (external).
    payment_account_id: String,
    /// Offer-book membership state.
    state: OfferState,
    /// Version for optimistic locking.
    version: u64,
    /// When this offer was created.
    created_at: Timestamp,
    /// When this offer was last updated.
    updated_at: Timestamp,
}

impl Offer {
    /// Creates a new offer in [`OfferState::Pending`].
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidAmount`] if `min_amount > amount` or
    /// the amount is zero, and [`DomainError::InvalidOffer`] if the deposit
    /// percentage is zero or exceeds 100.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: OfferId,
        maker_id: TraderId,
        direction: OfferDirection,
        amount: Amount,
        min_amount: Amount,
        price_spec: PriceSpec,
        security_deposit_percent: u64,
        payment_account_id: impl Into<String>,
    ) -> DomainResult<Self> {
        if amount.is_zero() {
            return Err(DomainError::InvalidAmount(
                "offer amount must be positive".to_string(),
            ));
        }
        if min_amount > amount {
            return Err(DomainError::InvalidAmount(format!(
                "min_amount {min_amount} exceeds amount {amount}"
            )));
        }
        if security_deposit_percent == 0 || security_deposit_percent > 100 {
            return Err(DomainError::InvalidOffer(format!(
                "security deposit percent must be in 1..=100, got {security_deposit_percent}"
            )));
        }
        let now = Timestamp::now();
        Ok(Self {
            id,
            maker_id,
            direction,
            amount,
            min_amount,
            price_spec,
            security_deposit_percent,
            payment_account_id: payment_account_id.into(),
            state: OfferState::Pending,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    fn transition_to(&mut self, target: OfferState) -> DomainResult<()> {
        if !self.state.can_transition_to(target) {
            return Err(DomainError::InvalidOfferTransition {
                from: self.state,
                to: target,
            });
        }
        self.state = target;
        self.updated_at = Timestamp::now();
        self.version = self.version.saturating_add(1);
        Ok(())
    }

    /// Publishes the offer to the offer book.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidOfferTransition`] unless the offer is
    /// pending.
    pub fn activate(&mut self) -> DomainResult<()> {
        self.transition_to(OfferState::Available)
    }

    /// Reserves the offer for an in-progress take attempt.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidOfferTransition`] unless the offer is
    /// available.
    pub fn reserve(&mut self) -> DomainResult<()> {
        self.transition_to(OfferState::Reserved)
    }

    /// Returns a reserved offer to the book after a failed take attempt.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidOfferTransition`] unless the offer is
    /// reserved.
    pub fn release(&mut self) -> DomainResult<()> {
        self.transition_to(OfferState::Available)
    }

    /// Cancels the offer (maker withdrawal or full consumption by a take).
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidOfferTransition`] if the offer is
    /// already canceled.
    pub fn cancel(&mut self) -> DomainResult<()> {
        self.transition_to(OfferState::Canceled)
    }

    /// Validates that `amount` lies within the offer's bounds.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidAmount`] if the amount is outside
    /// `[min_amount, amount]`.
    pub fn validate_take_amount(&self, amount: Amount) -> DomainResult<()> {
        if amount < self.min_amount || amount > self.amount {
            return Err(DomainError::InvalidAmount(format!(
                "take amount {amount} outside offer bounds [{}, {}]",
                self.min_amount, self.amount
            )));
        }
        Ok(())
    }

    /// Returns the per-side security deposit for the full offer amount.
    #[must_use]
    pub fn security_deposit(&self) -> Amount {
        self.amount.percent_of(self.security_deposit_percent)
    }

    /// Returns the per-side security deposit for a given take amount.
    #[must_use]
    pub fn security_deposit_for(&self, amount: Amount) -> Amount {
        amount.percent_of(self.security_deposit_percent)
    }

    // ========== Accessors ==========

    /// Returns the offer id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &OfferId {
        &self.id
    }

    /// Returns the maker's trader id.
    #[inline]
    #[must_use]
    pub fn maker_id(&self) -> &TraderId {
        &self.maker_id
    }

    /// Returns the offer direction.
    #[inline]
    #[must_use]
    pub fn direction(&self) -> OfferDirection {
        self.direction
    }

    /// Returns the maximum trade amount.
    #[inline]
    #[must_use]
    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Returns the minimum trade amount.
    #[inline]
    #[must_use]
    pub fn min_amount(&self) -> Amount {
        self.min_amount
    }

    /// Returns the price policy.
    #[inline]
    #[must_use]
    pub fn price_spec(&self) -> &PriceSpec {
        &self.price_spec
    }

    /// Returns the security-deposit percentage.
    #[inline]
    #[must_use]
    pub fn security_deposit_percent(&self) -> u64 {
        self.security_deposit_percent
    }

    /// Returns the external payment-account reference.
    #[inline]
    #[must_use]
    pub fn payment_account_id(&self) -> &str {
        &self.payment_account_id
    }

    /// Returns the offer-book state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> OfferState {
        self.state
    }

    /// Returns the optimistic-locking version.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns when the offer was created.
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }
}
