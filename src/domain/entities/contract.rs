//! # Contract Entity
//!
//! The bilaterally signed snapshot of an accepted trade.
//!
//! A [`Contract`] freezes, at trade-take time, everything the two parties
//! agree on: the offer terms, the resolved price and amount, both parties'
//! payment-account payloads (copies, not references, since accounts may be
//! edited later), payout addresses, deposits and fees. Both parties sign
//! the canonical encoding; arbitrators inspect it verbatim during disputes.
//!
//! # Invariants
//!
//! - Never mutates after construction; signatures are attached by value
//!   (`with_*_signature` returns a new contract)
//! - Buyer/seller assignment is derived from the offer direction, never
//!   stored independently

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{
    Amount, OfferDirection, OfferId, Price, TradeId, TradeRole, TraderId, TraderPosition,
};
use serde::{Deserialize, Serialize};

/// The signed, frozen agreement backing a trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// The trade this contract backs (equals the offer id).
    trade_id: TradeId,
    /// The originating offer.
    offer_id: OfferId,
    /// Direction of the originating offer, from the maker's view.
    direction: OfferDirection,
    /// Agreed trade amount.
    amount: Amount,
    /// Agreed trade price.
    price: Price,
    /// The maker's trader id.
    maker_id: TraderId,
    /// The taker's trader id.
    taker_id: TraderId,
    /// Snapshot of the maker's payment-account payload.
    maker_payment_account: serde_json::Value,
    /// Snapshot of the taker's payment-account payload.
    taker_payment_account: serde_json::Value,
    /// Buyer's payout address.
    buyer_payout_address: String,
    /// Seller's payout address.
    seller_payout_address: String,
    /// Buyer's security deposit.
    buyer_security_deposit: Amount,
    /// Seller's security deposit.
    seller_security_deposit: Amount,
    /// Maker's trade fee.
    maker_trade_fee: Amount,
    /// Taker's trade fee.
    taker_trade_fee: Amount,
    /// Maker's signing key.
    maker_pub_key: String,
    /// Taker's signing key.
    taker_pub_key: String,
    /// Maker's signature over the canonical encoding.
    maker_signature: Option<String>,
    /// Taker's signature over the canonical encoding.
    taker_signature: Option<String>,
    /// When the contract was created.
    created_at: Timestamp,
}

impl Contract {
    /// Returns a builder.
    #[must_use]
    pub fn builder(trade_id: TradeId, offer_id: OfferId) -> ContractBuilder {
        ContractBuilder::new(trade_id, offer_id)
    }

    /// Returns the trade id.
    #[inline]
    #[must_use]
    pub fn trade_id(&self) -> &TradeId {
        &self.trade_id
    }

    /// Returns the originating offer id.
    #[inline]
    #[must_use]
    pub fn offer_id(&self) -> &OfferId {
        &self.offer_id
    }

    /// Returns the offer direction.
    #[inline]
    #[must_use]
    pub fn direction(&self) -> OfferDirection {
        self.direction
    }

    /// Returns the trade amount.
    #[inline]
    #[must_use]
    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Returns the trade price.
    #[inline]
    #[must_use]
    pub fn price(&self) -> Price {
        self.price
    }

    /// Returns the maker's trader id.
    #[inline]
    #[must_use]
    pub fn maker_id(&self) -> &TraderId {
        &self.maker_id
    }

    /// Returns the taker's trader id.
    #[inline]
    #[must_use]
    pub fn taker_id(&self) -> &TraderId {
        &self.taker_id
    }

    /// Returns the economic position of the given role.
    #[must_use]
    pub const fn position_of(&self, role: TradeRole) -> TraderPosition {
        TraderPosition::derive(self.direction, role)
    }

    /// Returns the role occupying the given position.
    #[must_use]
    pub fn role_of(&self, position: TraderPosition) -> TradeRole {
        if self.position_of(TradeRole::Maker) == position {
            TradeRole::Maker
        } else {
            TradeRole::Taker
        }
    }

    /// Returns the trader id occupying the given position.
    #[must_use]
    pub fn trader_of(&self, position: TraderPosition) -> &TraderId {
        match self.role_of(position) {
            TradeRole::Maker => &self.maker_id,
            TradeRole::Taker => &self.taker_id,
        }
    }

    /// Returns the signing key of the given trader, if they are a party.
    #[must_use]
    pub fn pub_key_of(&self, trader: &TraderId) -> Option<&str> {
        if trader == &self.maker_id {
            Some(&self.maker_pub_key)
        } else if trader == &self.taker_id {
            Some(&self.taker_pub_key)
        } else {
            None
        }
    }

    /// Returns the payment-account snapshot of the given role.
    #[must_use]
    pub const fn payment_account_of(&self, role: TradeRole) -> &serde_json::Value {
        match role {
            TradeRole::Maker => &self.maker_payment_account,
            TradeRole::Taker => &self.taker_payment_account,
        }
    }

    /// Returns the buyer's payout address.
    #[inline]
    #[must_use]
    pub fn buyer_payout_address(&self) -> &str {
        &self.buyer_payout_address
    }

    /// Returns the seller's payout address.
    #[inline]
    #[must_use]
    pub fn seller_payout_address(&self) -> &str {
        &self.seller_payout_address
    }

    /// Returns the buyer's security deposit.
    #[inline]
    #[must_use]
    pub fn buyer_security_deposit(&self) -> Amount {
        self.buyer_security_deposit
    }

    /// Returns the seller's security deposit.
    #[inline]
    #[must_use]
    pub fn seller_security_deposit(&self) -> Amount {
        self.seller_security_deposit
    }

    /// Returns the security deposit of the given role.
    #[must_use]
    pub fn security_deposit_of(&self, role: TradeRole) -> Amount {
        match self.position_of(role) {
            TraderPosition::Buyer => self.buyer_security_deposit,
            TraderPosition::Seller => self.seller_security_deposit,
        }
    }

    /// Returns the trade fee of the given role.
    #[must_use]
    pub const fn trade_fee_of(&self, role: TradeRole) -> Amount {
        match role {
            TradeRole::Maker => self.maker_trade_fee,
            TradeRole::Taker => self.taker_trade_fee,
        }
    }

    /// Returns the total escrow: trade amount plus both deposits.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Arithmetic`] on overflow.
    pub fn total_escrow(&self) -> DomainResult<Amount> {
        Amount::checked_sum([
            self.amount,
            self.buyer_security_deposit,
            self.seller_security_deposit,
        ])
    }

    /// Returns the canonical bytes both parties sign: the JSON encoding of
    /// the contract with both signature fields cleared.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ValidationError`] if serialization fails.
    pub fn canonical_bytes(&self) -> DomainResult<Vec<u8>> {
        let mut unsigned = self.clone();
        unsigned.maker_signature = None;
        unsigned.taker_signature = None;
        serde_json::to_vec(&unsigned)
            .map_err(|e| DomainError::ValidationError(format!("contract encoding failed: {e}")))
    }

    /// Returns the signature of the given role, if attached.
    #[must_use]
    pub fn signature_of(&self, role: TradeRole) -> Option<&str> {
        match role {
            TradeRole::Maker => self.maker_signature.as_deref(),
            TradeRole::Taker => self.taker_signature.as_deref(),
        }
    }

    /// Returns a copy with the maker's signature attached.
    #[must_use]
    pub fn with_maker_signature(mut self, signature: impl Into<String>) -> Self {
        self.maker_signature = Some(signature.into());
        self
    }

    /// Returns a copy with the taker's signature attached.
    #[must_use]
    pub fn with_taker_signature(mut self, signature: impl Into<String>) -> Self {
        self.taker_signature = Some(signature.into());
        self
    }

    /// Returns true if both parties have signed.
    #[must_use]
    pub const fn is_fully_signed(&self) -> bool {
        self.maker_signature.is_some() && self.taker_signature.is_some()
    }
}

/// Builder for [`Contract`].
///
/// All fields except the deposit/fee amounts are required; `build` validates
/// completeness.
#[derive(Debug, Clone)]
pub struct ContractBuilder {
    trade_id: TradeId,
    offer_id: OfferId,
    direction: Option<OfferDirection>,
    amount: Option<Amount>,
    price: Option<Price>,
    maker_id: Option<TraderId>,
    taker_id: Option<TraderId>,
    maker_payment_account: Option<serde_json::Value>,
    taker_payment_account: Option<serde_json::Value>,
    buyer_payout_address: Option<String>,
    seller_payout_address: Option<String>,
    buyer_security_deposit: Amount,
    seller_security_deposit: Amount,
    maker_trade_fee: Amount,
    taker_trade_fee: Amount,
    maker_pub_key: Option<String>,
    taker_pub_key: Option<String>,
}

impl ContractBuilder {
    /// Creates a new builder for the given trade/offer pair.
    #[must_use]
    pub fn new(trade_id: TradeId, offer_id: OfferId) -> Self {
        Self {
            trade_id,
            offer_id,
            direction: None,
            amount: None,
            price: None,
            maker_id: None,
            taker_id: None,
            maker_payment_account: None,
            taker_payment_account: None,
            buyer_payout_address: None,
            seller_payout_address: None,
            buyer_security_deposit: Amount::ZERO,
            seller_security_deposit: Amount::ZERO,
            maker_trade_fee: Amount::ZERO,
            taker_trade_fee: Amount::ZERO,
            maker_pub_key: None,
            taker_pub_key: None,
        }
    }

    /// Sets the offer direction.
    #[must_use]
    pub const fn direction(mut self, direction: OfferDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Sets the trade amount.
    #[must_use]
    pub const fn amount(mut self, amount: Amount) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Sets the trade price.
    #[must_use]
    pub const fn price(mut self, price: Price) -> Self {
        self.price = Some(price);
        self
    }

    /// Sets the maker's id, pub key and payment-account snapshot.
    #[must_use]
    pub fn maker(
        mut self,
        id: TraderId,
        pub_key: impl Into<String>,
        payment_account: serde_json::Value,
    ) -> Self {
        self.maker_id = Some(id);
        self.maker_pub_key = Some(pub_key.into());
        self.maker_payment_account = Some(payment_account);
        self
    }

    /// Sets the taker's id, pub key and payment-account snapshot.
    #[must_use]
    pub fn taker(
        mut self,
        id: TraderId,
        pub_key: impl Into<String>,
        payment_account: serde_json::Value,
    ) -> Self {
        self.taker_id = Some(id);
        self.taker_pub_key = Some(pub_key.into());
        self.taker_payment_account = Some(payment_account);
        self
    }

    /// Sets both payout addresses.
    #[must_use]
    pub fn payout_addresses(mut self, buyer: impl Into<String>, seller: impl Into<String>) -> Self {
        self.buyer_payout_address = Some(buyer.into());
        self.seller_payout_address = Some(seller.into());
        self
    }

    /// Sets both security deposits.
    #[must_use]
    pub const fn security_deposits(mut self, buyer: Amount, seller: Amount) -> Self {
        self.buyer_security_deposit = buyer;
        self.seller_security_deposit = seller;
        self
    }

    /// Sets both trade fees.
    #[must_use]
    pub const fn trade_fees(mut self, maker: Amount, taker: Amount) -> Self {
        self.maker_trade_fee = maker;
        self.taker_trade_fee = taker;
        self
    }

    /// Builds the contract.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ValidationError`] if any required field is
    /// missing, and [`DomainError::InvalidAmount`] if the amount is zero.
    pub fn build(self) -> DomainResult<Contract> {
        fn required<T>(value: Option<T>, name: &str) -> DomainResult<T> {
            value.ok_or_else(|| DomainError::ValidationError(format!("contract missing {name}")))
        }

        let amount = required(self.amount, "amount")?;
        if amount.is_zero() {
            return Err(DomainError::InvalidAmount(
                "contract amount must be positive".to_string(),
            ));
        }

        Ok(Contract {
            trade_id: self.trade_id,
            offer_id: self.offer_id,
            direction: required(self.direction, "direction")?,
            amount,
            price: required(self.price, "price")?,
            maker_id: required(self.maker_id, "maker_id")?,
            taker_id: required(self.taker_id, "taker_id")?,
            maker_payment_account: required(self.maker_payment_account, "maker_payment_account")?,
            taker_payment_account: required(self.taker_payment_account, "taker_payment_account")?,
            buyer_payout_address: required(self.buyer_payout_address, "buyer_payout_address")?,
            seller_payout_address: required(self.seller_payout_address, "seller_payout_address")?,
            buyer_security_deposit: self.buyer_security_deposit,
            seller_security_deposit: self.seller_security_deposit,
            maker_trade_fee: self.maker_trade_fee,
            taker_trade_fee: self.taker_trade_fee,
            maker_pub_key: required(self.maker_pub_key, "maker_pub_key")?,
            taker_pub_key: required(self.taker_pub_key, "taker_pub_key")?,
            maker_signature: None,
            taker_signature: None,
            created_at: Timestamp::now(),
        })
    }
}
