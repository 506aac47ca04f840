//! # Payout Calculator
//!
//! Pure computation of escrow payout splits.
//!
//! Every unit that entered the escrow (trade amount plus both security
//! deposits) is accounted for in the split. An arbitrator decision must
//! conserve the escrow exactly; a refund-agent decision may pay out less,
//! the residual stays in the escrow and is logged.
//!
//! # Examples
//!
//! Cooperative close of a 10M trade with 1.5M deposits each:
//!
//! ```text
//! buyer  = 10_000_000 + 1_500_000 = 11_500_000
//! seller =              1_500_000 =  1_500_000
//! ```

use crate::domain::entities::contract::Contract;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::{Amount, DisputeChannel, PayoutPolicy};

/// How the escrow is divided between the two parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutSplit {
    /// The buyer's share.
    pub buyer: Amount,
    /// The seller's share.
    pub seller: Amount,
}

impl PayoutSplit {
    /// Returns the total paid out.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Arithmetic`] on overflow.
    pub fn total(&self) -> DomainResult<Amount> {
        self.buyer.checked_add(self.seller)
    }
}

/// Stateless payout computation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayoutCalculator;

impl PayoutCalculator {
    /// Creates a new calculator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the cooperative payout: the buyer receives the trade
    /// amount plus their deposit back, the seller receives their deposit
    /// back.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Arithmetic`] on overflow.
    pub fn cooperative(&self, contract: &Contract) -> DomainResult<PayoutSplit> {
        let buyer = contract
            .amount()
            .checked_add(contract.buyer_security_deposit())?;
        let split = PayoutSplit {
            buyer,
            seller: contract.seller_security_deposit(),
        };
        self.validated(contract, split, DisputeChannel::Arbitrator)
    }

    /// Computes an arbitrated payout under the given policy.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidPayout`] if a custom amount exceeds
    /// the escrow or the resulting split violates conservation, and
    /// [`DomainError::Arithmetic`] on overflow.
    pub fn arbitrated(
        &self,
        contract: &Contract,
        policy: &PayoutPolicy,
        channel: DisputeChannel,
    ) -> DomainResult<PayoutSplit> {
        let total = contract.total_escrow()?;
        let split = match policy {
            PayoutPolicy::BuyerGetsTradeAmount => PayoutSplit {
                buyer: contract
                    .amount()
                    .checked_add(contract.buyer_security_deposit())?,
                seller: contract.seller_security_deposit(),
            },
            PayoutPolicy::BuyerGetsAll => PayoutSplit {
                buyer: total,
                seller: Amount::ZERO,
            },
            PayoutPolicy::SellerGetsTradeAmount => PayoutSplit {
                buyer: contract.buyer_security_deposit(),
                seller: contract
                    .amount()
                    .checked_add(contract.seller_security_deposit())?,
            },
            PayoutPolicy::SellerGetsAll => PayoutSplit {
                buyer: Amount::ZERO,
                seller: total,
            },
            PayoutPolicy::Custom { buyer_payout } => {
                if *buyer_payout > total {
                    return Err(DomainError::InvalidPayout(format!(
                        "custom buyer payout {buyer_payout} exceeds escrow {total}"
                    )));
                }
                PayoutSplit {
                    buyer: *buyer_payout,
                    seller: total.checked_sub(*buyer_payout)?,
                }
            }
        };
        self.validated(contract, split, channel)
    }

    /// Checks a split against the conservation rule for the channel and
    /// returns it unchanged if it holds.
    ///
    /// An arbitrator split must equal the escrow exactly. A refund-agent
    /// split may pay out less; the residual is logged and stays behind.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidPayout`] if the split pays out more
    /// than the escrow, or an arbitrator split pays out less.
    pub fn validated(
        &self,
        contract: &Contract,
        split: PayoutSplit,
        channel: DisputeChannel,
    ) -> DomainResult<PayoutSplit> {
        let total = contract.total_escrow()?;
        let paid = split.total()?;
        if paid > total {
            return Err(DomainError::InvalidPayout(format!(
                "split pays {paid}, escrow holds {total}"
            )));
        }
        if paid < total {
            if channel == DisputeChannel::Arbitrator {
                return Err(DomainError::InvalidPayout(format!(
                    "arbitrator split pays {paid}, must exhaust escrow {total}"
                )));
            }
            let residual = total.checked_sub(paid)?;
            tracing::warn!(
                trade_id = %contract.trade_id(),
                %residual,
                "refund-agent payout leaves residual in escrow"
            );
        }
        Ok(split)
    }

    /// Deducts a payout transaction fee from a split: each side bears
    /// half, the seller the odd unit.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidPayout`] if either share cannot cover
    /// its half.
    pub fn deduct_fee(&self, split: PayoutSplit, fee: Amount) -> DomainResult<PayoutSplit> {
        let (buyer_share, seller_share) = fee.split_half();
        let buyer = split
            .buyer
            .checked_sub(buyer_share)
            .map_err(|_| DomainError::InvalidPayout(format!(
                "buyer payout {} cannot cover fee share {buyer_share}",
                split.buyer
            )))?;
        let seller = split
            .seller
            .checked_sub(seller_share)
            .map_err(|_| DomainError::InvalidPayout(format!(
                "seller payout {} cannot cover fee share {seller_share}",
                split.seller
            )))?;
        Ok(PayoutSplit { buyer, seller })
    }
}
