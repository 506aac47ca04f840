//! # Escrow Coordinator
//!
//! Drives deposit funding and confirmation for the two-of-two escrow.
//!
//! Each party funds the escrow with their security deposit; the seller's
//! deposit transaction additionally carries the trade amount. Publication
//! retries transient wallet failures with bounded backoff; exhausting the
//! budget surfaces as a manual-intervention error and never fails the
//! trade on its own.

use crate::application::error::{ProtocolError, ProtocolResult};
use crate::application::services::backoff::BackoffPolicy;
use crate::application::services::payout_calculator::PayoutSplit;
use crate::domain::entities::trade::Trade;
use crate::domain::value_objects::{Amount, TradeRole, TraderPosition, TxId};
use crate::infrastructure::wallet::client::{TxDraft, TxKind, TxOutput, WalletClient};
use std::sync::Arc;
use std::time::Duration;

/// Confirmation thresholds and retry policy for deposit handling.
#[derive(Debug, Clone, Copy)]
pub struct EscrowConfig {
    /// Confirmations required on the maker's deposit.
    pub maker_confirmations: u32,
    /// Confirmations required on the taker's deposit.
    pub taker_confirmations: u32,
    /// Backoff for deposit publication.
    pub publish_backoff: BackoffPolicy,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            maker_confirmations: 10,
            taker_confirmations: 10,
            publish_backoff: BackoffPolicy::bounded(
                Duration::from_secs(1),
                Duration::from_secs(60),
                4,
            ),
        }
    }
}

impl EscrowConfig {
    fn required_for(&self, role: TradeRole) -> u32 {
        match role {
            TradeRole::Maker => self.maker_confirmations,
            TradeRole::Taker => self.taker_confirmations,
        }
    }
}

/// Where both deposits stand relative to their thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Both deposits reached their thresholds; the escrow is unlocked.
    Unlocked,
    /// At least one deposit is still short of its threshold.
    StillPending {
        /// Confirmations on the maker's deposit.
        maker: u32,
        /// Confirmations on the taker's deposit.
        taker: u32,
    },
}

/// Coordinates deposit funding and confirmation through the wallet.
#[derive(Debug, Clone)]
pub struct EscrowCoordinator {
    wallet: Arc<dyn WalletClient>,
    config: EscrowConfig,
}

impl EscrowCoordinator {
    /// Creates a coordinator over the given wallet.
    #[must_use]
    pub fn new(wallet: Arc<dyn WalletClient>, config: EscrowConfig) -> Self {
        Self { wallet, config }
    }

    /// Returns the amount a role must put into the escrow.
    ///
    /// The seller funds the trade amount on top of their deposit; a buyer
    /// whose deposit is zero owes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidCommand`] if the trade has no
    /// contract yet.
    pub fn required_deposit(&self, trade: &Trade, role: TradeRole) -> ProtocolResult<Amount> {
        let contract = trade
            .contract()
            .ok_or_else(|| ProtocolError::invalid_command("trade has no contract yet"))?;
        let deposit = contract.security_deposit_of(role);
        match contract.position_of(role) {
            TraderPosition::Seller => Ok(contract.amount().checked_add(deposit)?),
            TraderPosition::Buyer => Ok(deposit),
        }
    }

    fn deposit_outputs(&self, trade: &Trade, role: TradeRole) -> ProtocolResult<Option<Vec<TxOutput>>> {
        let required = self.required_deposit(trade, role)?;
        if required.is_zero() {
            tracing::debug!(trade_id = %trade.id(), ?role, "no deposit owed, skipping");
            return Ok(None);
        }
        Ok(Some(vec![TxOutput {
            // The wallet resolves the escrow label to the multisig address.
            address: format!("escrow:{}", trade.id()),
            amount: required,
        }]))
    }

    /// Builds an unsigned deposit transaction draft for a role, without
    /// broadcasting it.
    ///
    /// Returns `None` when the role owes nothing.
    ///
    /// # Errors
    ///
    /// Surfaces [`WalletError::InsufficientFunds`] when the funding wallet
    /// balance is short of the required escrow amount.
    ///
    /// [`WalletError::InsufficientFunds`]: crate::infrastructure::wallet::WalletError::InsufficientFunds
    pub async fn prepare_deposit(
        &self,
        trade: &Trade,
        role: TradeRole,
    ) -> ProtocolResult<Option<TxDraft>> {
        let Some(outputs) = self.deposit_outputs(trade, role)? else {
            return Ok(None);
        };
        let draft = self.wallet.build_tx(trade.id(), TxKind::Deposit, outputs).await?;
        Ok(Some(draft))
    }

    /// Funds and broadcasts a role's deposit transaction, recording its id
    /// on the trade.
    ///
    /// The draft is rebuilt on every broadcast attempt so retries pick up
    /// fresh inputs. Returns `None` without touching the wallet when the
    /// role owes nothing. Re-running for a role that already has a deposit
    /// recorded returns the existing id, publication is idempotent at this
    /// level.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ManualInterventionRequired`] when the
    /// retry budget is exhausted, and the underlying wallet error for
    /// non-retryable failures such as insufficient funds.
    pub async fn publish_deposit(
        &self,
        trade: &mut Trade,
        role: TradeRole,
    ) -> ProtocolResult<Option<TxId>> {
        if let Some(existing) = trade.deposit_tx(role) {
            return Ok(Some(existing.clone()));
        }
        let Some(outputs) = self.deposit_outputs(trade, role)? else {
            return Ok(None);
        };

        let trade_id = trade.id().clone();
        let wallet = Arc::clone(&self.wallet);
        let result = self
            .config
            .publish_backoff
            .retry("publish_deposit", |attempt| {
                let wallet = Arc::clone(&wallet);
                let trade_id = trade_id.clone();
                let outputs = outputs.clone();
                async move {
                    let draft = wallet.build_tx(&trade_id, TxKind::Deposit, outputs).await?;
                    let tx_id = wallet.broadcast(&draft).await?;
                    tracing::info!(%trade_id, %tx_id, attempt, "deposit tx broadcast");
                    Ok(tx_id)
                }
            })
            .await;

        let tx_id = match result {
            Ok(tx_id) => tx_id,
            Err(err) if err.is_retryable() => {
                return Err(ProtocolError::manual_intervention(
                    trade_id,
                    "publish_deposit",
                    err.to_string(),
                ));
            }
            Err(err) => return Err(err),
        };

        trade.set_deposit_tx(role, tx_id.clone())?;
        Ok(Some(tx_id))
    }

    /// Funds and broadcasts the payout transaction for a split, recording
    /// its id on the trade.
    ///
    /// Idempotent: a trade that already has a payout tx returns it without
    /// touching the wallet.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ManualInterventionRequired`] when the
    /// retry budget is exhausted.
    pub async fn publish_payout(
        &self,
        trade: &mut Trade,
        split: PayoutSplit,
    ) -> ProtocolResult<TxId> {
        if let Some(existing) = trade.payout_tx() {
            return Ok(existing.clone());
        }
        let contract = trade
            .contract()
            .ok_or_else(|| ProtocolError::invalid_command("trade has no contract yet"))?;
        let trade_id = trade.id().clone();
        let mut outputs = Vec::with_capacity(2);
        if !split.buyer.is_zero() {
            outputs.push(TxOutput {
                address: contract.buyer_payout_address().to_string(),
                amount: split.buyer,
            });
        }
        if !split.seller.is_zero() {
            outputs.push(TxOutput {
                address: contract.seller_payout_address().to_string(),
                amount: split.seller,
            });
        }

        let wallet = Arc::clone(&self.wallet);
        let result = self
            .config
            .publish_backoff
            .retry("publish_payout", |attempt| {
                let wallet = Arc::clone(&wallet);
                let trade_id = trade_id.clone();
                let outputs = outputs.clone();
                async move {
                    let draft = wallet.build_tx(&trade_id, TxKind::Payout, outputs).await?;
                    let tx_id = wallet.broadcast(&draft).await?;
                    tracing::info!(%trade_id, %tx_id, attempt, "payout tx broadcast");
                    Ok(tx_id)
                }
            })
            .await;

        let tx_id = match result {
            Ok(tx_id) => tx_id,
            Err(err) if err.is_retryable() => {
                return Err(ProtocolError::manual_intervention(
                    trade_id,
                    "publish_payout",
                    err.to_string(),
                ));
            }
            Err(err) => return Err(err),
        };

        trade.set_payout_tx(tx_id.clone())?;
        Ok(tx_id)
    }

    /// Polls confirmation counts for both deposits.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidCommand`] if either deposit is
    /// missing, and wallet errors from the confirmation queries.
    pub async fn check_confirmations(&self, trade: &Trade) -> ProtocolResult<ConfirmationStatus> {
        let maker_tx = trade
            .deposit_tx(TradeRole::Maker)
            .ok_or_else(|| ProtocolError::invalid_command("maker deposit not published"))?;
        let taker_tx = trade
            .deposit_tx(TradeRole::Taker)
            .ok_or_else(|| ProtocolError::invalid_command("taker deposit not published"))?;

        let (maker, taker) = futures::try_join!(
            self.wallet.get_confirmations(maker_tx),
            self.wallet.get_confirmations(taker_tx),
        )?;

        if maker >= self.config.required_for(TradeRole::Maker)
            && taker >= self.config.required_for(TradeRole::Taker)
        {
            Ok(ConfirmationStatus::Unlocked)
        } else {
            Ok(ConfirmationStatus::StillPending { maker, taker })
        }
    }

    /// Returns true if every recorded deposit is still unspent.
    ///
    /// # Errors
    ///
    /// Returns wallet errors from the lookups.
    pub async fn deposits_unspent(&self, trade: &Trade) -> ProtocolResult<bool> {
        for role in [TradeRole::Maker, TradeRole::Taker] {
            if let Some(tx_id) = trade.deposit_tx(role) {
                if !self.wallet.is_unspent(tx_id).await? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}
