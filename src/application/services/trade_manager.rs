//! # Trade Manager
//!
//! Orchestration of the full trade lifecycle on one peer.
//!
//! The manager owns the trade registry and wires the escrow coordinator,
//! the payment protocol and the payout calculator to the repositories and
//! the event channel. Commands are synchronous: they return once the
//! persisted transition (or a typed rejection) is observed. Inbound
//! messages are routed by trade id; anything unknown or malformed is
//! logged and dropped, never surfaced back to the transport.
//!
//! ## Locking
//!
//! Each trade has its own [`tokio::sync::Mutex`] in a [`DashMap`], so
//! different trades progress in parallel while operations on one trade are
//! serialized. The lock is held across in-memory transitions, repository
//! writes and transport sends, but never across wallet RPC: wallet calls
//! run against a snapshot, and the result is committed under the lock
//! after re-checking the reloaded trade.

use crate::application::error::{ProtocolError, ProtocolResult};
use crate::application::services::escrow_coordinator::{ConfirmationStatus, EscrowCoordinator};
use crate::application::services::payment_protocol::PaymentProtocol;
use crate::application::services::payout_calculator::{PayoutCalculator, PayoutSplit};
use crate::domain::entities::{Applied, Contract, Dispute, DisputeResult, Trade};
use crate::domain::events::{EventMetadata, TradeEvent};
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{
    Amount, DisputeChannel, DisputeReason, FatalReason, Price, PriceSpec, TradeId, TradePeriodPhase,
    TradePhase, TradeRole, TradeState, TraderId, TraderPosition, TxId,
};
use crate::infrastructure::persistence::traits::{OfferRepository, TradeRepository};
use crate::infrastructure::transport::messages::{
    TakeOfferRequest, TradeMessageEnvelope, TradeMessagePayload,
};
use crate::infrastructure::transport::signing::ContractSigner;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};

/// Local-node settings for the trade manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Length of the trade period started when the deposits unlock.
    pub trade_period_millis: i64,
    /// Maker's trade fee, frozen into every contract.
    pub maker_trade_fee: Amount,
    /// Taker's trade fee, frozen into every contract.
    pub taker_trade_fee: Amount,
    /// Where this node receives its payout.
    pub local_payout_address: String,
    /// Snapshot of this node's payment account, frozen into contracts.
    pub local_payment_account: serde_json::Value,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            // 24 hours.
            trade_period_millis: 86_400_000,
            maker_trade_fee: Amount::ZERO,
            taker_trade_fee: Amount::ZERO,
            local_payout_address: "payout:local".to_string(),
            local_payment_account: serde_json::Value::Null,
            event_capacity: 64,
        }
    }
}

impl ManagerConfig {
    /// Sets the trade period length.
    #[must_use]
    pub const fn with_trade_period_millis(mut self, millis: i64) -> Self {
        self.trade_period_millis = millis;
        self
    }

    /// Sets the trade fees frozen into new contracts.
    #[must_use]
    pub const fn with_trade_fees(mut self, maker: Amount, taker: Amount) -> Self {
        self.maker_trade_fee = maker;
        self.taker_trade_fee = taker;
        self
    }

    /// Sets the local payout address.
    #[must_use]
    pub fn with_payout_address(mut self, address: impl Into<String>) -> Self {
        self.local_payout_address = address.into();
        self
    }

    /// Sets the local payment-account snapshot.
    #[must_use]
    pub fn with_payment_account(mut self, account: serde_json::Value) -> Self {
        self.local_payment_account = account;
        self
    }
}

/// Coordinates every live trade on this peer.
#[derive(Debug)]
pub struct TradeManager {
    trades: Arc<dyn TradeRepository>,
    offers: Arc<dyn OfferRepository>,
    escrow: EscrowCoordinator,
    protocol: PaymentProtocol,
    calculator: PayoutCalculator,
    signer: Arc<dyn ContractSigner>,
    config: ManagerConfig,
    locks: DashMap<TradeId, Arc<Mutex<()>>>,
    events: broadcast::Sender<TradeEvent>,
}

impl TradeManager {
    /// Creates a new manager over the given repositories and services.
    #[must_use]
    pub fn new(
        trades: Arc<dyn TradeRepository>,
        offers: Arc<dyn OfferRepository>,
        escrow: EscrowCoordinator,
        protocol: PaymentProtocol,
        signer: Arc<dyn ContractSigner>,
        config: ManagerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            trades,
            offers,
            escrow,
            protocol,
            calculator: PayoutCalculator::new(),
            signer,
            config,
            locks: DashMap::new(),
            events,
        }
    }

    /// Subscribes to the lifecycle event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TradeEvent> {
        self.events.subscribe()
    }

    fn lock_for(&self, trade_id: &TradeId) -> Arc<Mutex<()>> {
        self.locks.entry(trade_id.clone()).or_default().clone()
    }

    async fn load(&self, trade_id: &TradeId) -> ProtocolResult<Trade> {
        self.trades
            .get(trade_id)
            .await?
            .ok_or_else(|| ProtocolError::trade_not_found(trade_id.as_str()))
    }

    async fn store(&self, trade: &Trade) -> ProtocolResult<()> {
        self.trades.save(trade).await?;
        Ok(())
    }

    /// Persists a manual-intervention note on the trade. Best effort: a
    /// repository failure here must not mask the original error.
    async fn record_error(&self, trade_id: &TradeId, message: String) {
        let lock = self.lock_for(trade_id);
        let _guard = lock.lock().await;
        match self.load(trade_id).await {
            Ok(mut trade) => {
                trade.set_error(message);
                if let Err(err) = self.store(&trade).await {
                    tracing::warn!(%trade_id, error = %err, "failed to persist trade error note");
                }
            }
            Err(err) => {
                tracing::warn!(%trade_id, error = %err, "failed to reload trade for error note");
            }
        }
    }

    fn emit(&self, event: TradeEvent) {
        // A send error only means nobody is subscribed.
        let _ = self.events.send(event);
    }

    fn emit_phase_change(&self, trade: &Trade, from: TradePhase) {
        if trade.phase() != from {
            self.emit(TradeEvent::PhaseChanged {
                metadata: EventMetadata::for_trade(trade.id().clone()),
                from,
                to: trade.phase(),
                state: trade.state(),
            });
        }
    }

    // ------------------------------------------------------------------
    // Trade creation
    // ------------------------------------------------------------------

    /// Accepts a take-offer request against a locally hosted offer,
    /// creating the trade with a fully signed contract.
    ///
    /// Taking the same offer twice returns the existing trade id.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::OfferNotFound`] for an unknown offer and
    /// [`ProtocolError::InvalidCommand`] if the amount is out of range,
    /// the offer is not available, or a market-margin offer is taken
    /// without a market price.
    pub async fn take_offer(
        &self,
        request: TakeOfferRequest,
        taker_signature: impl Into<String>,
        market_price: Option<Price>,
    ) -> ProtocolResult<TradeId> {
        let mut offer = self
            .offers
            .get(&request.offer_id)
            .await?
            .ok_or_else(|| ProtocolError::offer_not_found(request.offer_id.as_str()))?;
        let trade_id = TradeId::from_offer(offer.id());
        // Creation mutates under the same per-trade lock as every later
        // step, so two concurrent takes cannot both pass the check below.
        let lock = self.lock_for(&trade_id);
        let _guard = lock.lock().await;
        if self.trades.get(&trade_id).await?.is_some() {
            tracing::debug!(%trade_id, "offer already taken, returning existing trade");
            return Ok(trade_id);
        }
        offer.validate_take_amount(request.amount)?;
        let price = match (offer.price_spec(), market_price) {
            (spec, Some(market)) => spec.resolve(market)?,
            (PriceSpec::Fixed { price }, None) => *price,
            (PriceSpec::MarketMargin { .. }, None) => {
                return Err(ProtocolError::invalid_command(
                    "market-margin offer requires a market price",
                ));
            }
        };
        offer.reserve()?;

        let deposit = offer.security_deposit_for(request.amount);
        let maker_position = TraderPosition::derive(offer.direction(), TradeRole::Maker);
        let (buyer_address, seller_address) = match maker_position {
            TraderPosition::Buyer => (
                self.config.local_payout_address.clone(),
                request.taker_payout_address.clone(),
            ),
            TraderPosition::Seller => (
                request.taker_payout_address.clone(),
                self.config.local_payout_address.clone(),
            ),
        };
        let contract = Contract::builder(trade_id.clone(), offer.id().clone())
            .direction(offer.direction())
            .amount(request.amount)
            .price(price)
            .maker(
                offer.maker_id().clone(),
                self.signer.pub_key(),
                self.config.local_payment_account.clone(),
            )
            .taker(
                request.taker_id.clone(),
                request.taker_pub_key.clone(),
                request.taker_payment_account.clone(),
            )
            .payout_addresses(buyer_address, seller_address)
            .security_deposits(deposit, deposit)
            .trade_fees(self.config.maker_trade_fee, self.config.taker_trade_fee)
            .build()?;
        let maker_signature = self.signer.sign(&contract.canonical_bytes()?)?;
        let contract = contract
            .with_maker_signature(maker_signature)
            .with_taker_signature(taker_signature);

        let mut trade = Trade::new(trade_id.clone(), TradeRole::Maker, request.amount, price);
        trade.set_contract(contract)?;
        trade.transition_to(TradeState::ContractSigned)?;

        self.offers.save(&offer).await?;
        self.store(&trade).await?;
        self.emit(TradeEvent::TradeCreated {
            metadata: EventMetadata::for_trade(trade_id.clone()),
            role: TradeRole::Maker,
            amount: request.amount,
        });
        tracing::info!(%trade_id, amount = %request.amount, %price, "trade created from take-offer");
        Ok(trade_id)
    }

    // ------------------------------------------------------------------
    // Inbound messages
    // ------------------------------------------------------------------

    /// Routes an inbound peer message to the trade it belongs to.
    ///
    /// Never returns an error to the transport: rejected, malformed or
    /// unknown-trade messages are logged and dropped.
    pub async fn on_message(&self, envelope: TradeMessageEnvelope) {
        let trade_id = envelope.trade_id.clone();
        let name = envelope.payload.name();
        if let Err(err) = self.handle_message(&envelope).await {
            tracing::warn!(%trade_id, message = name, error = %err, "inbound message dropped");
        }
    }

    async fn handle_message(&self, envelope: &TradeMessageEnvelope) -> ProtocolResult<()> {
        match &envelope.payload {
            TradeMessagePayload::TakeOffer(request) => {
                self.verify_take_offer(envelope, request)?;
                self.take_offer(request.clone(), envelope.signature.clone(), None)
                    .await?;
                Ok(())
            }
            TradeMessagePayload::PaymentStarted { .. } => {
                let lock = self.lock_for(&envelope.trade_id);
                let _guard = lock.lock().await;
                let mut trade = self.load(&envelope.trade_id).await?;
                let from = trade.phase();
                let outcome = self.protocol.on_payment_started(&mut trade, envelope).await?;
                self.store(&trade).await?;
                if outcome.applied == Applied::Transitioned {
                    self.emit(TradeEvent::PaymentStartedReceived {
                        metadata: EventMetadata::for_trade(trade.id().clone()),
                    });
                }
                self.emit_phase_change(&trade, from);
                Ok(())
            }
            TradeMessagePayload::PaymentReceived => {
                let lock = self.lock_for(&envelope.trade_id);
                let _guard = lock.lock().await;
                let mut trade = self.load(&envelope.trade_id).await?;
                let from = trade.phase();
                let outcome = self
                    .protocol
                    .on_payment_received(&mut trade, envelope)
                    .await?;
                self.store(&trade).await?;
                if outcome.applied == Applied::Transitioned {
                    self.emit(TradeEvent::PaymentReceivedReceived {
                        metadata: EventMetadata::for_trade(trade.id().clone()),
                    });
                }
                self.emit_phase_change(&trade, from);
                Ok(())
            }
            TradeMessagePayload::Ack { acked_message_id } => {
                let lock = self.lock_for(&envelope.trade_id);
                let _guard = lock.lock().await;
                let mut trade = self.load(&envelope.trade_id).await?;
                self.protocol.on_ack(&mut trade, envelope, *acked_message_id)?;
                self.store(&trade).await
            }
        }
    }

    fn verify_take_offer(
        &self,
        envelope: &TradeMessageEnvelope,
        request: &TakeOfferRequest,
    ) -> ProtocolResult<()> {
        let bytes = envelope
            .signable_bytes()
            .map_err(|err| ProtocolError::invalid_command(err.to_string()))?;
        if !self
            .signer
            .verify(&request.taker_pub_key, &bytes, &envelope.signature)
        {
            return Err(ProtocolError::violation(
                TradeId::from_offer(&request.offer_id),
                "take-offer signature verification failed",
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Escrow funding
    // ------------------------------------------------------------------

    /// Publishes this node's deposit transaction for the trade.
    ///
    /// Returns `None` when no deposit is owed. Wallet RPC runs against a
    /// snapshot; the recorded tx is committed under the trade lock.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ManualInterventionRequired`] when the
    /// broadcast retry budget is exhausted.
    pub async fn fund_escrow(&self, trade_id: &TradeId) -> ProtocolResult<Option<TxId>> {
        let mut snapshot = self.load(trade_id).await?;
        if !snapshot.is_active() {
            return Err(ProtocolError::invalid_command(format!(
                "trade {trade_id} is no longer active"
            )));
        }
        let role = snapshot.role();
        let tx_id = match self.escrow.publish_deposit(&mut snapshot, role).await {
            Ok(Some(tx_id)) => tx_id,
            Ok(None) => return Ok(None),
            Err(err @ ProtocolError::ManualInterventionRequired { .. }) => {
                self.record_error(trade_id, err.to_string()).await;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let lock = self.lock_for(trade_id);
        let _guard = lock.lock().await;
        let mut trade = self.load(trade_id).await?;
        let from = trade.phase();
        trade.set_deposit_tx(role, tx_id.clone())?;
        Self::advance_when_both_deposits_in(&mut trade)?;
        self.store(&trade).await?;
        self.emit(TradeEvent::DepositPublished {
            metadata: EventMetadata::for_trade(trade_id.clone()),
            role,
            tx_id: tx_id.clone(),
        });
        self.emit_phase_change(&trade, from);
        Ok(Some(tx_id))
    }

    /// Records the counterparty's deposit transaction id.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidCommand`] for the local role, and
    /// the domain's double-spend rejection for a conflicting id.
    pub async fn record_peer_deposit(
        &self,
        trade_id: &TradeId,
        role: TradeRole,
        tx_id: TxId,
    ) -> ProtocolResult<()> {
        let lock = self.lock_for(trade_id);
        let _guard = lock.lock().await;
        let mut trade = self.load(trade_id).await?;
        if role == trade.role() {
            return Err(ProtocolError::invalid_command(
                "the local deposit is published through fund_escrow",
            ));
        }
        let from = trade.phase();
        trade.set_deposit_tx(role, tx_id.clone())?;
        Self::advance_when_both_deposits_in(&mut trade)?;
        self.store(&trade).await?;
        self.emit(TradeEvent::DepositPublished {
            metadata: EventMetadata::for_trade(trade_id.clone()),
            role,
            tx_id,
        });
        self.emit_phase_change(&trade, from);
        Ok(())
    }

    fn advance_when_both_deposits_in(trade: &mut Trade) -> ProtocolResult<()> {
        if trade.state() == TradeState::ContractSigned
            && trade.deposit_tx(TradeRole::Maker).is_some()
            && trade.deposit_tx(TradeRole::Taker).is_some()
        {
            trade.transition_to(TradeState::DepositTxsPublished)?;
        }
        Ok(())
    }

    /// Checks deposit confirmations and unlocks the escrow once both
    /// deposits reach their thresholds, starting the trade period.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidCommand`] unless the trade is
    /// awaiting confirmations, and wallet errors from the queries.
    pub async fn poll_confirmations(
        &self,
        trade_id: &TradeId,
        now: Timestamp,
    ) -> ProtocolResult<ConfirmationStatus> {
        let snapshot = self.load(trade_id).await?;
        if snapshot.state() != TradeState::DepositTxsPublished {
            return Err(ProtocolError::invalid_command(format!(
                "trade {trade_id} is not awaiting deposit confirmations"
            )));
        }
        let status = self.escrow.check_confirmations(&snapshot).await?;
        if status != ConfirmationStatus::Unlocked {
            return Ok(status);
        }

        let lock = self.lock_for(trade_id);
        let _guard = lock.lock().await;
        let mut trade = self.load(trade_id).await?;
        if trade.state() != TradeState::DepositTxsPublished {
            return Ok(status);
        }
        let from = trade.phase();
        trade.transition_to(TradeState::DepositTxsUnlockedInBlockchain)?;
        trade.start_trade_period(now, self.config.trade_period_millis);
        self.store(&trade).await?;
        let deadline = trade
            .max_trade_period_date()
            .unwrap_or_else(|| now.add_millis(self.config.trade_period_millis));
        self.emit(TradeEvent::DepositsUnlocked {
            metadata: EventMetadata::for_trade(trade_id.clone()),
            max_trade_period_date: deadline,
        });
        self.emit_phase_change(&trade, from);
        Ok(status)
    }

    // ------------------------------------------------------------------
    // Payment confirmation
    // ------------------------------------------------------------------

    /// Buyer command: the counter-currency payment was initiated.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidCommand`] unless this node is the
    /// buyer and the deposits are unlocked.
    pub async fn confirm_payment_started(
        &self,
        trade_id: &TradeId,
        counter_currency_tx_id: Option<String>,
    ) -> ProtocolResult<()> {
        let lock = self.lock_for(trade_id);
        let _guard = lock.lock().await;
        let mut trade = self.load(trade_id).await?;
        let from = trade.phase();
        self.protocol
            .send_payment_started(&mut trade, counter_currency_tx_id)
            .await?;
        self.store(&trade).await?;
        self.emit_phase_change(&trade, from);
        Ok(())
    }

    /// Seller command: the counter-currency payment arrived.
    ///
    /// Notifies the peer, then funds and broadcasts the cooperative
    /// payout. Returns the payout transaction id.
    ///
    /// Re-entrant: if the peer notification went out but the payout
    /// broadcast failed, calling again skips the notification and retries
    /// the publication; once the payout is recorded the existing tx id is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidCommand`] unless this node is the
    /// seller and the trade is in the payment-sent phase (or retrying a
    /// missing payout), and [`ProtocolError::ManualInterventionRequired`]
    /// when the payout broadcast retry budget is exhausted.
    pub async fn confirm_payment_received(&self, trade_id: &TradeId) -> ProtocolResult<TxId> {
        let (mut snapshot, split) = {
            let lock = self.lock_for(trade_id);
            let _guard = lock.lock().await;
            let mut trade = self.load(trade_id).await?;
            if let Some(existing) = trade.payout_tx() {
                return Ok(existing.clone());
            }
            let notified = matches!(
                trade.state(),
                TradeState::SellerSentPaymentReceivedMsg
                    | TradeState::SellerSawArrivedPaymentReceivedMsg
                    | TradeState::SellerStoredInMailboxPaymentReceivedMsg
                    | TradeState::SellerSendFailedPaymentReceivedMsg
            );
            if notified {
                tracing::info!(%trade_id, "payout missing after peer notification, retrying publication");
            } else {
                let from = trade.phase();
                self.protocol.send_payment_received(&mut trade).await?;
                self.store(&trade).await?;
                self.emit_phase_change(&trade, from);
            }
            let contract = trade
                .contract()
                .ok_or_else(|| ProtocolError::invalid_command("trade has no contract yet"))?;
            let split = self.calculator.cooperative(contract)?;
            (trade, split)
        };
        let tx_id = self.escrow.publish_payout(&mut snapshot, split).await?;
        self.commit_payout(trade_id, &tx_id, split).await?;
        Ok(tx_id)
    }

    async fn commit_payout(
        &self,
        trade_id: &TradeId,
        tx_id: &TxId,
        split: PayoutSplit,
    ) -> ProtocolResult<()> {
        let lock = self.lock_for(trade_id);
        let _guard = lock.lock().await;
        let mut trade = self.load(trade_id).await?;
        if !trade.is_active() {
            tracing::warn!(
                %trade_id,
                %tx_id,
                state = %trade.state(),
                "payout broadcast landed on a settled trade, not recording"
            );
            return Ok(());
        }
        if trade.payout_tx().is_none() {
            trade.set_payout_tx(tx_id.clone())?;
        }
        if trade.state() != TradeState::PayoutTxPublished && !trade.state().is_terminal() {
            trade.transition_to(TradeState::PayoutTxPublished)?;
        }
        self.store(&trade).await?;
        self.emit(TradeEvent::PayoutPublished {
            metadata: EventMetadata::for_trade(trade_id.clone()),
            tx_id: tx_id.clone(),
            buyer_payout: split.buyer,
            seller_payout: split.seller,
        });
        Ok(())
    }

    /// Completes a trade whose payout transaction is published.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidCommand`] if no payout has been
    /// published.
    pub async fn withdraw_funds(&self, trade_id: &TradeId) -> ProtocolResult<()> {
        let lock = self.lock_for(trade_id);
        let _guard = lock.lock().await;
        let mut trade = self.load(trade_id).await?;
        if trade.state() != TradeState::PayoutTxPublished {
            return Err(ProtocolError::invalid_command(format!(
                "trade {trade_id} has no published payout"
            )));
        }
        let from = trade.phase();
        trade.transition_to(TradeState::TradeCompleted)?;
        self.store(&trade).await?;
        self.emit_phase_change(&trade, from);
        tracing::info!(%trade_id, "trade completed");
        drop(_guard);
        self.locks.remove(trade_id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Disputes
    // ------------------------------------------------------------------

    /// Opens a dispute on a live trade.
    ///
    /// # Errors
    ///
    /// Returns the domain rejection if the trade already has a dispute or
    /// is not in a disputable phase.
    pub async fn open_dispute(
        &self,
        trade_id: &TradeId,
        opened_by: TraderId,
        channel: DisputeChannel,
        reason: DisputeReason,
    ) -> ProtocolResult<()> {
        let lock = self.lock_for(trade_id);
        let _guard = lock.lock().await;
        let mut trade = self.load(trade_id).await?;
        let dispute = Dispute::open(trade_id.clone(), opened_by, channel, reason);
        trade.set_dispute(dispute)?;
        self.store(&trade).await?;
        tracing::info!(%trade_id, %channel, %reason, "dispute opened");
        Ok(())
    }

    /// Applies a resolver's decision: validates the amounts against the
    /// escrow, closes the dispute, broadcasts the arbitrated payout and
    /// settles the trade.
    ///
    /// Re-entrant: if an earlier call closed the dispute but the payout
    /// broadcast failed, calling again re-publishes from the recorded
    /// decision; once the payout is recorded the existing tx id is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the domain's conservation rejection for amounts that do
    /// not satisfy the channel's payout rule, and
    /// [`ProtocolError::InvalidCommand`] if no dispute is open.
    pub async fn resolve_dispute(
        &self,
        trade_id: &TradeId,
        result: DisputeResult,
    ) -> ProtocolResult<TxId> {
        let reason = result.reason;
        let (mut snapshot, split) = {
            let lock = self.lock_for(trade_id);
            let _guard = lock.lock().await;
            let mut trade = self.load(trade_id).await?;
            if let Some(existing) = trade.payout_tx() {
                return Ok(existing.clone());
            }
            let dispute = trade
                .dispute()
                .ok_or_else(|| ProtocolError::invalid_command("no dispute on this trade"))?;
            let channel = dispute.channel();
            // A closed dispute without a payout means an earlier broadcast
            // failed; re-publish from the recorded decision.
            let decision = match dispute.result() {
                Some(recorded) => recorded.clone(),
                None => result,
            };
            let contract = trade
                .contract()
                .ok_or_else(|| ProtocolError::invalid_command("trade has no contract yet"))?;
            let split = PayoutSplit {
                buyer: decision.buyer_payout_amount,
                seller: decision.seller_payout_amount,
            };
            let split = self.calculator.validated(contract, split, channel)?;
            if trade.dispute().is_some_and(Dispute::is_open) {
                let dispute = trade
                    .dispute_mut()
                    .ok_or_else(|| ProtocolError::invalid_command("no dispute on this trade"))?;
                dispute.close(decision)?;
                self.store(&trade).await?;
            }
            (trade, split)
        };
        let tx_id = self.escrow.publish_payout(&mut snapshot, split).await?;

        let lock = self.lock_for(trade_id);
        let _guard = lock.lock().await;
        let mut trade = self.load(trade_id).await?;
        let from = trade.phase();
        trade.settle_disputed(tx_id.clone())?;
        self.store(&trade).await?;
        self.emit(TradeEvent::PayoutPublished {
            metadata: EventMetadata::for_trade(trade_id.clone()),
            tx_id: tx_id.clone(),
            buyer_payout: split.buyer,
            seller_payout: split.seller,
        });
        self.emit_phase_change(&trade, from);
        tracing::info!(%trade_id, %reason, "dispute settled");
        Ok(tx_id)
    }

    // ------------------------------------------------------------------
    // Failure handling
    // ------------------------------------------------------------------

    /// Moves a trade to the failed collection on a fatal condition.
    ///
    /// # Errors
    ///
    /// Returns the domain rejection for terminal trades.
    pub async fn fail_trade(&self, trade_id: &TradeId, reason: FatalReason) -> ProtocolResult<()> {
        let lock = self.lock_for(trade_id);
        let _guard = lock.lock().await;
        let mut trade = self.load(trade_id).await?;
        let from = trade.phase();
        trade.mark_failed(reason)?;
        self.store(&trade).await?;
        self.emit(TradeEvent::TradeFailed {
            metadata: EventMetadata::for_trade(trade_id.clone()),
            reason,
        });
        self.emit_phase_change(&trade, from);
        drop(_guard);
        self.locks.remove(trade_id);
        Ok(())
    }

    /// Re-admits a failed trade at the given resume state after checking
    /// that the recorded deposits are still unspent.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidCommand`] if the trade is not
    /// failed, and the domain rejection when the escrow can no longer
    /// back it.
    pub async fn unfail_trade(
        &self,
        trade_id: &TradeId,
        resume_state: TradeState,
    ) -> ProtocolResult<()> {
        let snapshot = self.load(trade_id).await?;
        if snapshot.phase() != TradePhase::Failed {
            return Err(ProtocolError::invalid_command(format!(
                "trade {trade_id} is not failed"
            )));
        }
        let unspent = self.escrow.deposits_unspent(&snapshot).await?;

        let lock = self.lock_for(trade_id);
        let _guard = lock.lock().await;
        let mut trade = self.load(trade_id).await?;
        let from = trade.phase();
        trade.set_deposits_unspent(unspent);
        trade.unfail(resume_state)?;
        trade.clear_error();
        self.store(&trade).await?;
        self.emit_phase_change(&trade, from);
        tracing::info!(%trade_id, resume_state = %resume_state, "trade re-admitted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Recovery and periodic work
    // ------------------------------------------------------------------

    /// Reloads every non-terminal trade after a restart.
    ///
    /// Resumption is keyed off the persisted state: resend bookkeeping and
    /// confirmation polling pick up where they left off on the next
    /// [`tick`](Self::tick), and no completed step is re-run.
    ///
    /// # Errors
    ///
    /// Returns repository errors from the reload.
    pub async fn recover_on_startup(&self) -> ProtocolResult<usize> {
        let active = self.trades.find_active().await?;
        for trade in &active {
            self.locks.entry(trade.id().clone()).or_default();
            tracing::info!(
                trade_id = %trade.id(),
                state = %trade.state(),
                resend_armed = trade.pending_resend().is_some(),
                "trade resumed"
            );
        }
        Ok(active.len())
    }

    /// Drives time-based work: confirmation polls, due resends and the
    /// trade-period sweep.
    ///
    /// Per-trade failures are logged and do not stop the sweep.
    ///
    /// # Errors
    ///
    /// Returns repository errors from the active-trade scans.
    pub async fn tick(&self, now: Timestamp) -> ProtocolResult<()> {
        for snapshot in self.trades.find_active().await? {
            let trade_id = snapshot.id().clone();
            if snapshot.state() == TradeState::DepositTxsPublished {
                if let Err(err) = self.poll_confirmations(&trade_id, now).await {
                    tracing::warn!(%trade_id, error = %err, "confirmation poll failed");
                }
            }
            if self.protocol.resend_due(&snapshot, now) {
                if let Err(err) = self.resend(&trade_id, now).await {
                    tracing::warn!(%trade_id, error = %err, "resend failed");
                }
            }
        }
        self.apply_trade_period_state(now).await
    }

    async fn resend(&self, trade_id: &TradeId, now: Timestamp) -> ProtocolResult<()> {
        let lock = self.lock_for(trade_id);
        let _guard = lock.lock().await;
        let mut trade = self.load(trade_id).await?;
        if !self.protocol.resend_due(&trade, now) {
            return Ok(());
        }
        self.protocol.resend_pending(&mut trade, now).await?;
        self.store(&trade).await
    }

    /// Advisory sweep over the trade period: emits
    /// [`TradeEvent::TradePeriodChanged`] once per crossed threshold,
    /// without touching the trade state.
    ///
    /// # Errors
    ///
    /// Returns repository errors from the scan.
    pub async fn apply_trade_period_state(&self, now: Timestamp) -> ProtocolResult<()> {
        for snapshot in self.trades.find_active().await? {
            let Some(period_phase) = snapshot.trade_period_phase(now) else {
                continue;
            };
            if period_phase == TradePeriodPhase::FirstHalf
                || snapshot.period_notified() == Some(period_phase)
            {
                continue;
            }
            let trade_id = snapshot.id().clone();
            let lock = self.lock_for(&trade_id);
            let _guard = lock.lock().await;
            let mut trade = self.load(&trade_id).await?;
            if trade.period_notified() == Some(period_phase) {
                continue;
            }
            trade.set_period_notified(period_phase);
            self.store(&trade).await?;
            tracing::info!(%trade_id, %period_phase, "trade period threshold crossed");
            self.emit(TradeEvent::TradePeriodChanged {
                metadata: EventMetadata::for_trade(trade_id),
                period_phase,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::services::escrow_coordinator::EscrowConfig;
    use crate::domain::entities::Offer;
    use crate::domain::value_objects::{OfferDirection, OfferId, OfferState};
    use crate::infrastructure::persistence::in_memory::{
        InMemoryOfferRepository, InMemoryTradeRepository,
    };
    use crate::infrastructure::transport::client::MessageTransport;
    use crate::infrastructure::transport::mock::MockTransport;
    use crate::infrastructure::transport::signing::MockSigner;
    use crate::infrastructure::wallet::client::{TxKind, WalletClient};
    use crate::infrastructure::wallet::mock::MockWallet;
    use rust_decimal::Decimal;

    const TRADE_AMOUNT: u64 = 10_000_000;
    const DEPOSIT: u64 = 1_500_000;
    const TOTAL_ESCROW: u64 = TRADE_AMOUNT + 2 * DEPOSIT;

    struct Harness {
        manager: TradeManager,
        wallet: Arc<MockWallet>,
        transport: Arc<MockTransport>,
        trades: Arc<InMemoryTradeRepository>,
        offers: Arc<InMemoryOfferRepository>,
    }

    fn harness() -> Harness {
        let wallet = Arc::new(MockWallet::with_balance(Amount::from_atomic(100_000_000)));
        let transport = Arc::new(MockTransport::new());
        let signer: Arc<dyn ContractSigner> = Arc::new(MockSigner::new("maker-key"));
        let trades = Arc::new(InMemoryTradeRepository::new());
        let offers = Arc::new(InMemoryOfferRepository::new());
        let escrow = EscrowCoordinator::new(
            Arc::clone(&wallet) as Arc<dyn WalletClient>,
            EscrowConfig::default(),
        );
        let protocol = PaymentProtocol::new(
            Arc::clone(&transport) as Arc<dyn MessageTransport>,
            Arc::clone(&signer),
        );
        let config = ManagerConfig::default()
            .with_payout_address("addr:maker")
            .with_payment_account(serde_json::json!({ "method": "SEPA", "iban": "DE02" }));
        let manager = TradeManager::new(
            Arc::clone(&trades) as Arc<dyn TradeRepository>,
            Arc::clone(&offers) as Arc<dyn OfferRepository>,
            escrow,
            protocol,
            signer,
            config,
        );
        Harness {
            manager,
            wallet,
            transport,
            trades,
            offers,
        }
    }

    // A SELL offer: the maker is the seller, the taker the buyer.
    async fn seed_offer(h: &Harness) -> OfferId {
        let mut offer = Offer::new(
            OfferId::new("offer-1"),
            TraderId::new("maker-1"),
            OfferDirection::Sell,
            Amount::from_atomic(TRADE_AMOUNT),
            Amount::from_atomic(1_000_000),
            PriceSpec::fixed(Price::new(Decimal::new(43_000, 0)).unwrap()),
            15,
            "acct-1",
        )
        .unwrap();
        offer.activate().unwrap();
        h.offers.save(&offer).await.unwrap();
        offer.id().clone()
    }

    fn take_request(offer_id: &OfferId) -> TakeOfferRequest {
        TakeOfferRequest {
            offer_id: offer_id.clone(),
            taker_id: TraderId::new("taker-1"),
            amount: Amount::from_atomic(TRADE_AMOUNT),
            taker_pub_key: "taker-key".to_string(),
            taker_payout_address: "addr:taker".to_string(),
            taker_payment_account: serde_json::json!({ "method": "SEPA", "iban": "FR76" }),
        }
    }

    fn taker_envelope(trade_id: TradeId, payload: TradeMessagePayload) -> TradeMessageEnvelope {
        let signer = MockSigner::new("taker-key");
        let envelope =
            TradeMessageEnvelope::new(trade_id, TraderId::new("taker-1"), payload);
        let signature = signer.sign(&envelope.signable_bytes().unwrap()).unwrap();
        envelope.with_signature(signature)
    }

    async fn trade_state(h: &Harness, trade_id: &TradeId) -> TradeState {
        h.trades.get(trade_id).await.unwrap().unwrap().state()
    }

    async fn created_trade(h: &Harness) -> TradeId {
        let offer_id = seed_offer(h).await;
        h.manager
            .take_offer(take_request(&offer_id), "sig-taker", None)
            .await
            .unwrap()
    }

    async fn unlocked_trade(h: &Harness) -> TradeId {
        let trade_id = created_trade(h).await;
        let maker_tx = h.manager.fund_escrow(&trade_id).await.unwrap().unwrap();
        let taker_tx = TxId::new("tx-taker-deposit");
        h.manager
            .record_peer_deposit(&trade_id, TradeRole::Taker, taker_tx.clone())
            .await
            .unwrap();
        h.wallet.set_confirmations(maker_tx, 10);
        h.wallet.set_confirmations(taker_tx, 10);
        h.manager
            .poll_confirmations(&trade_id, Timestamp::now())
            .await
            .unwrap();
        trade_id
    }

    async fn payment_started_trade(h: &Harness) -> TradeId {
        let trade_id = unlocked_trade(h).await;
        h.manager
            .on_message(taker_envelope(
                trade_id.clone(),
                TradeMessagePayload::PaymentStarted {
                    counter_currency_tx_id: Some("bank-ref-7".to_string()),
                },
            ))
            .await;
        assert_eq!(
            trade_state(h, &trade_id).await,
            TradeState::SellerReceivedPaymentSentMsg
        );
        trade_id
    }

    mod creation {
        use super::*;

        #[tokio::test]
        async fn take_offer_creates_a_signed_trade_and_reserves_the_offer() {
            let h = harness();
            let mut events = h.manager.subscribe();
            let offer_id = seed_offer(&h).await;

            let trade_id = h
                .manager
                .take_offer(take_request(&offer_id), "sig-taker", None)
                .await
                .unwrap();

            let trade = h.trades.get(&trade_id).await.unwrap().unwrap();
            assert_eq!(trade.state(), TradeState::ContractSigned);
            assert_eq!(trade.role(), TradeRole::Maker);
            let contract = trade.contract().unwrap();
            assert!(contract.is_fully_signed());
            assert_eq!(contract.seller_payout_address(), "addr:maker");
            assert_eq!(contract.buyer_payout_address(), "addr:taker");

            let offer = h.offers.get(&offer_id).await.unwrap().unwrap();
            assert_eq!(offer.state(), OfferState::Reserved);

            match events.try_recv().unwrap() {
                TradeEvent::TradeCreated { amount, role, .. } => {
                    assert_eq!(amount, Amount::from_atomic(TRADE_AMOUNT));
                    assert_eq!(role, TradeRole::Maker);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }

        #[tokio::test]
        async fn taking_the_same_offer_twice_returns_the_existing_trade() {
            let h = harness();
            let offer_id = seed_offer(&h).await;
            let first = h
                .manager
                .take_offer(take_request(&offer_id), "sig-taker", None)
                .await
                .unwrap();
            let second = h
                .manager
                .take_offer(take_request(&offer_id), "sig-taker", None)
                .await
                .unwrap();
            assert_eq!(first, second);
            assert_eq!(h.trades.count().await.unwrap(), 1);
        }

        #[tokio::test]
        async fn rival_take_cannot_replace_the_existing_trade() {
            let h = harness();
            let offer_id = seed_offer(&h).await;
            let first = h
                .manager
                .take_offer(take_request(&offer_id), "sig-taker", None)
                .await
                .unwrap();

            let mut rival = take_request(&offer_id);
            rival.taker_id = TraderId::new("taker-2");
            rival.taker_pub_key = "rival-key".to_string();
            let second = h.manager.take_offer(rival, "sig-rival", None).await.unwrap();

            assert_eq!(first, second);
            assert_eq!(h.trades.count().await.unwrap(), 1);
            let trade = h.trades.get(&first).await.unwrap().unwrap();
            assert_eq!(trade.contract().unwrap().taker_id().as_str(), "taker-1");
        }

        #[tokio::test]
        async fn margin_offer_requires_a_market_price() {
            let h = harness();
            let mut offer = Offer::new(
                OfferId::new("offer-m"),
                TraderId::new("maker-1"),
                OfferDirection::Sell,
                Amount::from_atomic(TRADE_AMOUNT),
                Amount::from_atomic(1_000_000),
                PriceSpec::market_margin(Decimal::new(2, 0), None),
                15,
                "acct-1",
            )
            .unwrap();
            offer.activate().unwrap();
            h.offers.save(&offer).await.unwrap();

            let err = h
                .manager
                .take_offer(take_request(offer.id()), "sig-taker", None)
                .await
                .unwrap_err();
            assert!(matches!(err, ProtocolError::InvalidCommand(_)));

            let price = Price::new(Decimal::new(43_000, 0)).unwrap();
            let trade_id = h
                .manager
                .take_offer(take_request(offer.id()), "sig-taker", Some(price))
                .await
                .unwrap();
            let trade = h.trades.get(&trade_id).await.unwrap().unwrap();
            assert_eq!(trade.price().value(), Decimal::new(43_860, 0));
        }

        #[tokio::test]
        async fn tampered_take_offer_is_dropped() {
            let h = harness();
            let offer_id = seed_offer(&h).await;
            let envelope = TradeMessageEnvelope::new(
                TradeId::from_offer(&offer_id),
                TraderId::new("taker-1"),
                TradeMessagePayload::TakeOffer(take_request(&offer_id)),
            )
            .with_signature("forged");

            h.manager.on_message(envelope).await;

            assert_eq!(h.trades.count().await.unwrap(), 0);
        }

        #[tokio::test]
        async fn signed_take_offer_message_creates_the_trade() {
            let h = harness();
            let offer_id = seed_offer(&h).await;
            let envelope = taker_envelope(
                TradeId::from_offer(&offer_id),
                TradeMessagePayload::TakeOffer(take_request(&offer_id)),
            );

            h.manager.on_message(envelope).await;

            assert_eq!(h.trades.count().await.unwrap(), 1);
        }
    }

    mod escrow_funding {
        use super::*;

        #[tokio::test]
        async fn both_deposits_advance_the_trade_to_deposit_published() {
            let h = harness();
            let trade_id = created_trade(&h).await;

            let maker_tx = h.manager.fund_escrow(&trade_id).await.unwrap().unwrap();
            assert_eq!(trade_state(&h, &trade_id).await, TradeState::ContractSigned);

            // Selling maker escrows trade amount plus security deposit.
            let drafts = h.wallet.published();
            assert_eq!(drafts.len(), 1);
            assert_eq!(
                drafts[0].outputs[0].amount,
                Amount::from_atomic(TRADE_AMOUNT + DEPOSIT)
            );

            h.manager
                .record_peer_deposit(&trade_id, TradeRole::Taker, TxId::new("tx-taker"))
                .await
                .unwrap();
            assert_eq!(
                trade_state(&h, &trade_id).await,
                TradeState::DepositTxsPublished
            );

            let trade = h.trades.get(&trade_id).await.unwrap().unwrap();
            assert_eq!(trade.deposit_tx(TradeRole::Maker), Some(&maker_tx));
        }

        #[tokio::test(start_paused = true)]
        async fn exhausted_broadcast_retries_leave_an_error_note() {
            let h = harness();
            let trade_id = created_trade(&h).await;
            h.wallet.fail_next_broadcasts(10);

            let err = h.manager.fund_escrow(&trade_id).await.unwrap_err();
            assert!(matches!(
                err,
                ProtocolError::ManualInterventionRequired { .. }
            ));

            // The trade stays active with the note persisted for an operator.
            let trade = h.trades.get(&trade_id).await.unwrap().unwrap();
            assert!(trade.is_active());
            assert!(trade.error().is_some());
            assert!(trade.deposit_tx(TradeRole::Maker).is_none());
        }

        #[tokio::test]
        async fn recording_the_local_role_as_peer_deposit_is_rejected() {
            let h = harness();
            let trade_id = created_trade(&h).await;
            let err = h
                .manager
                .record_peer_deposit(&trade_id, TradeRole::Maker, TxId::new("tx-x"))
                .await
                .unwrap_err();
            assert!(matches!(err, ProtocolError::InvalidCommand(_)));
        }

        #[tokio::test]
        async fn confirmed_deposits_unlock_the_escrow_and_start_the_period() {
            let h = harness();
            let mut events = h.manager.subscribe();
            let trade_id = unlocked_trade(&h).await;

            assert_eq!(
                trade_state(&h, &trade_id).await,
                TradeState::DepositTxsUnlockedInBlockchain
            );
            let trade = h.trades.get(&trade_id).await.unwrap().unwrap();
            assert!(trade.max_trade_period_date().is_some());

            let mut saw_unlock = false;
            while let Ok(event) = events.try_recv() {
                if matches!(event, TradeEvent::DepositsUnlocked { .. }) {
                    saw_unlock = true;
                }
            }
            assert!(saw_unlock);
        }

        #[tokio::test]
        async fn short_confirmations_leave_the_trade_pending() {
            let h = harness();
            let trade_id = created_trade(&h).await;
            let maker_tx = h.manager.fund_escrow(&trade_id).await.unwrap().unwrap();
            let taker_tx = TxId::new("tx-taker-deposit");
            h.manager
                .record_peer_deposit(&trade_id, TradeRole::Taker, taker_tx.clone())
                .await
                .unwrap();
            h.wallet.set_confirmations(maker_tx, 10);
            h.wallet.set_confirmations(taker_tx, 3);

            let status = h
                .manager
                .poll_confirmations(&trade_id, Timestamp::now())
                .await
                .unwrap();
            assert_eq!(status, ConfirmationStatus::StillPending { maker: 10, taker: 3 });
            assert_eq!(
                trade_state(&h, &trade_id).await,
                TradeState::DepositTxsPublished
            );
        }
    }

    mod payment_flow {
        use super::*;

        #[tokio::test]
        async fn inbound_payment_started_is_recorded_and_acked() {
            let h = harness();
            let mut events = h.manager.subscribe();
            let trade_id = payment_started_trade(&h).await;

            let trade = h.trades.get(&trade_id).await.unwrap().unwrap();
            assert_eq!(trade.counter_currency_tx_id(), Some("bank-ref-7"));

            let sent = h.transport.sent();
            let (recipient, ack) = sent.last().unwrap();
            assert_eq!(recipient, &TraderId::new("taker-1"));
            assert!(matches!(ack.payload, TradeMessagePayload::Ack { .. }));

            let mut saw_event = false;
            while let Ok(event) = events.try_recv() {
                if matches!(event, TradeEvent::PaymentStartedReceived { .. }) {
                    saw_event = true;
                }
            }
            assert!(saw_event);
        }

        #[tokio::test]
        async fn replayed_payment_started_is_reacked_without_new_transition() {
            let h = harness();
            let trade_id = unlocked_trade(&h).await;
            let envelope = taker_envelope(
                trade_id.clone(),
                TradeMessagePayload::PaymentStarted {
                    counter_currency_tx_id: None,
                },
            );

            h.manager.on_message(envelope.clone()).await;
            let version_after_first = h.trades.get(&trade_id).await.unwrap().unwrap().version();
            h.manager.on_message(envelope).await;

            assert_eq!(
                trade_state(&h, &trade_id).await,
                TradeState::SellerReceivedPaymentSentMsg
            );
            // Two acks went out either way.
            assert_eq!(h.transport.sent_count(), 2);
            let version_after_second = h.trades.get(&trade_id).await.unwrap().unwrap().version();
            assert_eq!(version_after_first, version_after_second);
        }

        #[tokio::test]
        async fn phase_incompatible_payment_started_is_dropped() {
            let h = harness();
            let trade_id = created_trade(&h).await;
            h.manager
                .on_message(taker_envelope(
                    trade_id.clone(),
                    TradeMessagePayload::PaymentStarted {
                        counter_currency_tx_id: None,
                    },
                ))
                .await;
            assert_eq!(trade_state(&h, &trade_id).await, TradeState::ContractSigned);
            assert_eq!(h.transport.sent_count(), 0);
        }

        #[tokio::test]
        async fn unknown_trade_messages_are_dropped() {
            let h = harness();
            h.manager
                .on_message(taker_envelope(
                    TradeId::new("no-such-trade"),
                    TradeMessagePayload::PaymentReceived,
                ))
                .await;
            assert_eq!(h.trades.count().await.unwrap(), 0);
            assert_eq!(h.transport.sent_count(), 0);
        }

        #[tokio::test]
        async fn cooperative_payout_follows_payment_received() {
            let h = harness();
            let mut events = h.manager.subscribe();
            let trade_id = payment_started_trade(&h).await;

            let payout_tx = h.manager.confirm_payment_received(&trade_id).await.unwrap();

            let trade = h.trades.get(&trade_id).await.unwrap().unwrap();
            assert_eq!(trade.state(), TradeState::PayoutTxPublished);
            assert_eq!(trade.payout_tx(), Some(&payout_tx));

            let drafts = h.wallet.published();
            let payout = drafts.last().unwrap();
            assert_eq!(payout.outputs.len(), 2);
            assert_eq!(payout.outputs[0].address, "addr:taker");
            assert_eq!(
                payout.outputs[0].amount,
                Amount::from_atomic(TRADE_AMOUNT + DEPOSIT)
            );
            assert_eq!(payout.outputs[1].amount, Amount::from_atomic(DEPOSIT));

            let mut split = None;
            while let Ok(event) = events.try_recv() {
                if let TradeEvent::PayoutPublished {
                    buyer_payout,
                    seller_payout,
                    ..
                } = event
                {
                    split = Some((buyer_payout, seller_payout));
                }
            }
            assert_eq!(
                split,
                Some((
                    Amount::from_atomic(TRADE_AMOUNT + DEPOSIT),
                    Amount::from_atomic(DEPOSIT)
                ))
            );

            h.manager.withdraw_funds(&trade_id).await.unwrap();
            assert_eq!(trade_state(&h, &trade_id).await, TradeState::TradeCompleted);
            assert!(h.trades.find_active().await.unwrap().is_empty());
            // Completed trades no longer hold a registry slot.
            assert!(!h.manager.locks.contains_key(&trade_id));
        }

        #[tokio::test]
        async fn withdraw_before_payout_is_rejected() {
            let h = harness();
            let trade_id = unlocked_trade(&h).await;
            let err = h.manager.withdraw_funds(&trade_id).await.unwrap_err();
            assert!(matches!(err, ProtocolError::InvalidCommand(_)));
        }

        #[tokio::test(start_paused = true)]
        async fn payout_publication_is_retryable_after_broadcast_failure() {
            let h = harness();
            let trade_id = payment_started_trade(&h).await;

            h.wallet.fail_next_broadcasts(4);
            let err = h
                .manager
                .confirm_payment_received(&trade_id)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                ProtocolError::ManualInterventionRequired { .. }
            ));
            assert_eq!(
                trade_state(&h, &trade_id).await,
                TradeState::SellerSawArrivedPaymentReceivedMsg
            );

            let payout_tx = h.manager.confirm_payment_received(&trade_id).await.unwrap();
            assert_eq!(
                trade_state(&h, &trade_id).await,
                TradeState::PayoutTxPublished
            );
            // The peer was notified exactly once across both calls.
            let notifications = h
                .transport
                .sent()
                .iter()
                .filter(|(_, envelope)| {
                    matches!(envelope.payload, TradeMessagePayload::PaymentReceived)
                })
                .count();
            assert_eq!(notifications, 1);

            // A third call is a no-op returning the recorded tx.
            let again = h.manager.confirm_payment_received(&trade_id).await.unwrap();
            assert_eq!(again, payout_tx);
        }

        #[tokio::test]
        async fn payout_commit_is_dropped_for_a_settled_trade() {
            let h = harness();
            let trade_id = unlocked_trade(&h).await;
            h.manager
                .fail_trade(&trade_id, FatalReason::OperatorAbort)
                .await
                .unwrap();

            h.manager
                .commit_payout(
                    &trade_id,
                    &TxId::new("tx-late-payout"),
                    PayoutSplit {
                        buyer: Amount::from_atomic(TRADE_AMOUNT + DEPOSIT),
                        seller: Amount::from_atomic(DEPOSIT),
                    },
                )
                .await
                .unwrap();

            let trade = h.trades.get(&trade_id).await.unwrap().unwrap();
            assert_eq!(trade.state(), TradeState::Failed);
            assert!(trade.payout_tx().is_none());
        }
    }

    mod resends {
        use super::*;

        #[tokio::test]
        async fn restart_does_not_resend_until_the_backoff_elapses() {
            let h = harness();
            let trade_id = payment_started_trade(&h).await;

            // Seller's payment-received message lands in the mailbox, so
            // the resend stays armed.
            h.transport
                .push_outcome(Ok(crate::infrastructure::transport::client::SendOutcome::MailboxStored));
            h.manager.confirm_payment_received(&trade_id).await.unwrap();
            let pending_id = h
                .trades
                .get(&trade_id)
                .await
                .unwrap()
                .unwrap()
                .pending_resend()
                .unwrap()
                .message_id;
            let sent_before = h.transport.sent_count();

            let resumed = h.manager.recover_on_startup().await.unwrap();
            assert_eq!(resumed, 1);
            h.manager.tick(Timestamp::now()).await.unwrap();
            assert_eq!(h.transport.sent_count(), sent_before);

            h.manager
                .tick(Timestamp::now().add_millis(31_000))
                .await
                .unwrap();
            assert_eq!(h.transport.sent_count(), sent_before + 1);
            let sent = h.transport.sent();
            let (_, resent) = sent.last().unwrap();
            assert_eq!(resent.message_id, pending_id);
            assert!(matches!(
                resent.payload,
                TradeMessagePayload::PaymentReceived
            ));
        }
    }

    mod disputes {
        use super::*;

        fn arbitrator_result(
            trade_id: &TradeId,
            buyer: u64,
            seller: u64,
        ) -> DisputeResult {
            DisputeResult {
                trade_id: trade_id.clone(),
                opened_by: TraderId::new("taker-1"),
                winner: TraderPosition::Buyer,
                reason: DisputeReason::SellerNotResponding,
                buyer_payout_amount: Amount::from_atomic(buyer),
                seller_payout_amount: Amount::from_atomic(seller),
                summary_notes: "buyer never received goods".to_string(),
                closed_at: Timestamp::now(),
            }
        }

        #[tokio::test]
        async fn arbitrated_payout_settles_a_disputed_trade() {
            let h = harness();
            let trade_id = unlocked_trade(&h).await;
            h.manager
                .open_dispute(
                    &trade_id,
                    TraderId::new("taker-1"),
                    DisputeChannel::Arbitrator,
                    DisputeReason::SellerNotResponding,
                )
                .await
                .unwrap();

            h.manager
                .resolve_dispute(&trade_id, arbitrator_result(&trade_id, TOTAL_ESCROW, 0))
                .await
                .unwrap();

            let trade = h.trades.get(&trade_id).await.unwrap().unwrap();
            assert_eq!(trade.state(), TradeState::PayoutTxPublished);
            let payout = h.wallet.published().pop().unwrap();
            assert_eq!(payout.outputs.len(), 1);
            assert_eq!(payout.outputs[0].address, "addr:taker");
            assert_eq!(payout.outputs[0].amount, Amount::from_atomic(TOTAL_ESCROW));
        }

        #[tokio::test]
        async fn arbitrator_split_must_exhaust_the_escrow() {
            let h = harness();
            let trade_id = unlocked_trade(&h).await;
            h.manager
                .open_dispute(
                    &trade_id,
                    TraderId::new("taker-1"),
                    DisputeChannel::Arbitrator,
                    DisputeReason::SellerNotResponding,
                )
                .await
                .unwrap();

            let err = h
                .manager
                .resolve_dispute(
                    &trade_id,
                    arbitrator_result(&trade_id, TOTAL_ESCROW - 1_000_000, 0),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ProtocolError::Domain(_)));

            // Rejected before close: the dispute stays open.
            let trade = h.trades.get(&trade_id).await.unwrap().unwrap();
            assert!(trade.dispute().unwrap().is_open());
        }

        #[tokio::test(start_paused = true)]
        async fn settlement_is_retryable_after_a_failed_broadcast() {
            let h = harness();
            let trade_id = unlocked_trade(&h).await;
            h.manager
                .open_dispute(
                    &trade_id,
                    TraderId::new("taker-1"),
                    DisputeChannel::Arbitrator,
                    DisputeReason::SellerNotResponding,
                )
                .await
                .unwrap();

            h.wallet.fail_next_broadcasts(4);
            let err = h
                .manager
                .resolve_dispute(&trade_id, arbitrator_result(&trade_id, TOTAL_ESCROW, 0))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                ProtocolError::ManualInterventionRequired { .. }
            ));
            // Closed but unpaid; the trade is still awaiting its payout.
            let trade = h.trades.get(&trade_id).await.unwrap().unwrap();
            assert!(!trade.dispute().unwrap().is_open());
            assert!(trade.payout_tx().is_none());

            let payout_tx = h
                .manager
                .resolve_dispute(&trade_id, arbitrator_result(&trade_id, TOTAL_ESCROW, 0))
                .await
                .unwrap();
            let trade = h.trades.get(&trade_id).await.unwrap().unwrap();
            assert_eq!(trade.state(), TradeState::PayoutTxPublished);
            assert_eq!(trade.payout_tx(), Some(&payout_tx));
            let payouts = h
                .wallet
                .published()
                .into_iter()
                .filter(|draft| draft.kind == TxKind::Payout)
                .count();
            assert_eq!(payouts, 1);

            // Resolving again returns the recorded tx without broadcasting.
            let again = h
                .manager
                .resolve_dispute(&trade_id, arbitrator_result(&trade_id, TOTAL_ESCROW, 0))
                .await
                .unwrap();
            assert_eq!(again, payout_tx);
        }

        #[tokio::test]
        async fn disputes_are_scoped_to_escrowed_trades() {
            let h = harness();
            let trade_id = created_trade(&h).await;
            let err = h
                .manager
                .open_dispute(
                    &trade_id,
                    TraderId::new("taker-1"),
                    DisputeChannel::Arbitrator,
                    DisputeReason::SellerNotResponding,
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ProtocolError::Domain(_)));
            let trade = h.trades.get(&trade_id).await.unwrap().unwrap();
            assert!(trade.dispute().is_none());
        }

        #[tokio::test]
        async fn resolving_without_a_dispute_is_rejected() {
            let h = harness();
            let trade_id = unlocked_trade(&h).await;
            let err = h
                .manager
                .resolve_dispute(&trade_id, arbitrator_result(&trade_id, TOTAL_ESCROW, 0))
                .await
                .unwrap_err();
            assert!(matches!(err, ProtocolError::InvalidCommand(_)));
        }
    }

    mod failure {
        use super::*;

        #[tokio::test]
        async fn failed_trade_can_be_readmitted_while_deposits_are_unspent() {
            let h = harness();
            let mut events = h.manager.subscribe();
            let trade_id = unlocked_trade(&h).await;

            h.manager
                .fail_trade(&trade_id, FatalReason::OperatorAbort)
                .await
                .unwrap();
            assert_eq!(trade_state(&h, &trade_id).await, TradeState::Failed);
            assert_eq!(h.trades.find_failed().await.unwrap().len(), 1);
            assert!(!h.manager.locks.contains_key(&trade_id));

            let mut saw_failed = false;
            while let Ok(event) = events.try_recv() {
                if matches!(event, TradeEvent::TradeFailed { reason: FatalReason::OperatorAbort, .. }) {
                    saw_failed = true;
                }
            }
            assert!(saw_failed);

            h.manager
                .unfail_trade(&trade_id, TradeState::DepositTxsUnlockedInBlockchain)
                .await
                .unwrap();
            assert_eq!(
                trade_state(&h, &trade_id).await,
                TradeState::DepositTxsUnlockedInBlockchain
            );
        }

        #[tokio::test]
        async fn spent_deposit_blocks_readmission() {
            let h = harness();
            let trade_id = unlocked_trade(&h).await;
            let maker_tx = h
                .trades
                .get(&trade_id)
                .await
                .unwrap()
                .unwrap()
                .deposit_tx(TradeRole::Maker)
                .cloned()
                .unwrap();
            h.manager
                .fail_trade(&trade_id, FatalReason::DepositDoubleSpend)
                .await
                .unwrap();
            h.wallet.mark_spent(maker_tx);

            let err = h
                .manager
                .unfail_trade(&trade_id, TradeState::DepositTxsUnlockedInBlockchain)
                .await
                .unwrap_err();
            assert!(matches!(err, ProtocolError::Domain(_)));
            assert_eq!(trade_state(&h, &trade_id).await, TradeState::Failed);
        }

        #[tokio::test]
        async fn unfailing_an_active_trade_is_rejected() {
            let h = harness();
            let trade_id = unlocked_trade(&h).await;
            let err = h
                .manager
                .unfail_trade(&trade_id, TradeState::DepositTxsPublished)
                .await
                .unwrap_err();
            assert!(matches!(err, ProtocolError::InvalidCommand(_)));
        }
    }

    mod trade_period {
        use super::*;

        #[tokio::test]
        async fn thresholds_notify_once_each() {
            let h = harness();
            let mut events = h.manager.subscribe();
            let trade_id = unlocked_trade(&h).await;
            let start = h
                .trades
                .get(&trade_id)
                .await
                .unwrap()
                .unwrap()
                .max_trade_period_date()
                .unwrap()
                .add_millis(-86_400_000);

            let second_half = start.add_millis(86_400_000 * 6 / 10);
            h.manager.apply_trade_period_state(second_half).await.unwrap();
            h.manager.apply_trade_period_state(second_half).await.unwrap();

            let over = start.add_millis(86_400_000 + 1_000);
            h.manager.apply_trade_period_state(over).await.unwrap();

            let mut period_events = Vec::new();
            while let Ok(event) = events.try_recv() {
                if let TradeEvent::TradePeriodChanged { period_phase, .. } = event {
                    period_events.push(period_phase);
                }
            }
            assert_eq!(
                period_events,
                vec![TradePeriodPhase::SecondHalf, TradePeriodPhase::Over]
            );
        }

        #[tokio::test]
        async fn trades_without_a_started_period_are_skipped() {
            let h = harness();
            let _trade_id = created_trade(&h).await;
            let mut events = h.manager.subscribe();
            h.manager
                .apply_trade_period_state(Timestamp::now().add_millis(999_999_999))
                .await
                .unwrap();
            assert!(events.try_recv().is_err());
        }
    }

    mod recovery {
        use super::*;

        #[tokio::test]
        async fn startup_reloads_only_active_trades() {
            let h = harness();
            let _active = unlocked_trade(&h).await;
            // A second, failed trade under a different id.
            let mut other = Trade::new(
                TradeId::new("other-trade"),
                TradeRole::Maker,
                Amount::from_atomic(1_000_000),
                Price::new(Decimal::new(100, 0)).unwrap(),
            );
            other.mark_failed(FatalReason::OperatorAbort).unwrap();
            h.trades.save(&other).await.unwrap();

            let resumed = h.manager.recover_on_startup().await.unwrap();
            assert_eq!(resumed, 1);
        }
    }
}
