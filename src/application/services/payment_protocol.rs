//! # Payment Confirmation Protocol
//!
//! The signed payment-started / payment-received message exchange.
//!
//! The buyer asserts the fiat-side payment was initiated; the seller
//! asserts it arrived. Both assertions travel as signed messages that are
//! acknowledged by the receiver and resent by the sender until the ack
//! arrives. Delivery is at-least-once; replay detection on the trade
//! state machine makes the *effects* exactly-once.
//!
//! # Sender states
//!
//! ```text
//! Sent ------ delivery observed --> SawArrived (resend disarmed)
//! Sent ------ peer offline -------> StoredInMailbox ---+
//! Sent ------ send error --------> SendFailed ---------+-- ack --> SawArrived
//!                                        ^             |
//!                                        +-- resend ---+
//! ```

use crate::application::error::{ProtocolError, ProtocolResult};
use crate::application::services::backoff::BackoffPolicy;
use crate::domain::entities::trade::{Applied, PaymentMessageKind, Trade};
use crate::domain::errors::DomainError;
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{MessageId, TradePhase, TradeState, TraderId, TraderPosition};
use crate::infrastructure::transport::client::{MessageTransport, SendOutcome};
use crate::infrastructure::transport::messages::{TradeMessageEnvelope, TradeMessagePayload};
use crate::infrastructure::transport::signing::ContractSigner;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of handling an inbound payment message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundOutcome {
    /// Whether the message advanced the trade or was a replay.
    pub applied: Applied,
    /// The ack to send back; also produced for replays so the sender
    /// stops resending.
    pub ack: TradeMessageEnvelope,
}

/// Drives the payment confirmation exchange for one trade at a time.
#[derive(Debug, Clone)]
pub struct PaymentProtocol {
    transport: Arc<dyn MessageTransport>,
    signer: Arc<dyn ContractSigner>,
    resend_backoff: BackoffPolicy,
}

impl PaymentProtocol {
    /// Creates a protocol instance over the given transport and signer.
    #[must_use]
    pub fn new(transport: Arc<dyn MessageTransport>, signer: Arc<dyn ContractSigner>) -> Self {
        Self {
            transport,
            signer,
            resend_backoff: BackoffPolicy::unbounded(
                Duration::from_secs(30),
                Duration::from_secs(600),
            ),
        }
    }

    /// Overrides the resend schedule.
    #[must_use]
    pub fn with_resend_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.resend_backoff = backoff;
        self
    }

    fn local_position(trade: &Trade) -> ProtocolResult<TraderPosition> {
        let contract = trade
            .contract()
            .ok_or_else(|| ProtocolError::invalid_command("trade has no contract yet"))?;
        Ok(contract.position_of(trade.role()))
    }

    fn counterparty_id(trade: &Trade) -> ProtocolResult<TraderId> {
        let contract = trade
            .contract()
            .ok_or_else(|| ProtocolError::invalid_command("trade has no contract yet"))?;
        Ok(contract
            .trader_of(Self::local_position(trade)?.counterparty())
            .clone())
    }

    fn signed(&self, mut envelope: TradeMessageEnvelope) -> ProtocolResult<TradeMessageEnvelope> {
        let bytes = envelope
            .signable_bytes()
            .map_err(|e| ProtocolError::Domain(DomainError::ValidationError(e.to_string())))?;
        envelope.signature = self.signer.sign(&bytes)?;
        Ok(envelope)
    }

    /// Checks sender identity and signature of an inbound envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ProtocolViolation`] if the sender is not
    /// the counterparty or the signature does not verify; the message must
    /// be dropped without touching the trade.
    pub fn verify_inbound(
        &self,
        trade: &Trade,
        envelope: &TradeMessageEnvelope,
    ) -> ProtocolResult<()> {
        let expected = Self::counterparty_id(trade)?;
        if envelope.sender != expected {
            return Err(ProtocolError::violation(
                trade.id().clone(),
                format!("message from {} but counterparty is {expected}", envelope.sender),
            ));
        }
        let contract = trade
            .contract()
            .ok_or_else(|| ProtocolError::invalid_command("trade has no contract yet"))?;
        let pub_key = contract.pub_key_of(&envelope.sender).ok_or_else(|| {
            ProtocolError::violation(trade.id().clone(), "sender has no key in contract")
        })?;
        let bytes = envelope
            .signable_bytes()
            .map_err(|e| ProtocolError::violation(trade.id().clone(), e.to_string()))?;
        if !self.signer.verify(pub_key, &bytes, &envelope.signature) {
            return Err(ProtocolError::violation(
                trade.id().clone(),
                "signature verification failed",
            ));
        }
        Ok(())
    }

    /// Buyer command: announce the fiat payment was initiated.
    ///
    /// Transitions the trade into the payment-sent phase, arms the resend
    /// bookkeeping, then hands the signed message to the transport. A
    /// failed or mailbox-routed send only refines the fine-grained state;
    /// resends recover delivery.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidCommand`] if the caller is not the
    /// buyer or the deposits are not unlocked yet.
    pub async fn send_payment_started(
        &self,
        trade: &mut Trade,
        counter_currency_tx_id: Option<String>,
    ) -> ProtocolResult<()> {
        if Self::local_position(trade)? != TraderPosition::Buyer {
            return Err(ProtocolError::invalid_command(
                "only the buyer confirms payment started",
            ));
        }
        if trade.phase() != TradePhase::DepositsUnlocked {
            return Err(ProtocolError::invalid_command(format!(
                "payment started requires unlocked deposits, trade is in {}",
                trade.phase()
            )));
        }

        trade.set_counter_currency_tx_id(counter_currency_tx_id.clone());
        trade.transition_to(TradeState::BuyerSentPaymentSentMsg)?;
        let envelope = self.signed(TradeMessageEnvelope::new(
            trade.id().clone(),
            self.local_trader_id(trade)?,
            TradeMessagePayload::PaymentStarted {
                counter_currency_tx_id,
            },
        ))?;
        trade.arm_resend(
            envelope.message_id,
            PaymentMessageKind::PaymentStarted,
            Timestamp::now(),
        );
        self.dispatch(trade, &envelope, PaymentMessageKind::PaymentStarted)
            .await;
        Ok(())
    }

    /// Seller command: announce the fiat payment arrived.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidCommand`] if the caller is not the
    /// seller or the trade is not in the payment-sent phase.
    pub async fn send_payment_received(&self, trade: &mut Trade) -> ProtocolResult<()> {
        if Self::local_position(trade)? != TraderPosition::Seller {
            return Err(ProtocolError::invalid_command(
                "only the seller confirms payment received",
            ));
        }
        if trade.phase() != TradePhase::PaymentSent {
            return Err(ProtocolError::invalid_command(format!(
                "payment received requires the payment-sent phase, trade is in {}",
                trade.phase()
            )));
        }

        trade.transition_to(TradeState::SellerSentPaymentReceivedMsg)?;
        let envelope = self.signed(TradeMessageEnvelope::new(
            trade.id().clone(),
            self.local_trader_id(trade)?,
            TradeMessagePayload::PaymentReceived,
        ))?;
        trade.arm_resend(
            envelope.message_id,
            PaymentMessageKind::PaymentReceived,
            Timestamp::now(),
        );
        self.dispatch(trade, &envelope, PaymentMessageKind::PaymentReceived)
            .await;
        Ok(())
    }

    /// Seller handler for an inbound payment-started message.
    ///
    /// Verification failures and out-of-phase messages are violations; a
    /// replay still produces an ack so the buyer stops resending.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ProtocolViolation`] for inputs that must
    /// be dropped.
    pub async fn on_payment_started(
        &self,
        trade: &mut Trade,
        envelope: &TradeMessageEnvelope,
    ) -> ProtocolResult<InboundOutcome> {
        if Self::local_position(trade)? != TraderPosition::Seller {
            return Err(ProtocolError::violation(
                trade.id().clone(),
                "payment started sent to the buyer side",
            ));
        }
        self.verify_inbound(trade, envelope)?;
        self.accept(trade, envelope, TradeState::SellerReceivedPaymentSentMsg)
            .await
    }

    /// Buyer handler for an inbound payment-received message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ProtocolViolation`] for inputs that must
    /// be dropped.
    pub async fn on_payment_received(
        &self,
        trade: &mut Trade,
        envelope: &TradeMessageEnvelope,
    ) -> ProtocolResult<InboundOutcome> {
        if Self::local_position(trade)? != TraderPosition::Buyer {
            return Err(ProtocolError::violation(
                trade.id().clone(),
                "payment received sent to the seller side",
            ));
        }
        self.verify_inbound(trade, envelope)?;
        self.accept(trade, envelope, TradeState::BuyerReceivedPaymentReceivedMsg)
            .await
    }

    async fn accept(
        &self,
        trade: &mut Trade,
        envelope: &TradeMessageEnvelope,
        target: TradeState,
    ) -> ProtocolResult<InboundOutcome> {
        let applied = trade.apply_message_state(target).map_err(|_| {
            ProtocolError::violation(
                trade.id().clone(),
                format!(
                    "{} arrived while trade is in {}",
                    envelope.payload.name(),
                    trade.state()
                ),
            )
        })?;
        if applied == Applied::AlreadyApplied {
            tracing::debug!(
                trade_id = %trade.id(),
                message_id = %envelope.message_id,
                "replayed payment message, re-acking"
            );
        }
        let ack = self.signed(envelope.ack_from(self.local_trader_id(trade)?))?;
        if let Err(err) = self.transport.send(&envelope.sender, &ack).await {
            // The sender's resend will fetch the ack again.
            tracing::warn!(trade_id = %trade.id(), error = %err, "ack send failed");
        }
        Ok(InboundOutcome { applied, ack })
    }

    /// Handles an inbound ack, upgrading the sender-side state and
    /// disarming the resend.
    ///
    /// Acks for unknown or already-settled messages are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ProtocolViolation`] if the ack fails
    /// verification.
    pub fn on_ack(
        &self,
        trade: &mut Trade,
        envelope: &TradeMessageEnvelope,
        acked_message_id: MessageId,
    ) -> ProtocolResult<()> {
        self.verify_inbound(trade, envelope)?;
        let Some(pending) = trade.pending_resend() else {
            tracing::debug!(trade_id = %trade.id(), "ack with nothing pending, ignoring");
            return Ok(());
        };
        if pending.message_id != acked_message_id {
            tracing::debug!(
                trade_id = %trade.id(),
                %acked_message_id,
                "ack for a different message, ignoring"
            );
            return Ok(());
        }
        let saw_arrived = match pending.kind {
            PaymentMessageKind::PaymentStarted => TradeState::BuyerSawArrivedPaymentSentMsg,
            PaymentMessageKind::PaymentReceived => TradeState::SellerSawArrivedPaymentReceivedMsg,
        };
        let kind = pending.kind;
        trade.clear_pending_resend();
        if Self::awaiting_delivery(trade.state(), kind) {
            trade.transition_to(saw_arrived)?;
        }
        Ok(())
    }

    /// Returns true if the pending message is due for another send.
    #[must_use]
    pub fn resend_due(&self, trade: &Trade, now: Timestamp) -> bool {
        let Some(pending) = trade.pending_resend() else {
            return false;
        };
        let delay = self.resend_backoff.delay_for(pending.attempts.saturating_add(1));
        let due_at = pending
            .last_sent_at
            .add_millis(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));
        !now.is_before(&due_at)
    }

    /// Resends the pending payment message under the same message id.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidCommand`] if nothing is pending.
    pub async fn resend_pending(&self, trade: &mut Trade, now: Timestamp) -> ProtocolResult<()> {
        let Some(pending) = trade.pending_resend().cloned() else {
            return Err(ProtocolError::invalid_command("no message pending resend"));
        };
        let payload = match pending.kind {
            PaymentMessageKind::PaymentStarted => TradeMessagePayload::PaymentStarted {
                counter_currency_tx_id: trade.counter_currency_tx_id().map(str::to_string),
            },
            PaymentMessageKind::PaymentReceived => TradeMessagePayload::PaymentReceived,
        };
        let mut envelope =
            TradeMessageEnvelope::new(trade.id().clone(), self.local_trader_id(trade)?, payload);
        // Same id as the original send so replay detection and ack
        // matching keep working.
        envelope.message_id = pending.message_id;
        let envelope = self.signed(envelope)?;
        trade.record_resend_attempt(now);
        self.dispatch(trade, &envelope, pending.kind).await;
        Ok(())
    }

    async fn dispatch(
        &self,
        trade: &mut Trade,
        envelope: &TradeMessageEnvelope,
        kind: PaymentMessageKind,
    ) {
        let recipient = match Self::counterparty_id(trade) {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(trade_id = %trade.id(), error = %err, "no counterparty");
                return;
            }
        };
        let refined = match self.transport.send(&recipient, envelope).await {
            Ok(SendOutcome::Delivered) => {
                // Arrival observed directly; no resend needed.
                trade.clear_pending_resend();
                match kind {
                    PaymentMessageKind::PaymentStarted => {
                        TradeState::BuyerSawArrivedPaymentSentMsg
                    }
                    PaymentMessageKind::PaymentReceived => {
                        TradeState::SellerSawArrivedPaymentReceivedMsg
                    }
                }
            }
            Ok(SendOutcome::MailboxStored) => match kind {
                PaymentMessageKind::PaymentStarted => TradeState::BuyerStoredInMailboxPaymentSentMsg,
                PaymentMessageKind::PaymentReceived => {
                    TradeState::SellerStoredInMailboxPaymentReceivedMsg
                }
            },
            Err(err) => {
                tracing::warn!(
                    trade_id = %trade.id(),
                    error = %err,
                    "payment message send failed, will resend"
                );
                match kind {
                    PaymentMessageKind::PaymentStarted => TradeState::BuyerSendFailedPaymentSentMsg,
                    PaymentMessageKind::PaymentReceived => {
                        TradeState::SellerSendFailedPaymentReceivedMsg
                    }
                }
            }
        };
        if trade.state() != refined && Self::awaiting_delivery(trade.state(), kind) {
            if let Err(err) = trade.transition_to(refined) {
                tracing::error!(trade_id = %trade.id(), error = %err, "state refinement rejected");
            }
        }
    }

    /// True while the state is still delivery bookkeeping for the given
    /// message; once the trade moved past it, late delivery or ack
    /// observations must not rewind the state.
    const fn awaiting_delivery(state: TradeState, kind: PaymentMessageKind) -> bool {
        match kind {
            PaymentMessageKind::PaymentStarted => matches!(
                state,
                TradeState::BuyerSentPaymentSentMsg
                    | TradeState::BuyerStoredInMailboxPaymentSentMsg
                    | TradeState::BuyerSendFailedPaymentSentMsg
            ),
            PaymentMessageKind::PaymentReceived => matches!(
                state,
                TradeState::SellerSentPaymentReceivedMsg
                    | TradeState::SellerStoredInMailboxPaymentReceivedMsg
                    | TradeState::SellerSendFailedPaymentReceivedMsg
            ),
        }
    }

    fn local_trader_id(&self, trade: &Trade) -> ProtocolResult<TraderId> {
        let contract = trade
            .contract()
            .ok_or_else(|| ProtocolError::invalid_command("trade has no contract yet"))?;
        Ok(contract.trader_of(contract.position_of(trade.role())).clone())
    }
}
