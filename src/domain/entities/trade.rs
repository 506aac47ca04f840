//! # Trade Aggregate Root
//!
//! The aggregate composing contract, escrow bookkeeping and the lifecycle
//! state machine.
//!
//! A [`Trade`] is created when an offer is taken, advances monotonically
//! through its [`TradePhase`]s, and is persisted after every transition.
//! Exactly one protocol task mutates a trade at a time (enforced by the
//! [`TradeManager`](crate::application::services::trade_manager::TradeManager)
//! registry); everything here is single-threaded state-machine logic.
//!
//! # Invariants
//!
//! - Phase only advances forward or jumps to `Failed`; the only audited
//!   regression is [`Trade::unfail`]
//! - Replaying an already-applied protocol message is a no-op
//!   ([`Trade::apply_message_state`])
//! - At most one deposit tx per role and one payout tx, recorded
//!   exactly once

use crate::domain::entities::contract::Contract;
use crate::domain::entities::dispute::Dispute;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{
    Amount, FatalReason, MessageId, Price, TradeId, TradePeriodPhase, TradePhase, TradeRole,
    TradeState, TxId,
};
use serde::{Deserialize, Serialize};

/// Which of the two payment-confirmation messages a resend entry tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMessageKind {
    /// Buyer's "payment started" assertion.
    PaymentStarted,
    /// Seller's "payment received" assertion.
    PaymentReceived,
}

/// Persisted bookkeeping for a payment message awaiting acknowledgement.
///
/// Restart-safe: the next resend moment is recomputed from `last_sent_at`
/// and the attempt count, never from in-memory timers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingResend {
    /// Id of the message awaiting an ack.
    pub message_id: MessageId,
    /// Which payment message it is.
    pub kind: PaymentMessageKind,
    /// When the message was last handed to the transport.
    pub last_sent_at: Timestamp,
    /// Number of sends so far.
    pub attempts: u32,
}

/// Outcome of applying a protocol message's implied target state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The state advanced.
    Transitioned,
    /// The message was a replay; nothing changed.
    AlreadyApplied,
}

/// The trade aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Trade id; equals the originating offer's id.
    id: TradeId,
    /// The local party's role in this trade.
    role: TradeRole,
    /// Signed contract, attached once deposit negotiation starts.
    contract: Option<Contract>,
    /// Agreed trade amount.
    amount: Amount,
    /// Agreed trade price.
    price: Price,
    /// Maker's deposit transaction, once published.
    maker_deposit_tx_id: Option<TxId>,
    /// Taker's deposit transaction, once published.
    taker_deposit_tx_id: Option<TxId>,
    /// Payout transaction, once published.
    payout_tx_id: Option<TxId>,
    /// Whether the recorded deposit txs are known unspent (unfail guard).
    deposits_unspent: bool,
    /// Fine-grained protocol state; the phase is derived from it.
    state: TradeState,
    /// The fatal condition that failed this trade, if any.
    fatal_reason: Option<FatalReason>,
    /// Initialization-failure / manual-intervention message, if any.
    error: Option<String>,
    /// Start of the trade period (deposits unlocked).
    trade_period_start: Option<Timestamp>,
    /// End of the trade period.
    max_trade_period_date: Option<Timestamp>,
    /// Last trade-period phase announced by the advisory sweep.
    period_notified: Option<TradePeriodPhase>,
    /// Buyer's reference in the external payment system, if provided.
    counter_currency_tx_id: Option<String>,
    /// The dispute over this trade, if one was opened.
    dispute: Option<Dispute>,
    /// Payment message awaiting acknowledgement, if any.
    pending_resend: Option<PendingResend>,
    /// Version for optimistic locking.
    version: u64,
    /// When this trade was created.
    created_at: Timestamp,
    /// When this trade was last updated.
    updated_at: Timestamp,
}

impl Trade {
    /// Creates a new trade in [`TradeState::Initialized`].
    #[must_use]
    pub fn new(id: TradeId, role: TradeRole, amount: Amount, price: Price) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            role,
            contract: None,
            amount,
            price,
            maker_deposit_tx_id: None,
            taker_deposit_tx_id: None,
            payout_tx_id: None,
            deposits_unspent: true,
            state: TradeState::Initialized,
            fatal_reason: None,
            error: None,
            trade_period_start: None,
            max_trade_period_date: None,
            period_notified: None,
            counter_currency_tx_id: None,
            dispute: None,
            pending_resend: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
        self.version = self.version.saturating_add(1);
    }

    /// Advances the state machine.
    ///
    /// The transition is committed in memory only; the caller persists the
    /// trade before sending any externally observable acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidStateTransition`] if the target's phase
    /// regresses, skips a stage, or leaves a terminal phase.
    pub fn transition_to(&mut self, target: TradeState) -> DomainResult<()> {
        if !self.state.can_transition_to(target) {
            return Err(DomainError::invalid_transition(self.state, target));
        }
        tracing::debug!(
            trade_id = %self.id,
            from = %self.state,
            to = %target,
            "trade state transition"
        );
        self.state = target;
        self.touch();
        Ok(())
    }

    /// Applies the target state implied by a protocol message,
    /// idempotently.
    ///
    /// A message whose implied state the trade has already reached (same
    /// state, a past phase, or an earlier state within the same phase) is
    /// a replay and returns [`Applied::AlreadyApplied`] without mutating
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidStateTransition`] if the target skips
    /// ahead by more than one phase; that is an out-of-phase message, not
    /// a replay.
    pub fn apply_message_state(&mut self, target: TradeState) -> DomainResult<Applied> {
        if self.state == target {
            return Ok(Applied::AlreadyApplied);
        }
        let current_phase = self.phase();
        let target_phase = target.phase();
        if target_phase < current_phase {
            return Ok(Applied::AlreadyApplied);
        }
        if target_phase == current_phase && (target as u8) < (self.state as u8) {
            // Replay landing after the trade already moved past the
            // implied state within the same phase, e.g. a resent
            // payment-received arriving once the payout is published.
            return Ok(Applied::AlreadyApplied);
        }
        self.transition_to(target)?;
        Ok(Applied::Transitioned)
    }

    /// Attaches the signed contract, exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ValidationError`] if a contract is already
    /// attached.
    pub fn set_contract(&mut self, contract: Contract) -> DomainResult<()> {
        if self.contract.is_some() {
            return Err(DomainError::ValidationError(format!(
                "trade {} already has a contract",
                self.id
            )));
        }
        self.contract = Some(contract);
        self.touch();
        Ok(())
    }

    /// Records a role's deposit transaction, exactly once.
    ///
    /// Recording the same tx id again is a no-op; a *different* tx id for a
    /// role that already has one is rejected. That rejection is the
    /// double-spend detection input.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::DepositAlreadyRecorded`] on a conflicting id.
    pub fn set_deposit_tx(&mut self, role: TradeRole, tx_id: TxId) -> DomainResult<()> {
        let slot = match role {
            TradeRole::Maker => &mut self.maker_deposit_tx_id,
            TradeRole::Taker => &mut self.taker_deposit_tx_id,
        };
        match slot {
            Some(existing) if *existing == tx_id => Ok(()),
            Some(existing) => Err(DomainError::DepositAlreadyRecorded {
                role,
                existing: existing.as_str().to_string(),
            }),
            None => {
                *slot = Some(tx_id);
                self.touch();
                Ok(())
            }
        }
    }

    /// Records the payout transaction, exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ValidationError`] on a conflicting id.
    pub fn set_payout_tx(&mut self, tx_id: TxId) -> DomainResult<()> {
        match &self.payout_tx_id {
            Some(existing) if *existing == tx_id => Ok(()),
            Some(existing) => Err(DomainError::ValidationError(format!(
                "trade {} already has payout tx {existing}",
                self.id
            ))),
            None => {
                self.payout_tx_id = Some(tx_id);
                self.touch();
                Ok(())
            }
        }
    }

    /// Starts the trade period, anchored at `now`.
    pub fn start_trade_period(&mut self, now: Timestamp, duration_millis: i64) {
        self.trade_period_start = Some(now);
        self.max_trade_period_date = Some(now.add_millis(duration_millis));
        self.touch();
    }

    /// Returns where `now` falls within the trade period, if one started.
    #[must_use]
    pub fn trade_period_phase(&self, now: Timestamp) -> Option<TradePeriodPhase> {
        let start = self.trade_period_start?;
        let end = self.max_trade_period_date?;
        if now.is_after(&end) {
            return Some(TradePeriodPhase::Over);
        }
        let half = start.add_millis(end.millis_since(&start) / 2);
        if now.is_after(&half) {
            Some(TradePeriodPhase::SecondHalf)
        } else {
            Some(TradePeriodPhase::FirstHalf)
        }
    }

    /// Records the trade-period phase announced by the advisory sweep.
    pub fn set_period_notified(&mut self, phase: TradePeriodPhase) {
        self.period_notified = Some(phase);
        self.touch();
    }

    /// Moves the trade to the failed collection.
    ///
    /// Only the enumerated fatal conditions reach this; transient errors
    /// never do.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidStateTransition`] if the trade is
    /// already terminal.
    pub fn mark_failed(&mut self, reason: FatalReason) -> DomainResult<()> {
        self.transition_to(TradeState::Failed)?;
        tracing::warn!(trade_id = %self.id, %reason, "trade failed");
        self.fatal_reason = Some(reason);
        Ok(())
    }

    /// Re-admits a failed trade to the pending collection, the one audited
    /// phase regression.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnfailRejected`] unless the trade is failed,
    /// both deposit txs are recorded and known unspent, and the resume
    /// state is non-terminal.
    pub fn unfail(&mut self, resume_state: TradeState) -> DomainResult<()> {
        if self.state != TradeState::Failed {
            return Err(DomainError::UnfailRejected(format!(
                "trade {} is not failed",
                self.id
            )));
        }
        if self.maker_deposit_tx_id.is_none() || self.taker_deposit_tx_id.is_none() {
            return Err(DomainError::UnfailRejected(
                "deposit transactions missing".to_string(),
            ));
        }
        if !self.deposits_unspent {
            return Err(DomainError::UnfailRejected(
                "deposit transactions already spent".to_string(),
            ));
        }
        if resume_state.is_terminal() {
            return Err(DomainError::UnfailRejected(format!(
                "cannot resume into terminal state {resume_state}"
            )));
        }
        tracing::warn!(
            trade_id = %self.id,
            resume_state = %resume_state,
            "unfailing trade"
        );
        self.state = resume_state;
        self.fatal_reason = None;
        self.touch();
        Ok(())
    }

    /// Marks the recorded deposit transactions as spent or unspent.
    pub fn set_deposits_unspent(&mut self, unspent: bool) {
        self.deposits_unspent = unspent;
        self.touch();
    }

    /// Records the buyer's external payment reference.
    pub fn set_counter_currency_tx_id(&mut self, reference: Option<String>) {
        self.counter_currency_tx_id = reference;
        self.touch();
    }

    /// Returns the buyer's external payment reference, if recorded.
    #[inline]
    #[must_use]
    pub fn counter_currency_tx_id(&self) -> Option<&str> {
        self.counter_currency_tx_id.as_deref()
    }

    /// Sets the manual-intervention / initialization error message.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.touch();
    }

    /// Clears the error message.
    pub fn clear_error(&mut self) {
        self.error = None;
        self.touch();
    }

    /// Attaches an opened dispute, exactly once.
    ///
    /// Disputes only apply to escrowed trades: the deposits must be
    /// published and the payout must not be, so nothing is disputable
    /// before the escrow exists or after it is spent.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ValidationError`] if a dispute already
    /// exists or the trade is not in a disputable phase.
    pub fn set_dispute(&mut self, dispute: Dispute) -> DomainResult<()> {
        if self.dispute.is_some() {
            return Err(DomainError::ValidationError(format!(
                "trade {} already has a dispute",
                self.id
            )));
        }
        let disputable = matches!(
            self.phase(),
            TradePhase::DepositPublished
                | TradePhase::DepositsUnlocked
                | TradePhase::PaymentSent
                | TradePhase::PaymentReceived
        ) && self.state != TradeState::PayoutTxPublished;
        if !disputable {
            return Err(DomainError::ValidationError(format!(
                "trade {} is not disputable in state {}",
                self.id, self.state
            )));
        }
        self.dispute = Some(dispute);
        self.touch();
        Ok(())
    }

    /// Returns a mutable handle to the dispute, if one is open.
    pub fn dispute_mut(&mut self) -> Option<&mut Dispute> {
        self.dispute.as_mut()
    }

    /// Settles the trade from a closed dispute: records the arbitrated
    /// payout tx and jumps forward to [`TradeState::PayoutTxPublished`].
    ///
    /// This is the one place a trade may cross more than one phase at a
    /// time; disputes can be decided from any pre-payout phase. The jump
    /// is still strictly forward.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NoOpenDispute`] if no dispute exists,
    /// [`DomainError::ValidationError`] if it is not closed yet, and
    /// [`DomainError::InvalidStateTransition`] from a terminal or
    /// already-paid-out state.
    pub fn settle_disputed(&mut self, tx_id: TxId) -> DomainResult<()> {
        match &self.dispute {
            None => return Err(DomainError::NoOpenDispute(self.id.to_string())),
            Some(dispute) if dispute.is_open() => {
                return Err(DomainError::ValidationError(format!(
                    "dispute on trade {} is not closed yet",
                    self.id
                )));
            }
            Some(_) => {}
        }
        if self.phase().is_terminal() || self.state == TradeState::PayoutTxPublished {
            return Err(DomainError::invalid_transition(
                self.state,
                TradeState::PayoutTxPublished,
            ));
        }
        self.set_payout_tx(tx_id)?;
        tracing::info!(trade_id = %self.id, from = %self.state, "dispute settlement payout");
        self.state = TradeState::PayoutTxPublished;
        self.touch();
        Ok(())
    }

    /// Arms resend bookkeeping for a payment message.
    pub fn arm_resend(&mut self, message_id: MessageId, kind: PaymentMessageKind, now: Timestamp) {
        self.pending_resend = Some(PendingResend {
            message_id,
            kind,
            last_sent_at: now,
            attempts: 1,
        });
        self.touch();
    }

    /// Records another send attempt for the pending message.
    pub fn record_resend_attempt(&mut self, now: Timestamp) {
        if let Some(pending) = &mut self.pending_resend {
            pending.attempts = pending.attempts.saturating_add(1);
            pending.last_sent_at = now;
        }
        self.touch();
    }

    /// Clears the resend bookkeeping (ack received).
    pub fn clear_pending_resend(&mut self) {
        self.pending_resend = None;
        self.touch();
    }

    // ========== Accessors ==========

    /// Returns the trade id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &TradeId {
        &self.id
    }

    /// Returns the first eight characters of the id, for display.
    #[must_use]
    pub fn short_id(&self) -> &str {
        let id = self.id.as_str();
        id.get(..8).unwrap_or(id)
    }

    /// Returns the local party's role.
    #[inline]
    #[must_use]
    pub fn role(&self) -> TradeRole {
        self.role
    }

    /// Returns the contract, if attached.
    #[inline]
    #[must_use]
    pub fn contract(&self) -> Option<&Contract> {
        self.contract.as_ref()
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

    /// Returns the fine-grained protocol state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> TradeState {
        self.state
    }

    /// Returns the coarse lifecycle phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> TradePhase {
        self.state.phase()
    }

    /// Returns true if the trade is not terminal.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.phase().is_terminal()
    }

    /// Returns a role's deposit tx id, if recorded.
    #[must_use]
    pub fn deposit_tx(&self, role: TradeRole) -> Option<&TxId> {
        match role {
            TradeRole::Maker => self.maker_deposit_tx_id.as_ref(),
            TradeRole::Taker => self.taker_deposit_tx_id.as_ref(),
        }
    }

    /// Returns the payout tx id, if recorded.
    #[inline]
    #[must_use]
    pub fn payout_tx(&self) -> Option<&TxId> {
        self.payout_tx_id.as_ref()
    }

    /// Returns the fatal reason, if the trade failed.
    #[inline]
    #[must_use]
    pub fn fatal_reason(&self) -> Option<FatalReason> {
        self.fatal_reason
    }

    /// Returns the error message, if set.
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns the end of the trade period, if started.
    #[inline]
    #[must_use]
    pub fn max_trade_period_date(&self) -> Option<Timestamp> {
        self.max_trade_period_date
    }

    /// Returns the last announced trade-period phase.
    #[inline]
    #[must_use]
    pub fn period_notified(&self) -> Option<TradePeriodPhase> {
        self.period_notified
    }

    /// Returns the dispute, if one was opened.
    #[inline]
    #[must_use]
    pub fn dispute(&self) -> Option<&Dispute> {
        self.dispute.as_ref()
    }

    /// Returns the pending resend bookkeeping, if armed.
    #[inline]
    #[must_use]
    pub fn pending_resend(&self) -> Option<&PendingResend> {
        self.pending_resend.as_ref()
    }

    /// Returns the optimistic-locking version.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Price;
    use rust_decimal::Decimal;

    fn test_trade() -> Trade {
        Trade::new(
            TradeId::new("trade-1"),
            TradeRole::Taker,
            Amount::from_atomic(10_000_000),
            Price::new(Decimal::new(43_000, 0)).unwrap(),
        )
    }

    fn trade_in(state: TradeState) -> Trade {
        let mut trade = test_trade();
        let path: &[TradeState] = &[
            TradeState::ContractSigned,
            TradeState::DepositTxsPublished,
            TradeState::DepositTxsUnlockedInBlockchain,
            TradeState::SellerReceivedPaymentSentMsg,
            TradeState::SellerSentPaymentReceivedMsg,
            TradeState::PayoutTxPublished,
            TradeState::TradeCompleted,
        ];
        for step in path {
            if trade.state() == state {
                break;
            }
            trade.transition_to(*step).unwrap();
            if trade.state() == state {
                break;
            }
        }
        assert_eq!(trade.state(), state, "helper cannot reach {state}");
        trade
    }

    mod transitions {
        use super::*;

        #[test]
        fn forward_path_advances() {
            let trade = trade_in(TradeState::TradeCompleted);
            assert_eq!(trade.phase(), TradePhase::Completed);
            assert!(!trade.is_active());
        }

        #[test]
        fn phase_never_regresses() {
            let mut trade = trade_in(TradeState::SellerReceivedPaymentSentMsg);
            assert!(trade
                .transition_to(TradeState::DepositTxsUnlockedInBlockchain)
                .is_err());
            assert_eq!(trade.phase(), TradePhase::PaymentSent);
        }

        #[test]
        fn phase_skip_is_rejected() {
            let mut trade = trade_in(TradeState::DepositTxsUnlockedInBlockchain);
            assert!(matches!(
                trade.transition_to(TradeState::TradeCompleted),
                Err(DomainError::InvalidStateTransition { .. })
            ));
        }

        #[test]
        fn version_bumps_on_transition() {
            let mut trade = test_trade();
            let v = trade.version();
            trade.transition_to(TradeState::ContractSigned).unwrap();
            assert!(trade.version() > v);
        }
    }

    mod idempotence {
        use super::*;

        #[test]
        fn duplicate_message_is_noop() {
            let mut trade = trade_in(TradeState::SellerReceivedPaymentSentMsg);
            let v = trade.version();
            let applied = trade
                .apply_message_state(TradeState::SellerReceivedPaymentSentMsg)
                .unwrap();
            assert_eq!(applied, Applied::AlreadyApplied);
            assert_eq!(trade.version(), v);
        }

        #[test]
        fn stale_phase_message_is_noop() {
            let mut trade = trade_in(TradeState::SellerSentPaymentReceivedMsg);
            let applied = trade
                .apply_message_state(TradeState::SellerReceivedPaymentSentMsg)
                .unwrap();
            assert_eq!(applied, Applied::AlreadyApplied);
            assert_eq!(trade.state(), TradeState::SellerSentPaymentReceivedMsg);
        }

        #[test]
        fn replay_after_payout_published_is_noop() {
            let mut trade = trade_in(TradeState::PayoutTxPublished);
            let applied = trade
                .apply_message_state(TradeState::BuyerReceivedPaymentReceivedMsg)
                .unwrap();
            assert_eq!(applied, Applied::AlreadyApplied);
            assert_eq!(trade.state(), TradeState::PayoutTxPublished);
        }

        #[test]
        fn fresh_message_transitions() {
            let mut trade = trade_in(TradeState::DepositTxsUnlockedInBlockchain);
            let applied = trade
                .apply_message_state(TradeState::SellerReceivedPaymentSentMsg)
                .unwrap();
            assert_eq!(applied, Applied::Transitioned);
            assert_eq!(trade.phase(), TradePhase::PaymentSent);
        }

        #[test]
        fn out_of_phase_message_is_rejected_not_replayed() {
            let mut trade = trade_in(TradeState::DepositTxsUnlockedInBlockchain);
            let result = trade.apply_message_state(TradeState::BuyerReceivedPaymentReceivedMsg);
            assert!(result.is_err());
            assert_eq!(trade.phase(), TradePhase::DepositsUnlocked);
        }
    }

    mod deposits {
        use super::*;

        #[test]
        fn deposit_recorded_exactly_once() {
            let mut trade = test_trade();
            trade
                .set_deposit_tx(TradeRole::Maker, TxId::new("tx-1"))
                .unwrap();
            // Same id again is a no-op.
            trade
                .set_deposit_tx(TradeRole::Maker, TxId::new("tx-1"))
                .unwrap();
            assert_eq!(trade.deposit_tx(TradeRole::Maker).unwrap().as_str(), "tx-1");
            // Different id is the double-spend guard.
            assert!(matches!(
                trade.set_deposit_tx(TradeRole::Maker, TxId::new("tx-2")),
                Err(DomainError::DepositAlreadyRecorded { .. })
            ));
        }

        #[test]
        fn roles_are_tracked_independently() {
            let mut trade = test_trade();
            trade
                .set_deposit_tx(TradeRole::Maker, TxId::new("tx-m"))
                .unwrap();
            trade
                .set_deposit_tx(TradeRole::Taker, TxId::new("tx-t"))
                .unwrap();
            assert_eq!(trade.deposit_tx(TradeRole::Taker).unwrap().as_str(), "tx-t");
        }

        #[test]
        fn payout_conflict_rejected() {
            let mut trade = test_trade();
            trade.set_payout_tx(TxId::new("pay-1")).unwrap();
            trade.set_payout_tx(TxId::new("pay-1")).unwrap();
            assert!(trade.set_payout_tx(TxId::new("pay-2")).is_err());
        }
    }

    mod failure {
        use super::*;

        #[test]
        fn mark_failed_records_reason() {
            let mut trade = trade_in(TradeState::DepositTxsPublished);
            trade.mark_failed(FatalReason::DepositDoubleSpend).unwrap();
            assert_eq!(trade.phase(), TradePhase::Failed);
            assert_eq!(trade.fatal_reason(), Some(FatalReason::DepositDoubleSpend));
        }

        #[test]
        fn unfail_requires_recorded_unspent_deposits() {
            let mut trade = trade_in(TradeState::DepositTxsPublished);
            trade.mark_failed(FatalReason::OperatorAbort).unwrap();
            // No deposits recorded yet.
            assert!(matches!(
                trade.unfail(TradeState::DepositTxsPublished),
                Err(DomainError::UnfailRejected(_))
            ));

            let mut trade = trade_in(TradeState::DepositTxsPublished);
            trade
                .set_deposit_tx(TradeRole::Maker, TxId::new("tx-m"))
                .unwrap();
            trade
                .set_deposit_tx(TradeRole::Taker, TxId::new("tx-t"))
                .unwrap();
            trade.mark_failed(FatalReason::OperatorAbort).unwrap();
            trade.unfail(TradeState::DepositTxsPublished).unwrap();
            assert_eq!(trade.state(), TradeState::DepositTxsPublished);
            assert_eq!(trade.fatal_reason(), None);
        }

        #[test]
        fn unfail_rejected_when_deposits_spent() {
            let mut trade = trade_in(TradeState::DepositTxsPublished);
            trade
                .set_deposit_tx(TradeRole::Maker, TxId::new("tx-m"))
                .unwrap();
            trade
                .set_deposit_tx(TradeRole::Taker, TxId::new("tx-t"))
                .unwrap();
            trade.set_deposits_unspent(false);
            trade.mark_failed(FatalReason::OperatorAbort).unwrap();
            assert!(trade.unfail(TradeState::DepositTxsPublished).is_err());
        }

        #[test]
        fn unfail_only_from_failed() {
            let mut trade = trade_in(TradeState::DepositTxsPublished);
            assert!(trade.unfail(TradeState::Initialized).is_err());
        }
    }

    mod dispute_settlement {
        use super::*;
        use crate::domain::entities::dispute::{Dispute, DisputeResult};
        use crate::domain::value_objects::{DisputeChannel, DisputeReason, TraderId, TraderPosition};

        fn closed_dispute() -> Dispute {
            let mut dispute = Dispute::open(
                TradeId::new("trade-1"),
                TraderId::new("taker-1"),
                DisputeChannel::Arbitrator,
                DisputeReason::SellerNotResponding,
            );
            dispute
                .close(DisputeResult {
                    trade_id: TradeId::new("trade-1"),
                    opened_by: TraderId::new("taker-1"),
                    winner: TraderPosition::Buyer,
                    reason: DisputeReason::SellerNotResponding,
                    buyer_payout_amount: Amount::from_atomic(13_000_000),
                    seller_payout_amount: Amount::ZERO,
                    summary_notes: "seller unreachable".to_string(),
                    closed_at: Timestamp::now(),
                })
                .unwrap();
            dispute
        }

        #[test]
        fn settlement_jumps_forward_from_any_phase() {
            let mut trade = trade_in(TradeState::DepositTxsUnlockedInBlockchain);
            trade.set_dispute(closed_dispute()).unwrap();
            trade.settle_disputed(TxId::new("payout-1")).unwrap();
            assert_eq!(trade.state(), TradeState::PayoutTxPublished);
            assert_eq!(trade.payout_tx().unwrap().as_str(), "payout-1");
        }

        #[test]
        fn settlement_requires_a_closed_dispute() {
            let mut trade = trade_in(TradeState::DepositTxsUnlockedInBlockchain);
            assert!(matches!(
                trade.settle_disputed(TxId::new("payout-1")),
                Err(DomainError::NoOpenDispute(_))
            ));

            let mut trade = trade_in(TradeState::DepositTxsUnlockedInBlockchain);
            trade
                .set_dispute(Dispute::open(
                    TradeId::new("trade-1"),
                    TraderId::new("taker-1"),
                    DisputeChannel::Arbitrator,
                    DisputeReason::NoReply,
                ))
                .unwrap();
            assert!(trade.settle_disputed(TxId::new("payout-1")).is_err());
        }

        #[test]
        fn settlement_rejected_after_payout() {
            let mut trade = trade_in(TradeState::DepositTxsUnlockedInBlockchain);
            trade.set_dispute(closed_dispute()).unwrap();
            trade.settle_disputed(TxId::new("payout-1")).unwrap();
            assert!(trade.settle_disputed(TxId::new("payout-2")).is_err());
        }

        #[test]
        fn dispute_requires_an_escrowed_trade() {
            let mut trade = test_trade();
            assert!(trade.set_dispute(closed_dispute()).is_err());

            let mut trade = trade_in(TradeState::PayoutTxPublished);
            assert!(trade.set_dispute(closed_dispute()).is_err());

            let mut trade = trade_in(TradeState::TradeCompleted);
            assert!(trade.set_dispute(closed_dispute()).is_err());
        }
    }

    mod trade_period {
        use super::*;

        #[test]
        fn no_period_before_deposits_unlock() {
            let trade = test_trade();
            assert_eq!(trade.trade_period_phase(Timestamp::now()), None);
        }

        #[test]
        fn phases_follow_thresholds() {
            let mut trade = test_trade();
            let start = Timestamp::now();
            trade.start_trade_period(start, 1_000_000);
            assert_eq!(
                trade.trade_period_phase(start.add_millis(100_000)),
                Some(TradePeriodPhase::FirstHalf)
            );
            assert_eq!(
                trade.trade_period_phase(start.add_millis(600_000)),
                Some(TradePeriodPhase::SecondHalf)
            );
            assert_eq!(
                trade.trade_period_phase(start.add_millis(1_000_001)),
                Some(TradePeriodPhase::Over)
            );
        }
    }

    mod persistence {
        use super::*;

        #[test]
        fn serde_roundtrip_preserves_everything() {
            let mut trade = trade_in(TradeState::DepositTxsUnlockedInBlockchain);
            trade
                .set_deposit_tx(TradeRole::Maker, TxId::new("tx-m"))
                .unwrap();
            trade.start_trade_period(Timestamp::now(), 86_400_000);
            trade.arm_resend(
                MessageId::new_v4(),
                PaymentMessageKind::PaymentStarted,
                Timestamp::now(),
            );
            let json = serde_json::to_string(&trade).unwrap();
            let back: Trade = serde_json::from_str(&json).unwrap();
            assert_eq!(back, trade);
            assert_eq!(back.pending_resend().unwrap().attempts, 1);
        }
    }

    #[test]
    fn short_id_truncates() {
        let trade = Trade::new(
            TradeId::new("abcdefgh-rest"),
            TradeRole::Maker,
            Amount::from_atomic(1),
            Price::new(Decimal::ONE).unwrap(),
        );
        assert_eq!(trade.short_id(), "abcdefgh");
    }
}
