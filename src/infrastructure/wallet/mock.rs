//! # Mock Wallet
//!
//! Scriptable in-memory [`WalletClient`] for driving protocol tests.
//!
//! Broadcast failures, confirmation counts and spent-ness are set by the
//! test; the wallet itself never fails spontaneously.

use crate::domain::value_objects::{Amount, TradeId, TxId};
use crate::infrastructure::wallet::client::{
    TxDraft, TxKind, TxOutput, WalletClient, WalletError, WalletResult,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Scriptable in-memory wallet.
#[derive(Debug, Default)]
pub struct MockWallet {
    balance: AtomicU64,
    /// Broadcasts left to fail before succeeding.
    broadcast_failures: AtomicU32,
    next_tx: AtomicU64,
    published: Mutex<Vec<TxDraft>>,
    confirmations: Mutex<HashMap<TxId, u32>>,
    spent: Mutex<HashMap<TxId, bool>>,
}

impl MockWallet {
    /// Creates a mock wallet holding the given balance.
    #[must_use]
    pub fn with_balance(balance: Amount) -> Self {
        let wallet = Self::default();
        wallet.balance.store(balance.as_atomic(), Ordering::SeqCst);
        wallet
    }

    /// Makes the next `n` broadcasts fail with a retryable error.
    pub fn fail_next_broadcasts(&self, n: u32) {
        self.broadcast_failures.store(n, Ordering::SeqCst);
    }

    /// Sets the confirmation count reported for a transaction.
    pub fn set_confirmations(&self, tx_id: TxId, confirmations: u32) {
        self.confirmations.lock().insert(tx_id, confirmations);
    }

    /// Marks a transaction's outputs as spent.
    pub fn mark_spent(&self, tx_id: TxId) {
        self.spent.lock().insert(tx_id, true);
    }

    /// Returns every draft that was broadcast, in order.
    #[must_use]
    pub fn published(&self) -> Vec<TxDraft> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl WalletClient for MockWallet {
    async fn get_balance(&self) -> WalletResult<Amount> {
        Ok(Amount::from_atomic(self.balance.load(Ordering::SeqCst)))
    }

    async fn build_tx(
        &self,
        trade_id: &TradeId,
        kind: TxKind,
        outputs: Vec<TxOutput>,
    ) -> WalletResult<TxDraft> {
        let required = outputs
            .iter()
            .map(|o| o.amount.as_atomic())
            .sum::<u64>();
        let available = self.balance.load(Ordering::SeqCst);
        if required > available {
            return Err(WalletError::InsufficientFunds {
                required: Amount::from_atomic(required),
                available: Amount::from_atomic(available),
            });
        }
        Ok(TxDraft {
            trade_id: trade_id.clone(),
            kind,
            outputs,
        })
    }

    async fn broadcast(&self, draft: &TxDraft) -> WalletResult<TxId> {
        let remaining = self.broadcast_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.broadcast_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(WalletError::broadcast("scripted broadcast failure"));
        }
        let seq = self.next_tx.fetch_add(1, Ordering::SeqCst);
        let tx_id = TxId::new(format!("tx-{}-{seq}", draft.trade_id));
        self.published.lock().push(draft.clone());
        self.confirmations.lock().insert(tx_id.clone(), 0);
        Ok(tx_id)
    }

    async fn get_confirmations(&self, tx_id: &TxId) -> WalletResult<u32> {
        self.confirmations
            .lock()
            .get(tx_id)
            .copied()
            .ok_or_else(|| WalletError::rpc(format!("unknown tx {tx_id}")))
    }

    async fn is_unspent(&self, tx_id: &TxId) -> WalletResult<bool> {
        Ok(!self.spent.lock().get(tx_id).copied().unwrap_or(false))
    }
}
