//! # Wallet Client Trait
//!
//! Port definition for wallet and chain interactions.
//!
//! The engine never signs or inspects raw transactions itself; everything
//! chain-facing goes through [`WalletClient`]. The multisig details of the
//! escrow are the wallet's concern, the engine only tracks tx ids and
//! confirmation counts.

use crate::domain::value_objects::{Amount, TradeId, TxId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// What a drafted transaction is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxKind {
    /// A party's security deposit (plus trade amount for the seller).
    Deposit,
    /// The cooperative or arbitrated payout from the escrow.
    Payout,
}

/// A single output of a drafted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Destination address.
    pub address: String,
    /// Amount paid to the address.
    pub amount: Amount,
}

/// An unsigned transaction prepared by the wallet, ready to broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxDraft {
    /// The trade this transaction belongs to.
    pub trade_id: TradeId,
    /// What the transaction is for.
    pub kind: TxKind,
    /// Its outputs.
    pub outputs: Vec<TxOutput>,
}

/// Error type for wallet operations.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Not enough spendable funds to cover the requested amount.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        /// Amount the operation needed.
        required: Amount,
        /// Amount actually spendable.
        available: Amount,
    },

    /// Broadcast rejected or lost by the network.
    #[error("broadcast error: {0}")]
    Broadcast(String),

    /// Wallet RPC failure.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Wallet RPC timed out.
    #[error("timeout: {0}")]
    Timeout(String),
}

impl WalletError {
    /// Creates a broadcast error.
    #[must_use]
    pub fn broadcast(msg: impl Into<String>) -> Self {
        Self::Broadcast(msg.into())
    }

    /// Creates an RPC error.
    #[must_use]
    pub fn rpc(msg: impl Into<String>) -> Self {
        Self::Rpc(msg.into())
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Returns true if this error is retryable.
    ///
    /// Insufficient funds is not: retrying without operator action cannot
    /// change the outcome.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InsufficientFunds { .. })
    }
}

/// Result type for wallet operations.
pub type WalletResult<T> = Result<T, WalletError>;

/// Trait for wallet operations.
#[async_trait]
pub trait WalletClient: Send + Sync + fmt::Debug {
    /// Returns the spendable balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC call fails.
    async fn get_balance(&self) -> WalletResult<Amount>;

    /// Drafts a transaction funding the given outputs.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InsufficientFunds`] if the outputs exceed
    /// the spendable balance.
    async fn build_tx(
        &self,
        trade_id: &TradeId,
        kind: TxKind,
        outputs: Vec<TxOutput>,
    ) -> WalletResult<TxDraft>;

    /// Signs and broadcasts a drafted transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if signing or broadcast fails.
    async fn broadcast(&self, draft: &TxDraft) -> WalletResult<TxId>;

    /// Returns the confirmation count of a transaction.
    ///
    /// Zero means the transaction is known but unconfirmed.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is unknown or the call fails.
    async fn get_confirmations(&self, tx_id: &TxId) -> WalletResult<u32>;

    /// Returns true if the transaction's outputs are all unspent.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is unknown or the call fails.
    async fn is_unspent(&self, tx_id: &TxId) -> WalletResult<bool>;
}
