//! # Wallet Layer
//!
//! The [`WalletClient`] port and its in-memory mock.

pub mod client;
pub mod mock;

pub use client::{TxDraft, TxKind, TxOutput, WalletClient, WalletError, WalletResult};
pub use mock::MockWallet;
