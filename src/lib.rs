//! # escrow-engine
//!
//! A peer-to-peer escrow trade protocol engine: two traders lock deposits
//! into a multisig escrow, exchange signed payment-confirmation messages,
//! and release the escrow cooperatively or through an arbitrated dispute.
//!
//! The crate is layered:
//! - [`domain`]: value objects, the trade/offer/contract/dispute entities
//!   and the phase/state machine, with no IO
//! - [`application`]: the [`TradeManager`](application::services::TradeManager)
//!   and its supporting services (escrow coordination, the payment
//!   protocol, payout math, retry backoff)
//! - [`infrastructure`]: async-trait ports for the wallet, the peer
//!   transport, signing and persistence, with in-memory and mock adapters
//!
//! # Example
//!
//! ```
//! use escrow_engine::application::services::{
//!     EscrowConfig, EscrowCoordinator, ManagerConfig, PaymentProtocol, TradeManager,
//! };
//! use escrow_engine::domain::value_objects::Amount;
//! use escrow_engine::infrastructure::persistence::in_memory::{
//!     InMemoryOfferRepository, InMemoryTradeRepository,
//! };
//! use escrow_engine::infrastructure::transport::{ContractSigner, MessageTransport, MockSigner, MockTransport};
//! use escrow_engine::infrastructure::wallet::{MockWallet, WalletClient};
//! use std::sync::Arc;
//!
//! let wallet: Arc<dyn WalletClient> =
//!     Arc::new(MockWallet::with_balance(Amount::from_atomic(50_000_000)));
//! let transport: Arc<dyn MessageTransport> = Arc::new(MockTransport::new());
//! let signer: Arc<dyn ContractSigner> = Arc::new(MockSigner::new("local-key"));
//!
//! let manager = TradeManager::new(
//!     Arc::new(InMemoryTradeRepository::new()),
//!     Arc::new(InMemoryOfferRepository::new()),
//!     EscrowCoordinator::new(wallet, EscrowConfig::default()),
//!     PaymentProtocol::new(transport, Arc::clone(&signer)),
//!     signer,
//!     ManagerConfig::default().with_payout_address("addr:local"),
//! );
//! let _events = manager.subscribe();
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::error::{ProtocolError, ProtocolResult};
pub use application::services::TradeManager;
pub use domain::errors::{DomainError, DomainResult};
