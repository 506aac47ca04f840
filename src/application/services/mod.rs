//! # Application Services
//!
//! Services that orchestrate domain logic and infrastructure.
//!
//! This module provides application-level services including:
//! - [`TradeManager`]: Per-trade serialized lifecycle orchestration
//! - [`EscrowCoordinator`]: Deposit and payout transaction handling
//! - [`PaymentProtocol`]: Signed payment-message exchange with resends
//! - [`PayoutCalculator`]: Cooperative and arbitrated payout math

pub mod backoff;
pub mod escrow_coordinator;
pub mod payment_protocol;
pub mod payout_calculator;
pub mod trade_manager;

pub use backoff::BackoffPolicy;
pub use escrow_coordinator::{ConfirmationStatus, EscrowConfig, EscrowCoordinator};
pub use payment_protocol::{InboundOutcome, PaymentProtocol};
pub use payout_calculator::{PayoutCalculator, PayoutSplit};
pub use trade_manager::{ManagerConfig, TradeManager};
