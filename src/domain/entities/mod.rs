//! Domain entities and aggregate roots.

pub mod contract;
pub mod dispute;
pub mod offer;
pub mod trade;

pub use contract::{Contract, ContractBuilder};
pub use dispute::{Dispute, DisputeResult, DisputeState};
pub use offer::Offer;
pub use trade::{Applied, PaymentMessageKind, PendingResend, Trade};
