//! # Application Layer
//!
//! Protocol orchestration over the domain: lifecycle commands, escrow
//! coordination, the payment-message protocol and the error surface the
//! layers above see.

pub mod error;
pub mod services;

pub use error::{ProtocolError, ProtocolResult};
