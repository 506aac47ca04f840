//! # Infrastructure Layer
//!
//! Ports and adapters for persistence, the wallet, and peer transport.

pub mod persistence;
pub mod transport;
pub mod wallet;
