//! # Transport Layer
//!
//! Peer-to-peer message types, the delivery port, and signing.

pub mod client;
pub mod messages;
pub mod mock;
pub mod signing;

pub use client::{MessageTransport, SendOutcome, TransportError, TransportResult};
pub use messages::{TakeOfferRequest, TradeMessageEnvelope, TradeMessagePayload};
pub use mock::MockTransport;
pub use signing::{ContractSigner, MockSigner, SigningError, SigningResult};
