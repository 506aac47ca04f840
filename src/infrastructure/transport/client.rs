//! # Message Transport Trait
//!
//! Port definition for peer-to-peer message delivery.
//!
//! Delivery is at-least-once: the transport may deliver directly, park the
//! message in the recipient's mailbox, or fail. Exactly-once *effects* are
//! the receiver's job (replay detection on the trade state machine).

use crate::domain::value_objects::TraderId;
use crate::infrastructure::transport::messages::TradeMessageEnvelope;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// How a message reached the recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The recipient was online and took delivery directly.
    Delivered,
    /// The recipient was offline; the message waits in their mailbox.
    MailboxStored,
}

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer could not be reached and mailbox storage also failed.
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    /// Message could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The send timed out.
    #[error("timeout: {0}")]
    Timeout(String),
}

impl TransportError {
    /// Creates a peer unreachable error.
    #[must_use]
    pub fn peer_unreachable(msg: impl Into<String>) -> Self {
        Self::PeerUnreachable(msg.into())
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Serialization(_))
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Trait for peer-to-peer message delivery.
#[async_trait]
pub trait MessageTransport: Send + Sync + fmt::Debug {
    /// Sends an envelope to a peer.
    ///
    /// # Errors
    ///
    /// Returns an error if neither direct delivery nor mailbox storage
    /// succeeded.
    async fn send(
        &self,
        recipient: &TraderId,
        envelope: &TradeMessageEnvelope,
    ) -> TransportResult<SendOutcome>;
}
