//! # Mock Transport
//!
//! Scriptable in-memory [`MessageTransport`] for protocol tests.

use crate::domain::value_objects::TraderId;
use crate::infrastructure::transport::client::{
    MessageTransport, SendOutcome, TransportError, TransportResult,
};
use crate::infrastructure::transport::messages::TradeMessageEnvelope;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Scriptable in-memory transport.
///
/// Sends succeed with [`SendOutcome::Delivered`] unless outcomes were
/// scripted; every accepted envelope is recorded for inspection.
#[derive(Debug, Default)]
pub struct MockTransport {
    scripted: Mutex<VecDeque<TransportResult<SendOutcome>>>,
    sent: Mutex<Vec<(TraderId, TradeMessageEnvelope)>>,
}

impl MockTransport {
    /// Creates a transport that always delivers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the outcome of the next send.
    pub fn push_outcome(&self, outcome: TransportResult<SendOutcome>) {
        self.scripted.lock().push_back(outcome);
    }

    /// Makes the next `n` sends fail as unreachable.
    pub fn fail_next_sends(&self, n: usize) {
        let mut scripted = self.scripted.lock();
        for _ in 0..n {
            scripted.push_back(Err(TransportError::peer_unreachable("scripted")));
        }
    }

    /// Returns every accepted envelope with its recipient, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<(TraderId, TradeMessageEnvelope)> {
        self.sent.lock().clone()
    }

    /// Returns the number of accepted envelopes.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl MessageTransport for MockTransport {
    async fn send(
        &self,
        recipient: &TraderId,
        envelope: &TradeMessageEnvelope,
    ) -> TransportResult<SendOutcome> {
        let scripted = self.scripted.lock().pop_front();
        let outcome = match scripted {
            Some(outcome) => outcome?,
            None => SendOutcome::Delivered,
        };
        self.sent
            .lock()
            .push((recipient.clone(), envelope.clone()));
        Ok(outcome)
    }
}
