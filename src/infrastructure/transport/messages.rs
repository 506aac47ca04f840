//! # Trade Messages
//!
//! Wire messages exchanged between the two trading peers.
//!
//! Every message travels in a [`TradeMessageEnvelope`] carrying the trade
//! id, the sender, a unique message id (the replay/ack key) and the
//! sender's signature over the canonical payload bytes.

use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{Amount, MessageId, OfferId, TradeId, TraderId, TxId};
use serde::{Deserialize, Serialize};

/// Request to take an offer, sent by the taker to the maker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeOfferRequest {
    /// The offer being taken.
    pub offer_id: OfferId,
    /// The taker.
    pub taker_id: TraderId,
    /// Amount to trade, within the offer's `[min_amount, amount]` range.
    pub amount: Amount,
    /// Taker's escrow public key.
    pub taker_pub_key: String,
    /// Taker's payout address.
    pub taker_payout_address: String,
    /// Snapshot of the taker's payment account.
    pub taker_payment_account: serde_json::Value,
}

/// Payload of a trade message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeMessagePayload {
    /// Taker requests to take an offer.
    TakeOffer(TakeOfferRequest),
    /// Buyer asserts the counter-currency payment was initiated.
    PaymentStarted {
        /// Reference in the external payment system, if any.
        counter_currency_tx_id: Option<String>,
    },
    /// Seller asserts the counter-currency payment arrived.
    PaymentReceived,
    /// Receipt acknowledgement for an earlier message.
    Ack {
        /// The message being acknowledged.
        acked_message_id: MessageId,
    },
}

impl TradeMessagePayload {
    /// Returns the wire name of this payload.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TakeOffer(_) => "TAKE_OFFER",
            Self::PaymentStarted { .. } => "PAYMENT_STARTED",
            Self::PaymentReceived => "PAYMENT_RECEIVED",
            Self::Ack { .. } => "ACK",
        }
    }
}

/// Envelope around every peer-to-peer trade message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeMessageEnvelope {
    /// Unique message id; the replay and ack key.
    pub message_id: MessageId,
    /// The trade this message belongs to.
    pub trade_id: TradeId,
    /// Who sent it.
    pub sender: TraderId,
    /// When it was sent.
    pub sent_at: Timestamp,
    /// The payload.
    pub payload: TradeMessagePayload,
    /// Sender's signature over [`Self::signable_bytes`].
    pub signature: String,
}

impl TradeMessageEnvelope {
    /// Creates an unsigned envelope with a fresh message id.
    #[must_use]
    pub fn new(trade_id: TradeId, sender: TraderId, payload: TradeMessagePayload) -> Self {
        Self {
            message_id: MessageId::new_v4(),
            trade_id,
            sender,
            sent_at: Timestamp::now(),
            payload,
            signature: String::new(),
        }
    }

    /// Returns the bytes covered by the signature.
    ///
    /// The signature field itself is excluded; `sent_at` is excluded so a
    /// resend of the same message verifies identically.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the payload cannot be encoded.
    pub fn signable_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        #[derive(Serialize)]
        struct Signable<'a> {
            message_id: &'a MessageId,
            trade_id: &'a TradeId,
            sender: &'a TraderId,
            payload: &'a TradeMessagePayload,
        }
        serde_json::to_vec(&Signable {
            message_id: &self.message_id,
            trade_id: &self.trade_id,
            sender: &self.sender,
            payload: &self.payload,
        })
    }

    /// Attaches a signature.
    #[must_use]
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Builds the ack for this message, from the given responder.
    #[must_use]
    pub fn ack_from(&self, responder: TraderId) -> Self {
        Self::new(
            self.trade_id.clone(),
            responder,
            TradeMessagePayload::Ack {
                acked_message_id: self.message_id,
            },
        )
    }
}
