//! Domain events.

pub mod trade_events;

pub use trade_events::{EventMetadata, TradeEvent};
