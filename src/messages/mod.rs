//! Outbound messages produced by the sequencer and consumed by the dispatcher.

pub mod model;

pub use model::{Engagement, MessageStatus, OutboundMessage};
