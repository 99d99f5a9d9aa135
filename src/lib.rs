//! Outreach: lead scoring, multi-channel sequencing and rate-limited dispatch.

pub mod batch;
pub mod channels;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod leads;
pub mod messages;
pub mod scoring;
pub mod senders;
pub mod sequencer;
pub mod server;
pub mod store;
pub mod throttle;
pub mod tracking;
