//! Sender pool: phone numbers and sending domains with daily quotas.

pub mod model;
pub mod pool;

pub use model::SenderIdentity;
pub use pool::SenderPool;
