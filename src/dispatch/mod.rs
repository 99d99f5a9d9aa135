//! Dispatch: sends due messages through the sender pool.

pub mod dispatcher;

pub use dispatcher::{DispatchSummary, Dispatcher};
