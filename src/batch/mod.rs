//! Batch actions: score-and-sequence, dispatch and reset: and their triggers.

pub mod routes;
pub mod runner;
pub mod scheduler;

pub use routes::{TriggerRouteState, trigger_routes};
pub use runner::{BatchAction, BatchLimits, BatchReport, BatchRunner, ScoringSummary};
pub use scheduler::spawn_scheduler;
