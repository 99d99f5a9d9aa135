//! Leads: prospective customers moving through the pipeline.

pub mod model;

pub use model::{Lead, LeadStatus, Priority};
