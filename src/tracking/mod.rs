//! Engagement tracking: link instrumentation, tracker and public endpoints.

pub mod links;
pub mod routes;
pub mod tracker;

pub use links::TrackingLinks;
pub use routes::{TrackingRouteState, tracking_routes};
pub use tracker::EngagementTracker;
