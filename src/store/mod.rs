//! Persistence layer: libSQL-backed storage for leads, messages and sender quotas.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{DailyMetrics, Database, LeadScoreUpdate, MetricsDelta, SentReceipt};
