//! Observability module
//!
//! Structured job lifecycle logging and Prometheus metrics.

pub mod metrics_collector;
pub mod structured_logger;

pub use metrics_collector::{init_metrics, MetricsCollector};
pub use structured_logger::StructuredLogger;
