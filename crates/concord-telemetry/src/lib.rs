//! Observability (§4.5, §10.2): structured logging via `tracing-subscriber`,
//! correlation span helpers, and an in-process Prometheus-style metrics
//! collector, grounded on `at_telemetry::{logging, tracing_setup, metrics,
//! middleware}`.
//!
//! The engine has no external metrics backend — `MetricsCollector` is
//! queried directly by `concord-cli`'s `doctor`/`status` commands and by
//! `concord-bridge`'s `/metrics` endpoint.

pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod tracing_setup;

pub use logging::{init_logging, LogFormat};
pub use metrics::{global_metrics, MetricsCollector};
pub use tracing_setup::{correlation_span, generate_correlation_id};
