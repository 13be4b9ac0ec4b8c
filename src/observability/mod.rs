//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! isolation / boot / scheduling
//!     → logging.rs (tracing subscriber, pretty or JSON)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout log collection
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Metric updates are no-ops until a recorder is installed, so library
//!   code records unconditionally
//! - `RUST_LOG` always overrides the configured level

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
