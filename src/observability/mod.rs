//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, stdout)
//!     → metrics.rs (stage durations, install and request counters)
//!
//! Consumers:
//!     → Container log collection (stdout, flushed per write when unbuffered)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```

pub mod logging;
pub mod metrics;
