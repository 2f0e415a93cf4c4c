//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields: request_id, method, path, attempt)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → logging.rs installs a subscriber in binaries
//!     → whichever metrics recorder the host application installs
//! ```
//!
//! # Design Decisions
//! - The library never installs a global subscriber or recorder itself
//! - Correlation id flows through every attempt of a logical request
//! - Metrics are cheap no-ops when no recorder is installed

pub mod logging;
pub mod metrics;
