//! Telemetry: structured logging and metrics for the security core.
//!
//! - **Logging**: `tracing` subscriber setup with credential redaction
//! - **Metrics**: vote, context and audit-log counters via the `metrics` facade
//!
//! # Example
//!
//! ```rust,no_run
//! use vigil_core::telemetry::{init_logging, LoggingConfig};
//!
//! init_logging(&LoggingConfig::default(), "production").expect("Failed to initialize logging");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig, RedactionConfig, SensitiveFieldRedactor};
pub use metrics::{
    register_metric_descriptions, AuditLogCounter, CallTimer, ContextCounter, VoteCounter,
};
