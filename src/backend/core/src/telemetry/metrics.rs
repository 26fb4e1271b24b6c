//! Counters and histograms emitted by the security core.
//!
//! Only the `metrics` facade is used here. Installing a recorder (Prometheus
//! or otherwise) is left to the embedding server.
//!
//! # Example
//!
//! ```rust
//! use vigil_core::telemetry::metrics::VoteCounter;
//!
//! VoteCounter::record("update", true);
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::sync::Once;
use std::time::Instant;

static DESCRIBE: Once = Once::new();

/// Register all metric descriptions. Safe to call more than once.
pub fn register_metric_descriptions() {
    DESCRIBE.call_once(|| {
        // Votes
        describe_counter!("vigil_votes_total", "Authorization votes by operation and decision");

        // Contexts
        describe_counter!(
            "vigil_contexts_established_total",
            "Event contexts established, by read-only flag"
        );
        describe_counter!(
            "vigil_context_reuse_total",
            "Stateful contexts reinstalled without re-resolution"
        );

        // Audit
        describe_counter!("vigil_audit_logs_flushed_total", "Audit log entries bulk-inserted");

        // Calls
        describe_histogram!(
            "vigil_call_duration_seconds",
            "Intercepted call duration in seconds"
        );

        // Errors
        describe_counter!("vigil_errors_total", "Errors constructed, by code");
    });
}

/// Vote outcomes.
pub struct VoteCounter;

impl VoteCounter {
    pub fn record(operation: &'static str, allowed: bool) {
        counter!(
            "vigil_votes_total",
            "operation" => operation,
            "decision" => if allowed { "allow" } else { "deny" },
        )
        .increment(1);
    }
}

/// Context lifecycle.
pub struct ContextCounter;

impl ContextCounter {
    pub fn established(read_only: bool) {
        counter!(
            "vigil_contexts_established_total",
            "read_only" => read_only.to_string(),
        )
        .increment(1);
    }

    pub fn reused() {
        counter!("vigil_context_reuse_total").increment(1);
    }
}

/// Audit log persistence.
pub struct AuditLogCounter;

impl AuditLogCounter {
    pub fn flushed(count: usize) {
        counter!("vigil_audit_logs_flushed_total").increment(count as u64);
    }
}

/// Times one intercepted call; records on [`CallTimer::finish`].
pub struct CallTimer {
    start: Instant,
    service: String,
    method: String,
}

impl CallTimer {
    pub fn start(service: &str, method: &str) -> Self {
        Self {
            start: Instant::now(),
            service: service.to_string(),
            method: method.to_string(),
        }
    }

    pub fn finish(self, outcome: &'static str) {
        histogram!(
            "vigil_call_duration_seconds",
            "service" => self.service,
            "method" => self.method,
            "outcome" => outcome,
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}
