//! Prometheus metrics for the message store
//!
//! Tracks writes, validation rejections, provisioning steps and expiry sweeps

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::time::Duration;

/// Store writes by operation (insert/replace/mark_read/...) and status
static WRITES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "message_store_writes_total",
        "Message store write operations by operation and status",
        &["operation", "status"]
    )
    .expect("failed to register message_store_writes_total")
});

/// Writes refused by the document contract, per error code
static VALIDATION_REJECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "message_store_validation_rejections_total",
        "Writes rejected by message validation",
        &["code"]
    )
    .expect("failed to register message_store_validation_rejections_total")
});

static PROVISION_STEPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "message_store_provision_steps_total",
        "Provisioning steps by kind (collection/index) and outcome",
        &["kind", "outcome"]
    )
    .expect("failed to register message_store_provision_steps_total")
});

static EXPIRY_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "message_store_expiry_runs_total",
        "Expiry sweep cycles (success/error)",
        &["status"]
    )
    .expect("failed to register message_store_expiry_runs_total")
});

static EXPIRED_MESSAGES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "message_store_expired_messages_total",
        "Messages removed by the expiry sweeper"
    )
    .expect("failed to register message_store_expired_messages_total")
});

static EXPIRY_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "message_store_expiry_duration_seconds",
        "Duration of one expiry sweep",
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("failed to register message_store_expiry_duration_seconds")
});

pub fn record_write(operation: &str, status: &str) {
    WRITES_TOTAL.with_label_values(&[operation, status]).inc();
}

pub fn record_validation_rejection(code: &str) {
    VALIDATION_REJECTIONS_TOTAL.with_label_values(&[code]).inc();
}

pub fn record_provision_step(kind: &str, outcome: &str) {
    PROVISION_STEPS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

pub fn record_expiry_run(status: &str, duration: Duration) {
    EXPIRY_RUNS_TOTAL.with_label_values(&[status]).inc();
    EXPIRY_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn record_expired(count: u64) {
    EXPIRED_MESSAGES_TOTAL.inc_by(count);
}

/// Text exposition of the default registry
pub fn render() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_metrics_are_rendered() {
        record_write("insert", "success");
        record_expired(3);
        let text = render();
        assert!(text.contains("message_store_writes_total"));
        assert!(text.contains("message_store_expired_messages_total"));
    }
}
