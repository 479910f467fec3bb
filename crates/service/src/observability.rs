use once_cell::sync::Lazy;
use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

// Prometheus metrics (default registry)
pub static AUDIT_EVENTS_ENQUEUED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "retail_audit_events_enqueued_total",
        "Audit events written to the queue"
    )
    .expect("register audit_events_enqueued_total")
});

pub static AUDIT_ENQUEUE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "retail_audit_enqueue_failures_total",
        "Audit events dropped because the queue rejected them"
    )
    .expect("register audit_enqueue_failures_total")
});

pub static AUDIT_MESSAGES_PROCESSED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "retail_audit_messages_processed_total",
        "Queue messages processed and deleted by the audit consumer"
    )
    .expect("register audit_messages_processed_total")
});

pub static AUDIT_PROCESSING_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "retail_audit_processing_failures_total",
        "Queue messages left for redelivery after a processing failure"
    )
    .expect("register audit_processing_failures_total")
});

pub static QUEUE_RECEIVE_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "retail_queue_receive_errors_total",
        "Failed receive calls that put the audit consumer into backoff"
    )
    .expect("register queue_receive_errors_total")
});

pub static VERSION_CONFLICTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "retail_store_version_conflicts_total",
        "Updates and deletes rejected by the optimistic concurrency check"
    )
    .expect("register store_version_conflicts_total")
});

/// Render the default registry in the prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# metrics encode error: {e}\n");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_registered_counters() {
        VERSION_CONFLICTS_TOTAL.inc();
        let text = encode_metrics();
        assert!(text.contains("retail_store_version_conflicts_total"));
    }
}
