//! Prometheus metrics for queue consumers and stream processors

use crate::processor::EntryOutcome;
use crate::queue::QueueOutcome;
use crate::store::GroupCreation;
use metrics::counter;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize Prometheus metrics
///
/// Call this once at startup. Subsequent calls are no-ops.
pub fn init_metrics() -> Result<(), BuildError> {
    PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        info!("Prometheus metrics initialized");
        Ok::<_, BuildError>(handle)
    })?;
    Ok(())
}

/// Get the Prometheus handle for rendering metrics
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus format
pub fn render_metrics() -> String {
    prometheus_handle().map(|h| h.render()).unwrap_or_default()
}

/// Record how a popped queue message was handled
pub fn record_queue_outcome(queue: &str, outcome: &QueueOutcome) {
    counter!(
        "message_consumer_queue_messages_total",
        "queue" => queue.to_string(),
        "outcome" => outcome.as_ref().to_string()
    )
    .increment(1);
}

/// Record a message that could not be written to its DLQ
pub fn record_dlq_failure(queue: &str) {
    counter!(
        "message_consumer_dlq_failures_total",
        "queue" => queue.to_string()
    )
    .increment(1);
}

/// Record how a stream entry was handled
pub fn record_entry_outcome(stream: &str, outcome: &EntryOutcome) {
    counter!(
        "message_consumer_stream_entries_total",
        "stream" => stream.to_string(),
        "outcome" => outcome.as_ref().to_string()
    )
    .increment(1);
}

/// Record a non-empty batch read from a stream
pub fn record_batch_size(stream: &str, size: usize) {
    counter!(
        "message_consumer_stream_batches_total",
        "stream" => stream.to_string()
    )
    .increment(1);

    counter!(
        "message_consumer_stream_entries_read_total",
        "stream" => stream.to_string()
    )
    .increment(size as u64);
}

/// Record a consumer group registration
pub fn record_group_creation(stream: &str, creation: GroupCreation) {
    counter!(
        "message_consumer_group_registrations_total",
        "stream" => stream.to_string(),
        "result" => creation.as_ref().to_string()
    )
    .increment(1);
}
