//! Business metrics for the appeals service.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `appeals_tickets_created_total` - Tickets created
//! - `appeals_status_transitions_total{to}` - Status transitions by target status
//! - `appeals_messages_posted_total` - User messages posted
//! - `appeals_fanout_published_total` - Real-time events delivered to channels
//! - `appeals_push_sent_total{outcome}` - Push notifications by outcome (sent, failed, suppressed)
//! - `appeals_cache_requests_total{outcome}` - Cache lookups by outcome (hit, miss, error)

use appeals_core::TicketStatus;
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize and register all business metrics descriptions.
///
/// This should be called once at application startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!("appeals_tickets_created_total", "Total number of tickets created");
    describe_counter!(
        "appeals_status_transitions_total",
        "Total number of ticket status transitions by target status"
    );
    describe_counter!(
        "appeals_messages_posted_total",
        "Total number of user messages posted to ticket threads"
    );
    describe_counter!(
        "appeals_fanout_published_total",
        "Total number of real-time events published to channels"
    );
    describe_counter!(
        "appeals_push_sent_total",
        "Total number of push notifications by outcome (sent, failed, suppressed)"
    );
    describe_counter!(
        "appeals_cache_requests_total",
        "Total number of cache lookups by outcome (hit, miss, error)"
    );

    tracing::info!("Business metrics registered");
}

/// Install the Prometheus recorder and return the handle `/metrics` renders from.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed.
pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_business_metrics();
    Ok(handle)
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a ticket creation.
pub fn record_ticket_created() {
    metrics::counter!("appeals_tickets_created_total").increment(1);
}

/// Record a status transition.
pub fn record_status_transition(to: TicketStatus) {
    metrics::counter!("appeals_status_transitions_total", "to" => to.as_str()).increment(1);
    tracing::debug!(to = %to, "Recorded status transition metric");
}

/// Record a posted user message.
pub fn record_message_posted() {
    metrics::counter!("appeals_messages_posted_total").increment(1);
}

/// Record deliveries of one published event.
pub fn record_fanout(deliveries: usize) {
    metrics::counter!("appeals_fanout_published_total")
        .increment(u64::try_from(deliveries).unwrap_or(u64::MAX));
}

/// Record a push notification outcome.
pub fn record_push(outcome: &'static str) {
    metrics::counter!("appeals_push_sent_total", "outcome" => outcome).increment(1);
}

/// Record a cache lookup outcome.
pub fn record_cache(outcome: &'static str) {
    metrics::counter!("appeals_cache_requests_total", "outcome" => outcome).increment(1);
}
