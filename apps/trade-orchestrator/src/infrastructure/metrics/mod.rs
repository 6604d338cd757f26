//! Metrics Module
//!
//! Counters and histograms recorded through the `metrics` facade. The
//! embedding process installs the exporter; without one every call is a
//! no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};

use crate::domain::events::EngineEvent;

// =============================================================================
// Metric Registration
// =============================================================================

/// Describe every metric this crate records.
pub fn register_metrics() {
    describe_counter!(
        "trade_orchestrator_events_total",
        "Engine events published, by event name"
    );
    describe_counter!(
        "trade_orchestrator_retries_total",
        "Backend call retries, by operation"
    );
    describe_counter!(
        "trade_orchestrator_stop_loss_writes_total",
        "Stop-loss writes by automations, by kind"
    );
    describe_counter!(
        "trade_orchestrator_runs_finished_total",
        "Orchestrator runs reaching a terminal state, by kind and state"
    );
    describe_histogram!(
        "trade_orchestrator_retry_delay_seconds",
        "Backoff delay before a retried backend call"
    );
}

// =============================================================================
// Metric Recording
// =============================================================================

/// Record one engine event.
pub fn record_event(event: &EngineEvent) {
    counter!("trade_orchestrator_events_total", "event" => event.name()).increment(1);

    match event {
        EngineEvent::RetryScheduled {
            operation, delay_ms, ..
        } => {
            counter!("trade_orchestrator_retries_total", "operation" => *operation).increment(1);
            histogram!("trade_orchestrator_retry_delay_seconds")
                .record(*delay_ms as f64 / 1_000.0);
        }
        EngineEvent::StopLossModified { kind, .. } => {
            counter!(
                "trade_orchestrator_stop_loss_writes_total",
                "kind" => kind.to_string()
            )
            .increment(1);
        }
        EngineEvent::RunTransition { kind, to, .. } if to.is_terminal(*kind) => {
            counter!(
                "trade_orchestrator_runs_finished_total",
                "kind" => kind.to_string(),
                "state" => to.to_string()
            )
            .increment(1);
        }
        _ => {}
    }
}
