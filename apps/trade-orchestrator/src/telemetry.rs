//! Tracing Setup
//!
//! Installs the `tracing` subscriber and bridges engine events to logs and
//! metrics.
//!
//! # Configuration
//!
//! - `RUST_LOG`: overrides `observability.logging.level`
//! - `observability.logging.format`: `pretty` or `json`
//!
//! # Usage
//!
//! ```rust,ignore
//! use trade_orchestrator::telemetry::{init_tracing, spawn_event_logger};
//!
//! init_tracing(&config.observability.logging);
//! let logger = spawn_event_logger(container.events(), shutdown.clone());
//! ```

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::domain::events::EngineEvent;
use crate::infrastructure::broadcast::EventBus;
use crate::infrastructure::metrics;

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed, which is the
/// normal case when several tests initialize logging.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = if config.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_current_span(false)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()
            .is_ok()
    };

    if installed {
        metrics::register_metrics();
        tracing::info!(level = %config.level, format = %config.format, "Tracing initialized");
    }
    installed
}

/// Subscribe to `events` and log and count every event until `shutdown`.
pub fn spawn_event_logger(events: &EventBus, shutdown: CancellationToken) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event logger lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            metrics::record_event(&event);
            log_event(&event);
        }
    })
}

fn log_event(event: &EngineEvent) {
    match serde_json::to_string(event) {
        Ok(json) => match event {
            EngineEvent::FeedUnavailable { .. } | EngineEvent::AutomationTickSkipped { .. } => {
                tracing::warn!(target: "trade_orchestrator::events", event = event.name(), payload = %json);
            }
            _ => {
                tracing::debug!(target: "trade_orchestrator::events", event = event.name(), payload = %json);
            }
        },
        Err(error) => tracing::warn!(event = event.name(), %error, "Unserializable event"),
    }
}
