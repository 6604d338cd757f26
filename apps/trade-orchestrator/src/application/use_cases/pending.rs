//! Pending order handling shared by the bracket and straddle runs.
//!
//! Deletion always goes through `delete_order`, which the backend refuses
//! once a ticket has filled, so expiring an order never closes a position.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::run::RunServices;
use crate::application::ports::TradingBackend;
use crate::domain::market::OrderSnapshot;
use crate::domain::shared::Ticket;
use crate::error::ExecutionError;

/// What ended the wait for a fill.
pub(crate) enum Waited {
    Filled(OrderSnapshot),
    Deadline,
}

/// Poll `tickets` until one of them fills or `deadline` passes.
///
/// Tickets are read in order each interval; the first filled one wins.
pub(crate) async fn await_fill<B: TradingBackend + ?Sized>(
    services: &RunServices<B>,
    tickets: &[Ticket],
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<Waited, ExecutionError> {
    let interval = services.config.fill_poll_interval();
    loop {
        let wake = (Instant::now() + interval).min(deadline);
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(ExecutionError::Cancelled { operation: "await_fill" });
            }
            () = tokio::time::sleep_until(wake) => {}
        }
        if Instant::now() >= deadline {
            return Ok(Waited::Deadline);
        }

        for &ticket in tickets {
            let poll_deadline = services.step_deadline().min(deadline);
            match services.guard.get_order(ticket, poll_deadline, cancel).await {
                Ok(Some(order)) if !order.is_pending() => return Ok(Waited::Filled(order)),
                Ok(Some(_)) => {}
                Ok(None) => return Err(ExecutionError::OrderNotFound { ticket }),
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) if error.is_transient() => {
                    tracing::warn!(%ticket, error = %error, "Fill poll failed, retrying next interval");
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Delete `ticket` unless it filled meanwhile.
///
/// `Ok(Some(order))` when a fill was found instead, `Ok(None)` after a
/// successful delete. A refused delete is followed by one more read, and
/// only a fill found there is reported as such.
pub(crate) async fn delete_unless_filled<B: TradingBackend + ?Sized>(
    services: &RunServices<B>,
    ticket: Ticket,
    cancel: &CancellationToken,
) -> Result<Option<OrderSnapshot>, ExecutionError> {
    let guard = &services.guard;

    match guard.get_order(ticket, services.step_deadline(), cancel).await {
        Ok(Some(order)) if !order.is_pending() => {
            tracing::info!(%ticket, "Order filled before it could be deleted");
            return Ok(Some(order));
        }
        Ok(Some(_)) => {}
        Ok(None) => return Err(ExecutionError::OrderNotFound { ticket }),
        Err(error) if error.is_cancelled() => return Err(error),
        Err(error) => {
            tracing::warn!(%ticket, error = %error, "Pre-delete check failed, trying a pending-only delete");
        }
    }

    match guard.delete_order(ticket, services.step_deadline(), cancel).await {
        Ok(()) => {
            tracing::info!(%ticket, "Pending order deleted");
            Ok(None)
        }
        Err(error) if error.is_cancelled() => Err(error),
        Err(delete_error) => {
            tracing::warn!(%ticket, error = %delete_error, "Delete refused, re-checking for a fill");
            match guard.get_order(ticket, services.step_deadline(), cancel).await {
                Ok(Some(order)) if !order.is_pending() => Ok(Some(order)),
                Ok(_) => Err(delete_error),
                Err(error) if error.is_cancelled() => Err(error),
                Err(_) => Err(delete_error),
            }
        }
    }
}

/// Best-effort delete of an order the run is giving up on.
///
/// Uses its own token, so it still runs after the run's token fired.
pub(crate) async fn discard<B: TradingBackend + ?Sized>(services: &RunServices<B>, ticket: Ticket) {
    let cleanup = CancellationToken::new();
    match services
        .guard
        .delete_order(ticket, services.step_deadline(), &cleanup)
        .await
    {
        Ok(()) => tracing::info!(%ticket, "Pending order discarded"),
        Err(e) => tracing::warn!(%ticket, error = %e, "Could not discard pending order"),
    }
}
