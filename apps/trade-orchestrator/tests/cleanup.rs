//! Panic Close Integration Tests

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use common::{EURUSD, container, long_position, paper, settle, tick};
use trade_orchestrator::application::ports::BackendError;
use trade_orchestrator::application::ProfitFilter;
use trade_orchestrator::infrastructure::paper::BackendOperation;
use trade_orchestrator::{
    AutomationRequest, ExecutionError, OrderType, PaperBackend, PanicCloseRequest,
    SubscriptionStatus, Symbol, Ticket,
};

/// Winner (1), loser (2), pending buy limit (3) on EURUSD, plus a GBPUSD
/// position (4) that must never be touched.
fn seed(paper: &PaperBackend) {
    paper.insert_order(long_position(1, dec!(1.09900), None));
    paper.insert_order(long_position(2, dec!(1.10100), None));

    let mut pending = long_position(3, dec!(1.09500), None);
    pending.order_type = OrderType::Limit;
    paper.insert_order(pending);

    let mut other = long_position(4, dec!(1.25000), None);
    other.symbol = Symbol::new("GBPUSD");
    paper.insert_order(other);

    // Revalues the EURUSD positions: +9.9 and -10.1.
    paper.set_quote(tick(dec!(1.10000), 0));
}

#[tokio::test(start_paused = true)]
async fn winners_are_closed_and_pending_orders_deleted() {
    let paper = paper();
    seed(&paper);
    let container = container(&paper);
    let trailing = container
        .scheduler()
        .start(AutomationRequest::trailing(Ticket::new(1), dec!(0.00150), None, 5))
        .unwrap();
    settle().await;

    let request = PanicCloseRequest::symbol(EURUSD).with_profit_filter(ProfitFilter::Winners);
    let report = container
        .panic_close_use_case()
        .execute(&request, &CancellationToken::new())
        .await
        .unwrap();
    settle().await;

    assert_eq!(report.closed, vec![Ticket::new(1)]);
    assert_eq!(report.deleted, vec![Ticket::new(3)]);
    assert!(report.is_clean());
    assert_eq!(report.automations_stopped, 1);
    assert_eq!(
        container.scheduler().status(trailing),
        Some(SubscriptionStatus::Cancelled)
    );
    assert_eq!(report.account.unwrap().balance, dec!(10009.9));

    assert_eq!(paper.close_requests(), vec![Ticket::new(1)]);
    assert_eq!(paper.delete_requests(), vec![Ticket::new(3)]);
    let remaining: Vec<Ticket> = paper.orders().iter().map(|o| o.ticket).collect();
    assert_eq!(remaining, vec![Ticket::new(2), Ticket::new(4)]);

    container.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn one_failed_close_does_not_abort_the_sweep() {
    let paper = paper();
    seed(&paper);
    paper.fail_next(BackendOperation::CloseOrder, BackendError::rejected(133, "trade is disabled"));
    let container = container(&paper);

    let report = container
        .panic_close_use_case()
        .execute(&PanicCloseRequest::symbol(EURUSD), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.is_clean());
    assert_eq!(report.failures.len(), 1);
    let (ticket, error) = &report.failures[0];
    assert_eq!(*ticket, Ticket::new(1));
    assert!(matches!(error, ExecutionError::TradeRejected { code: 133, .. }));
    assert_eq!(report.closed, vec![Ticket::new(2)]);
    assert_eq!(report.deleted, vec![Ticket::new(3)]);

    let remaining: Vec<Ticket> = paper.orders().iter().map(|o| o.ticket).collect();
    assert_eq!(remaining, vec![Ticket::new(1), Ticket::new(4)]);
}

#[tokio::test(start_paused = true)]
async fn listing_failure_fails_the_whole_request() {
    let paper = paper();
    seed(&paper);
    paper.fail_next(BackendOperation::GetOpenOrders, BackendError::rejected(133, "trade is disabled"));
    let container = container(&paper);

    let result = container
        .panic_close_use_case()
        .execute(&PanicCloseRequest::symbol(EURUSD), &CancellationToken::new())
        .await;

    assert!(result.is_err());
    assert!(paper.close_requests().is_empty());
    assert!(paper.delete_requests().is_empty());
}
