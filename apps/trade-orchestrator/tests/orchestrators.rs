//! Orchestrator Integration Tests
//!
//! Market one-shot, pending-bracket and OCO straddle runs against the paper
//! backend.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use common::{buy_stop, container, drain, market_buy, paper, plain_risk, settle, tick};
use trade_orchestrator::application::ports::{BackendError, ModifyOrderRequest};
use trade_orchestrator::infrastructure::paper::{BackendCall, BackendOperation};
use trade_orchestrator::{
    EngineEvent, ExecutionError, LegRisk, PaperBackend, RiskPreset, RunState, RunStatus,
    StraddleRequest, SubscriptionStatus,
};

// =============================================================================
// Market one-shot
// =============================================================================

#[tokio::test(start_paused = true)]
async fn market_entry_is_protected_at_the_fill_price() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    let container = container(&paper);

    let outcome = container
        .market_one_shot_use_case()
        .execute(&market_buy(plain_risk()), &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, RunStatus::Done);
    assert!(outcome.error.is_none());
    assert_eq!(
        outcome.history,
        vec![RunState::Idle, RunState::Sent, RunState::Protected, RunState::Done]
    );
    let ticket = outcome.ticket.unwrap();

    // Sent bare, then protected around the ask fill.
    let placed = paper
        .calls()
        .into_iter()
        .find_map(|call| match call {
            BackendCall::PlaceOrder(request) => Some(request),
            _ => None,
        })
        .unwrap();
    assert_eq!(placed.stop_loss, None);
    assert_eq!(placed.take_profit, None);
    assert_eq!(
        paper.modify_requests(),
        vec![ModifyOrderRequest::protection(ticket, dec!(1.09801), Some(dec!(1.10401)))]
    );
    let position = paper.order(ticket).unwrap();
    assert_eq!(position.stop_loss, Some(dec!(1.09801)));
    assert_eq!(position.take_profit, Some(dec!(1.10401)));
}

#[tokio::test(start_paused = true)]
async fn transient_quote_failures_are_retried() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    paper.fail_times(BackendOperation::GetQuote, 2, BackendError::network("connection reset"));
    let container = container(&paper);
    let mut events = container.events().subscribe();

    let outcome = container
        .market_one_shot_use_case()
        .execute(&market_buy(plain_risk()), &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, RunStatus::Done);
    assert_eq!(paper.call_count(BackendOperation::GetQuote), 3);
    let retries = drain(&mut events)
        .into_iter()
        .filter(|event| matches!(event, EngineEvent::RetryScheduled { .. }))
        .count();
    assert_eq!(retries, 2);
}

#[tokio::test(start_paused = true)]
async fn rejected_entry_fails_without_a_ticket() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    paper.fail_next(BackendOperation::PlaceOrder, BackendError::rejected(134, "not enough money"));
    let container = container(&paper);

    let outcome = container
        .market_one_shot_use_case()
        .execute(&market_buy(plain_risk()), &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.ticket, None);
    assert!(matches!(
        outcome.error,
        Some(ExecutionError::TradeRejected { code: 134, .. })
    ));
    assert_eq!(outcome.history, vec![RunState::Idle, RunState::Failed]);
    assert_eq!(paper.call_count(BackendOperation::PlaceOrder), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelling_the_run_stops_its_automations() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    let container = container(&paper);
    let scheduler = container.scheduler();
    let cancel = CancellationToken::new();

    let outcome = container
        .market_one_shot_use_case()
        .execute(&market_buy(plain_risk().with_trailing(dec!(15))), &cancel)
        .await;
    assert_eq!(outcome.status, RunStatus::Done);
    assert_eq!(outcome.subscriptions.len(), 1);
    let id = outcome.subscriptions[0];
    settle().await;
    assert_eq!(scheduler.status(id), Some(SubscriptionStatus::Active));

    cancel.cancel();
    settle().await;

    assert_eq!(scheduler.status(id), Some(SubscriptionStatus::Cancelled));
    assert!(scheduler.active_for(outcome.ticket.unwrap()).is_empty());
    // The position itself stays open.
    assert!(paper.order(outcome.ticket.unwrap()).is_some());
}

#[tokio::test(start_paused = true)]
async fn trailing_after_market_entry_writes_once_for_a_burst() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    let container = container(&paper);

    let outcome = container
        .market_one_shot_use_case()
        .execute(
            &market_buy(plain_risk().with_trailing(dec!(15))),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome.status, RunStatus::Done);
    let ticket = outcome.ticket.unwrap();
    settle().await;

    // The entry quote replayed on subscribe moves nothing.
    assert_eq!(paper.modify_requests().len(), 1);

    paper.push_tick(tick(dec!(1.10050), 1));
    paper.push_tick(tick(dec!(1.10100), 2));
    paper.push_tick(tick(dec!(1.10160), 3));
    settle().await;

    assert_eq!(
        paper.modify_requests(),
        vec![
            ModifyOrderRequest::protection(ticket, dec!(1.09801), Some(dec!(1.10401))),
            ModifyOrderRequest::stop_loss(ticket, dec!(1.10010)),
        ]
    );
    assert_eq!(paper.order(ticket).unwrap().stop_loss, Some(dec!(1.10010)));

    container.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn trailing_waits_for_the_activation_profit() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    let container = container(&paper);

    let outcome = container
        .market_one_shot_use_case()
        .execute(
            &market_buy(plain_risk().with_trailing_activation(dec!(10), dec!(15))),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome.status, RunStatus::Done);
    let ticket = outcome.ticket.unwrap();
    settle().await;

    // Filled at 1.10001: up 4.9 and 8.9 pips, short of the 10 pip activation.
    paper.push_tick(tick(dec!(1.10050), 1));
    settle().await;
    paper.push_tick(tick(dec!(1.10090), 2));
    settle().await;
    assert_eq!(paper.modify_requests().len(), 1);
    assert_eq!(container.scheduler().status(outcome.subscriptions[0]), Some(SubscriptionStatus::Active));

    paper.push_tick(tick(dec!(1.10120), 3));
    settle().await;
    assert_eq!(
        paper.modify_requests(),
        vec![
            ModifyOrderRequest::protection(ticket, dec!(1.09801), Some(dec!(1.10401))),
            ModifyOrderRequest::stop_loss(ticket, dec!(1.09970)),
        ]
    );

    // Once active it trails on every improvement, activation or not.
    paper.push_tick(tick(dec!(1.10140), 4));
    settle().await;
    assert_eq!(paper.order(ticket).unwrap().stop_loss, Some(dec!(1.09990)));

    container.shutdown().await;
}

// =============================================================================
// Pending bracket
// =============================================================================

#[tokio::test(start_paused = true)]
async fn bracket_fill_is_protected_once() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    let container = container(&paper);
    let use_case = container.pending_bracket_use_case();
    let context = buy_stop(dec!(1.10100), plain_risk().with_trailing(dec!(15)));
    let cancel = CancellationToken::new();

    let run = use_case.execute_with_timeout(&context, Duration::from_secs(60), &cancel);
    let market = async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        paper.push_tick(tick(dec!(1.10100), 1));
    };
    let (outcome, ()) = tokio::join!(run, market);

    assert_eq!(outcome.status, RunStatus::Protected);
    assert_eq!(
        outcome.history,
        vec![RunState::Idle, RunState::Placed, RunState::Filled, RunState::Protected]
    );
    assert_eq!(outcome.subscriptions.len(), 1);
    let ticket = outcome.ticket.unwrap();

    // Filled at the ask of the trigger tick.
    assert_eq!(
        paper.modify_requests()[0],
        ModifyOrderRequest::protection(ticket, dec!(1.09901), Some(dec!(1.10501)))
    );
    assert!(paper.close_requests().is_empty());
    assert!(paper.delete_requests().is_empty());

    container.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unfilled_bracket_is_deleted_exactly_once() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    let container = container(&paper);

    let outcome = container
        .pending_bracket_use_case()
        .execute_with_timeout(
            &buy_stop(dec!(1.10100), plain_risk()),
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.status, RunStatus::TimedOut);
    assert!(outcome.error.is_none());
    assert_eq!(
        outcome.history,
        vec![RunState::Idle, RunState::Placed, RunState::TimedOut, RunState::Cancelled]
    );
    let ticket = outcome.ticket.unwrap();
    assert_eq!(paper.delete_requests(), vec![ticket]);
    assert!(paper.close_requests().is_empty());
    assert!(paper.order(ticket).is_none());
    assert!(paper.modify_requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn fill_racing_the_delete_takes_the_fill_path() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    // The delete is still in flight when the trigger tick fills the order,
    // so the book refuses it on its own.
    paper.set_latency(BackendOperation::DeleteOrder, Duration::from_millis(50));
    let container = container(&paper);
    let use_case = container.pending_bracket_use_case();
    let context = buy_stop(dec!(1.10100), plain_risk());
    let cancel = CancellationToken::new();

    let run = use_case.execute_with_timeout(&context, Duration::from_secs(1), &cancel);
    let market = async {
        tokio::time::sleep(Duration::from_millis(1_020)).await;
        paper.push_tick(tick(dec!(1.10100), 1));
    };
    let (outcome, ()) = tokio::join!(run, market);

    assert_eq!(outcome.status, RunStatus::Protected);
    assert!(!outcome.visited(RunState::TimedOut));
    assert!(outcome.error.is_none());
    let ticket = outcome.ticket.unwrap();
    assert_eq!(paper.delete_requests(), vec![ticket]);
    assert!(paper.close_requests().is_empty());
    assert_eq!(paper.modify_requests().len(), 1);

    // The position survived the timeout and carries its protection.
    let position = paper.order(ticket).unwrap();
    assert!(!position.is_pending());
    assert_eq!(position.stop_loss, Some(dec!(1.09901)));
    assert_eq!(paper.account().balance, dec!(10000));
}

#[tokio::test(start_paused = true)]
async fn failed_pre_delete_check_never_closes_a_fill() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    paper.set_latency(BackendOperation::DeleteOrder, Duration::from_millis(50));
    let container = container(&paper);
    let use_case = container.pending_bracket_use_case();
    let context = buy_stop(dec!(1.10100), plain_risk());
    let cancel = CancellationToken::new();

    let run = use_case.execute_with_timeout(&context, Duration::from_secs(1), &cancel);
    let market = async {
        // Every read at the deadline fails, then the order fills while
        // the delete is in flight.
        tokio::time::sleep(Duration::from_millis(990)).await;
        paper.fail_times(BackendOperation::GetOrder, 4, BackendError::network("reset"));
        tokio::time::sleep(Duration::from_millis(30)).await;
        paper.push_tick(tick(dec!(1.10100), 1));
    };
    let (outcome, ()) = tokio::join!(run, market);

    assert_eq!(outcome.status, RunStatus::Protected);
    let ticket = outcome.ticket.unwrap();
    assert!(paper.close_requests().is_empty());
    let position = paper.order(ticket).unwrap();
    assert!(!position.is_pending());
    assert_eq!(paper.account().balance, dec!(10000));
}

#[tokio::test(start_paused = true)]
async fn refused_delete_of_a_pending_order_fails_the_run() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    paper.fail_next(
        BackendOperation::DeleteOrder,
        BackendError::rejected(145, "too close to market"),
    );
    let container = container(&paper);

    let outcome = container
        .pending_bracket_use_case()
        .execute_with_timeout(
            &buy_stop(dec!(1.10100), plain_risk()),
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(matches!(
        outcome.error,
        Some(ExecutionError::TradeRejected { code: 145, .. })
    ));
    assert_eq!(
        outcome.history,
        vec![RunState::Idle, RunState::Placed, RunState::Failed]
    );
    assert!(paper.modify_requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancelled_bracket_deletes_its_order() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    let container = container(&paper);
    let use_case = container.pending_bracket_use_case();
    let context = buy_stop(dec!(1.10100), plain_risk());
    let cancel = CancellationToken::new();

    let run = use_case.execute_with_timeout(&context, Duration::from_secs(60), &cancel);
    let caller = async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        cancel.cancel();
    };
    let (outcome, ()) = tokio::join!(run, caller);

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert!(matches!(outcome.error, Some(ExecutionError::Cancelled { .. })));
    assert_eq!(
        outcome.history,
        vec![RunState::Idle, RunState::Placed, RunState::Cancelled]
    );
    let ticket = outcome.ticket.unwrap();
    assert_eq!(paper.delete_requests(), vec![ticket]);
    assert!(paper.close_requests().is_empty());
    assert!(paper.order(ticket).is_none());
}

// =============================================================================
// OCO straddle
// =============================================================================

fn placed_volumes(paper: &PaperBackend) -> Vec<Decimal> {
    paper
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            BackendCall::PlaceOrder(request) => Some(request.volume),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn straddle_fill_deletes_the_other_leg_once() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    let container = container(&paper);
    let use_case = container.oco_straddle_use_case();
    let context = market_buy(plain_risk().with_trailing(dec!(15)));
    let cancel = CancellationToken::new();

    let run = use_case.execute_with_timeout(
        &context,
        StraddleRequest::new(dec!(10)),
        Duration::from_secs(60),
        &cancel,
    );
    let market = async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        paper.push_tick(tick(dec!(1.10100), 1));
    };
    let (outcome, ()) = tokio::join!(run, market);

    assert_eq!(outcome.run.status, RunStatus::Protected);
    assert!(outcome.run.error.is_none());
    assert_eq!(
        outcome.run.history,
        vec![RunState::Idle, RunState::Placed, RunState::Filled, RunState::Protected]
    );
    let legs = outcome.legs.unwrap();
    assert_eq!(outcome.run.ticket, Some(legs.buy));
    assert_eq!(outcome.filled, vec![legs.buy]);
    assert_eq!(outcome.run.subscriptions.len(), 1);

    assert_eq!(paper.delete_requests(), vec![legs.sell]);
    assert!(paper.order(legs.sell).is_none());
    assert!(paper.close_requests().is_empty());
    assert_eq!(
        paper.modify_requests(),
        vec![ModifyOrderRequest::protection(legs.buy, dec!(1.09901), Some(dec!(1.10501)))]
    );

    container.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unfilled_straddle_deletes_both_legs() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    let container = container(&paper);

    let outcome = container
        .oco_straddle_use_case()
        .execute_with_timeout(
            &market_buy(plain_risk()),
            StraddleRequest::new(dec!(10)).with_leg_risk(LegRisk::Half),
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.run.status, RunStatus::TimedOut);
    assert_eq!(
        outcome.run.history,
        vec![RunState::Idle, RunState::Placed, RunState::TimedOut, RunState::Cancelled]
    );
    assert_eq!(outcome.run.ticket, None);
    assert!(outcome.filled.is_empty());
    let legs = outcome.legs.unwrap();
    assert_eq!(paper.delete_requests(), vec![legs.buy, legs.sell]);
    assert!(paper.orders().is_empty());
    assert!(paper.modify_requests().is_empty());
    // Half of the fixed 0.10 lots on each leg.
    assert_eq!(placed_volumes(&paper), vec![dec!(0.05), dec!(0.05)]);
}

#[tokio::test(start_paused = true)]
async fn both_straddle_legs_filling_are_each_protected() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    // The opposite leg fills while its delete is in flight.
    paper.set_latency(BackendOperation::DeleteOrder, Duration::from_millis(50));
    let container = container(&paper);
    let use_case = container.oco_straddle_use_case();
    let context = market_buy(RiskPreset::new(dec!(1), dec!(30), dec!(40)));
    let cancel = CancellationToken::new();

    let run = use_case.execute_with_timeout(
        &context,
        StraddleRequest::new(dec!(10)),
        Duration::from_secs(60),
        &cancel,
    );
    let market = async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        paper.push_tick(tick(dec!(1.10100), 1));
        tokio::time::sleep(Duration::from_millis(70)).await;
        paper.push_tick(tick(dec!(1.09890), 2));
    };
    let (outcome, ()) = tokio::join!(run, market);

    assert_eq!(outcome.run.status, RunStatus::Protected);
    assert!(outcome.run.error.is_none());
    let legs = outcome.legs.unwrap();
    assert_eq!(outcome.filled, vec![legs.buy, legs.sell]);
    assert_eq!(paper.delete_requests(), vec![legs.sell]);
    assert!(paper.close_requests().is_empty());
    assert_eq!(
        paper.modify_requests(),
        vec![
            ModifyOrderRequest::protection(legs.buy, dec!(1.09801), Some(dec!(1.10501))),
            ModifyOrderRequest::protection(legs.sell, dec!(1.10189), Some(dec!(1.09489))),
        ]
    );
    assert_eq!(paper.order(legs.sell).unwrap().stop_loss, Some(dec!(1.10189)));

    container.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn cancelled_straddle_discards_both_legs() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    let container = container(&paper);
    let use_case = container.oco_straddle_use_case();
    let context = market_buy(plain_risk());
    let cancel = CancellationToken::new();

    let run = use_case.execute_with_timeout(
        &context,
        StraddleRequest::new(dec!(10)),
        Duration::from_secs(60),
        &cancel,
    );
    let caller = async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        cancel.cancel();
    };
    let (outcome, ()) = tokio::join!(run, caller);

    assert_eq!(outcome.run.status, RunStatus::Cancelled);
    assert!(matches!(outcome.run.error, Some(ExecutionError::Cancelled { .. })));
    let legs = outcome.legs.unwrap();
    assert_eq!(paper.delete_requests(), vec![legs.buy, legs.sell]);
    assert!(paper.orders().is_empty());
}
