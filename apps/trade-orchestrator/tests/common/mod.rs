//! Shared fixtures for the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::broadcast;

use trade_orchestrator::application::ports::Clock;
use trade_orchestrator::{
    Config, Container, EngineEvent, InstrumentSpec, OrderSnapshot, OrderType, PaperBackend, Quote,
    RiskPreset, Side, StrategyPreset, Symbol, SystemClock, Ticket, TradingContext,
};

pub const EURUSD: &str = "EURUSD";

/// Wall time of the tick with sequence number `seq`.
pub fn at(seq: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 13, 9, 0, 0).unwrap() + chrono::Duration::seconds(i64::from(seq))
}

/// EURUSD tick with the given mid and a 0.2 pip spread.
pub fn tick(mid: Decimal, seq: u32) -> Quote {
    Quote::new(
        Symbol::new(EURUSD),
        mid - dec!(0.00001),
        mid + dec!(0.00001),
        at(seq),
    )
}

/// Test configuration: no jitter, fast polling.
pub fn config() -> Config {
    let mut config = Config::default();
    config.retry.jitter_factor = 0.0;
    config.retry.max_retries = 3;
    config.orchestrator.fill_poll_interval_ms = 100;
    config
}

pub fn paper() -> Arc<PaperBackend> {
    Arc::new(PaperBackend::new(dec!(10000)))
}

pub fn container(paper: &Arc<PaperBackend>) -> Container<PaperBackend> {
    container_with_clock(paper, Arc::new(SystemClock))
}

pub fn container_with_clock(
    paper: &Arc<PaperBackend>,
    clock: Arc<dyn Clock>,
) -> Container<PaperBackend> {
    Container::new(Arc::clone(paper), config(), clock)
}

/// Open long EURUSD position.
pub fn long_position(ticket: u64, open_price: Decimal, stop_loss: Option<Decimal>) -> OrderSnapshot {
    OrderSnapshot {
        ticket: Ticket::new(ticket),
        symbol: Symbol::new(EURUSD),
        side: Side::Buy,
        order_type: OrderType::Market,
        volume: dec!(0.10),
        open_price,
        stop_loss,
        take_profit: None,
        open_time: at(0),
        magic: 0,
        comment: None,
        profit: Decimal::ZERO,
    }
}

/// Fixed-volume market buy with 20/40 pip protection.
pub fn market_buy(risk: RiskPreset) -> TradingContext {
    TradingContext::new(
        StrategyPreset::market(EURUSD, Side::Buy).with_volume(dec!(0.10)),
        risk,
        InstrumentSpec::fx_major(EURUSD),
    )
}

/// Fixed-volume pending buy stop at `price`.
pub fn buy_stop(price: Decimal, risk: RiskPreset) -> TradingContext {
    TradingContext::new(
        StrategyPreset::pending(EURUSD, Side::Buy, OrderType::Stop, price).with_volume(dec!(0.10)),
        risk,
        InstrumentSpec::fx_major(EURUSD),
    )
}

pub fn plain_risk() -> RiskPreset {
    RiskPreset::new(dec!(1), dec!(20), dec!(40))
}

/// Let spawned tasks run until they are all idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Every event buffered on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Finish reasons of every `AutomationFinished` event in `events`.
pub fn finish_reasons(events: &[EngineEvent]) -> Vec<&'static str> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::AutomationFinished { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect()
}
