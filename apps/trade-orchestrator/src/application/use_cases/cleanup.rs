//! Panic Close Use Case
//!
//! Emergency exit for one symbol: stops automations on the affected
//! tickets, closes matching positions, deletes every pending order for the
//! symbol, and reports the account afterwards. One failed close does not
//! abort the sweep.

use rust_decimal::Decimal;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::run::RunServices;
use crate::application::ports::TradingBackend;
use crate::domain::market::{AccountSummary, OrderSnapshot};
use crate::domain::shared::{Symbol, Ticket};
use crate::error::ExecutionError;

/// Which open positions to close. Pending orders are always deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfitFilter {
    /// Every position.
    #[default]
    All,
    /// Positions in profit.
    Winners,
    /// Positions at a loss.
    Losers,
}

impl ProfitFilter {
    fn admits(self, profit: Decimal) -> bool {
        match self {
            Self::All => true,
            Self::Winners => profit > Decimal::ZERO,
            Self::Losers => profit < Decimal::ZERO,
        }
    }
}

/// Panic close request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanicCloseRequest {
    /// Symbol to flatten.
    pub symbol: Symbol,
    /// Restrict to one strategy's orders.
    pub magic: Option<u64>,
    /// Position filter.
    pub profit: ProfitFilter,
}

impl PanicCloseRequest {
    /// Close everything on `symbol`.
    pub fn symbol(symbol: impl Into<Symbol>) -> Self {
        Self {
            symbol: symbol.into(),
            magic: None,
            profit: ProfitFilter::All,
        }
    }

    /// Only orders tagged `magic`.
    #[must_use]
    pub const fn with_magic(mut self, magic: u64) -> Self {
        self.magic = Some(magic);
        self
    }

    /// Only positions passing `profit`.
    #[must_use]
    pub const fn with_profit_filter(mut self, profit: ProfitFilter) -> Self {
        self.profit = profit;
        self
    }

    fn selects(&self, order: &OrderSnapshot) -> bool {
        order.symbol == self.symbol
            && self.magic.is_none_or(|magic| order.magic == magic)
            && (order.is_pending() || self.profit.admits(order.profit))
    }
}

/// What a panic close did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    /// Positions closed.
    pub closed: Vec<Ticket>,
    /// Pending orders deleted.
    pub deleted: Vec<Ticket>,
    /// Tickets that could not be closed or deleted.
    #[serde(serialize_with = "serialize_failures")]
    pub failures: Vec<(Ticket, ExecutionError)>,
    /// Automations stopped.
    pub automations_stopped: usize,
    /// Account state after the sweep, if it could be read.
    pub account: Option<AccountSummary>,
}

impl CleanupReport {
    /// Whether every selected ticket was handled.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

fn serialize_failures<S>(failures: &[(Ticket, ExecutionError)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeSeq;
    let mut seq = serializer.serialize_seq(Some(failures.len()))?;
    for (ticket, error) in failures {
        seq.serialize_element(&serde_json::json!({
            "ticket": ticket,
            "reason": error.reason(),
            "message": error.to_string(),
        }))?;
    }
    seq.end()
}

/// Use case for flattening a symbol.
pub struct PanicCloseUseCase<B: ?Sized> {
    services: RunServices<B>,
}

impl<B: TradingBackend + ?Sized + 'static> PanicCloseUseCase<B> {
    /// Create a new PanicCloseUseCase.
    pub const fn new(services: RunServices<B>) -> Self {
        Self { services }
    }

    /// Execute the use case.
    ///
    /// Fails only if the open orders cannot be listed.
    pub async fn execute(
        &self,
        request: &PanicCloseRequest,
        cancel: &CancellationToken,
    ) -> Result<CleanupReport, ExecutionError> {
        let guard = &self.services.guard;
        let deadline = || self.services.step_deadline();

        // 1. Select
        let orders = guard.get_open_orders(deadline(), cancel).await?;
        let selected: Vec<&OrderSnapshot> = orders.iter().filter(|o| request.selects(o)).collect();
        tracing::warn!(symbol = %request.symbol, count = selected.len(), "Panic close");

        let mut report = CleanupReport::default();

        // 2. Close positions first, then delete pending orders
        let (pending, positions): (Vec<&OrderSnapshot>, Vec<&OrderSnapshot>) =
            selected.into_iter().partition(|o| o.is_pending());

        for order in positions.into_iter().chain(pending) {
            report.automations_stopped += self.services.scheduler.stop_ticket(order.ticket);
            let result = if order.is_pending() {
                guard.delete_order(order.ticket, deadline(), cancel).await
            } else {
                guard.close_order(order.ticket, None, deadline(), cancel).await
            };
            match result {
                Ok(()) if order.is_pending() => report.deleted.push(order.ticket),
                Ok(()) => report.closed.push(order.ticket),
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) => {
                    tracing::error!(ticket = %order.ticket, error = %error, "Panic close failed for ticket");
                    report.failures.push((order.ticket, error));
                }
            }
        }

        // 3. Snapshot
        report.account = match guard.get_account_summary(deadline(), cancel).await {
            Ok(account) => Some(account),
            Err(error) => {
                tracing::warn!(error = %error, "Account snapshot after panic close failed");
                None
            }
        };
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::market::OrderType;
    use crate::domain::shared::Side;

    fn order(ticket: u64, symbol: &str, order_type: OrderType, profit: Decimal, magic: u64) -> OrderSnapshot {
        OrderSnapshot {
            ticket: Ticket::new(ticket),
            symbol: Symbol::new(symbol),
            side: Side::Buy,
            order_type,
            volume: dec!(0.1),
            open_price: dec!(1.1),
            stop_loss: None,
            take_profit: None,
            open_time: Utc::now(),
            magic,
            comment: None,
            profit,
        }
    }

    #[test]
    fn selection_respects_symbol_magic_and_profit() {
        let request = PanicCloseRequest::symbol("EURUSD")
            .with_magic(7)
            .with_profit_filter(ProfitFilter::Winners);

        assert!(request.selects(&order(1, "EURUSD", OrderType::Market, dec!(5), 7)));
        assert!(!request.selects(&order(2, "EURUSD", OrderType::Market, dec!(-5), 7)));
        assert!(!request.selects(&order(3, "GBPUSD", OrderType::Market, dec!(5), 7)));
        assert!(!request.selects(&order(4, "EURUSD", OrderType::Market, dec!(5), 8)));
        // Pending orders ignore the profit filter.
        assert!(request.selects(&order(5, "EURUSD", OrderType::Limit, dec!(0), 7)));
    }

    #[test]
    fn losers_filter() {
        assert!(ProfitFilter::Losers.admits(dec!(-0.01)));
        assert!(!ProfitFilter::Losers.admits(dec!(0)));
        assert!(ProfitFilter::All.admits(dec!(0)));
    }
}
