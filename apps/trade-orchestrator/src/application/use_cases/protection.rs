//! Entry sizing and post-entry protection shared by the orchestrators.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio_util::sync::CancellationToken;

use super::run::RunServices;
use crate::application::ports::{ModifyOrderRequest, TradingBackend};
use crate::domain::automation::AutomationRequest;
use crate::domain::presets::TradingContext;
use crate::domain::shared::{SubscriptionId, Ticket};
use crate::domain::sizing::volume_for_risk;
use crate::error::ExecutionError;

/// Initial stop-loss and take-profit around a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectionLevels {
    /// Stop-loss price.
    pub stop_loss: Decimal,
    /// Take-profit price; `None` when the risk preset disables it.
    pub take_profit: Option<Decimal>,
}

impl ProtectionLevels {
    /// Levels `sl_pips` and `tp_pips` away from `fill_price`.
    pub fn around(context: &TradingContext, fill_price: Decimal) -> Self {
        let side = context.strategy.side;
        let instrument = &context.instrument;
        let stop_loss = instrument.normalize_price(
            side.stop_from(fill_price, instrument.pips_to_price(context.risk.sl_pips)),
        );
        let take_profit = (context.risk.tp_pips > Decimal::ZERO).then(|| {
            instrument.normalize_price(
                side.target_from(fill_price, instrument.pips_to_price(context.risk.tp_pips)),
            )
        });
        Self {
            stop_loss,
            take_profit,
        }
    }
}

/// Slippage allowance in points.
pub fn deviation_points(context: &TradingContext) -> u32 {
    let instrument = &context.instrument;
    if instrument.point.is_zero() {
        return 0;
    }
    (instrument.pips_to_price(context.strategy.deviation_pips) / instrument.point)
        .round()
        .to_u32()
        .unwrap_or(0)
}

/// Entry volume: the strategy's, or sized from the account balance.
pub async fn resolve_volume<B: TradingBackend + ?Sized>(
    services: &RunServices<B>,
    context: &TradingContext,
    cancel: &CancellationToken,
) -> Result<Decimal, ExecutionError> {
    if let Some(volume) = context.strategy.volume {
        return Ok(context.instrument.normalize_volume(volume));
    }
    let account = services
        .guard
        .get_account_summary(services.step_deadline(), cancel)
        .await?;
    volume_for_risk(
        account.balance,
        context.risk.risk_percent,
        context.risk.sl_pips,
        &context.instrument,
    )
    .ok_or_else(|| ExecutionError::rejected("size_position", "cannot size position from account balance"))
}

/// Write initial SL/TP on `ticket`, anchored at `fill_price`.
pub async fn apply_protection<B: TradingBackend + ?Sized>(
    services: &RunServices<B>,
    context: &TradingContext,
    ticket: Ticket,
    fill_price: Decimal,
    cancel: &CancellationToken,
) -> Result<ProtectionLevels, ExecutionError> {
    let levels = ProtectionLevels::around(context, fill_price);
    let request = ModifyOrderRequest::protection(ticket, levels.stop_loss, levels.take_profit);
    services
        .guard
        .modify_order(&request, services.step_deadline(), cancel)
        .await?;
    tracing::info!(
        %ticket,
        %fill_price,
        stop_loss = %levels.stop_loss,
        take_profit = ?levels.take_profit,
        "Protection attached"
    );
    Ok(levels)
}

/// Automation requests the risk preset asks for on `ticket`.
///
/// Trailing uses a one-pip step and waits for the activation profit, if any.
pub fn automation_requests(context: &TradingContext, ticket: Ticket) -> Vec<AutomationRequest> {
    let instrument = &context.instrument;
    let digits = instrument.digits;
    let mut requests = Vec::new();
    if let Some(pips) = context.risk.trailing_pips {
        let mut request = AutomationRequest::trailing(
            ticket,
            instrument.pips_to_price(pips),
            Some(instrument.pip_size()),
            digits,
        );
        if let Some(activation) = context.risk.trailing_activation_pips {
            request = request.with_activation(instrument.pips_to_price(activation));
        }
        requests.push(request);
    }
    if let Some(trigger) = context.risk.breakeven_trigger_pips {
        let plus = context.risk.breakeven_plus_pips.unwrap_or(Decimal::ZERO);
        requests.push(AutomationRequest::breakeven(
            ticket,
            instrument.pips_to_price(trigger),
            instrument.pips_to_price(plus),
            digits,
        ));
    }
    requests
}

/// Start the requested automations under the run's token.
pub fn attach_automations<B: TradingBackend + ?Sized + 'static>(
    services: &RunServices<B>,
    context: &TradingContext,
    ticket: Ticket,
    run_cancel: &CancellationToken,
) -> Result<Vec<SubscriptionId>, ExecutionError> {
    automation_requests(context, ticket)
        .into_iter()
        .map(|request| services.scheduler.start_with_parent(request, run_cancel))
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::automation::AutomationParams;
    use crate::domain::market::InstrumentSpec;
    use crate::domain::presets::{RiskPreset, StrategyPreset};
    use crate::domain::shared::Side;

    fn context(side: Side, risk: RiskPreset) -> TradingContext {
        TradingContext::new(
            StrategyPreset::market("EURUSD", side),
            risk,
            InstrumentSpec::fx_major("EURUSD"),
        )
    }

    #[test]
    fn long_levels_around_fill() {
        let ctx = context(Side::Buy, RiskPreset::new(dec!(1.0), dec!(20), dec!(40)));
        let levels = ProtectionLevels::around(&ctx, dec!(1.10000));
        assert_eq!(levels.stop_loss, dec!(1.09800));
        assert_eq!(levels.take_profit, Some(dec!(1.10400)));
    }

    #[test]
    fn short_levels_around_fill() {
        let ctx = context(Side::Sell, RiskPreset::new(dec!(1.0), dec!(20), dec!(40)));
        let levels = ProtectionLevels::around(&ctx, dec!(1.10000));
        assert_eq!(levels.stop_loss, dec!(1.10200));
        assert_eq!(levels.take_profit, Some(dec!(1.09600)));
    }

    #[test]
    fn zero_tp_disables_take_profit() {
        let ctx = context(Side::Buy, RiskPreset::new(dec!(1.0), dec!(20), dec!(0)));
        assert_eq!(ProtectionLevels::around(&ctx, dec!(1.1)).take_profit, None);
    }

    #[test]
    fn two_pip_deviation_is_twenty_points() {
        let ctx = context(Side::Buy, RiskPreset::balanced());
        assert_eq!(deviation_points(&ctx), 20);
    }

    #[test]
    fn requests_follow_risk_preset() {
        let risk = RiskPreset::new(dec!(1.0), dec!(20), dec!(40))
            .with_trailing(dec!(15))
            .with_breakeven(dec!(10), dec!(1));
        let requests = automation_requests(&context(Side::Buy, risk), Ticket::new(3));

        assert_eq!(
            requests[0].params,
            AutomationParams::Trailing {
                distance: dec!(0.00150),
                step: Some(dec!(0.00010)),
                activation: None,
            }
        );
        assert_eq!(
            requests[1].params,
            AutomationParams::Breakeven {
                trigger: dec!(0.00100),
                plus: dec!(0.00010),
            }
        );
        assert!(automation_requests(&context(Side::Buy, RiskPreset::balanced()), Ticket::new(3)).is_empty());
    }

    #[test]
    fn activation_pips_become_price_distance() {
        let risk = RiskPreset::balanced().with_trailing_activation(dec!(10), dec!(15));
        let requests = automation_requests(&context(Side::Sell, risk), Ticket::new(4));
        assert_eq!(
            requests,
            vec![AutomationRequest::trailing(Ticket::new(4), dec!(0.00150), Some(dec!(0.00010)), 5)
                .with_activation(dec!(0.00100))]
        );
    }
}
