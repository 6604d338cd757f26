//! Position sizing from account risk.

use rust_decimal::Decimal;

use crate::domain::market::InstrumentSpec;

/// Volume that loses `risk_percent` of `balance` if a stop `sl_pips` away is hit.
///
/// The raw size is normalized onto the instrument's volume grid, so the
/// result is always tradeable (and never below `volume_min`). Returns
/// `None` when the inputs cannot produce a size.
#[must_use]
pub fn volume_for_risk(
    balance: Decimal,
    risk_percent: Decimal,
    sl_pips: Decimal,
    instrument: &InstrumentSpec,
) -> Option<Decimal> {
    if balance <= Decimal::ZERO || risk_percent <= Decimal::ZERO || sl_pips <= Decimal::ZERO {
        return None;
    }
    let per_pip = instrument.money_per_pip_per_lot();
    if per_pip <= Decimal::ZERO {
        return None;
    }
    let risk_money = balance * risk_percent / Decimal::ONE_HUNDRED;
    let raw = risk_money / (per_pip * sl_pips);
    Some(instrument.normalize_volume(raw))
}

/// Percentage of `balance` lost if a `volume` position is stopped out `sl_pips` away.
#[must_use]
pub fn risk_percent_for_volume(
    balance: Decimal,
    volume: Decimal,
    sl_pips: Decimal,
    instrument: &InstrumentSpec,
) -> Option<Decimal> {
    if balance <= Decimal::ZERO {
        return None;
    }
    let risk_money = volume * sl_pips * instrument.money_per_pip_per_lot();
    Some(risk_money / balance * Decimal::ONE_HUNDRED)
}
