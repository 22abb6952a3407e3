use rust_decimal::Decimal;

use crate::models::{ConditionSpec, MarketSnapshot, PriceSource, Side, TradeRecord, TriggerKind};

/// Outcome of a single condition check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub triggered: bool,
    /// Price that satisfied the condition, only set when triggered
    pub price: Option<Decimal>,
}

impl Evaluation {
    pub const NOT_TRIGGERED: Evaluation = Evaluation {
        triggered: false,
        price: None,
    };

    fn hit(price: Decimal) -> Self {
        Self {
            triggered: true,
            price: Some(price),
        }
    }

    fn when(condition: bool, price: Decimal) -> Self {
        if condition {
            Self::hit(price)
        } else {
            Self::NOT_TRIGGERED
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Comparison {
    AtOrBelow,
    AtOrAbove,
}

impl Comparison {
    fn holds(self, price: Decimal, level: Decimal) -> bool {
        match self {
            Comparison::AtOrBelow => price <= level,
            Comparison::AtOrAbove => price >= level,
        }
    }
}

/// Pick the snapshot a condition reads from and resolve its comparison price.
///
/// Tick-based kinds use the last traded price, `TimeframeClose` uses the
/// close of the condition's own timeframe. Missing data yields `None`.
fn resolve_price(
    condition: &ConditionSpec,
    trigger: TriggerKind,
    underlying: Option<&MarketSnapshot>,
    option: Option<&MarketSnapshot>,
) -> Option<Decimal> {
    let snapshot = match condition.source {
        PriceSource::Underlying => underlying?,
        PriceSource::Option => option?,
    };

    if trigger.is_timeframe_based() {
        snapshot.close_for(condition.timeframe.as_deref()?)
    } else {
        snapshot.last_price
    }
}

/// Should a pending trade open now?
///
/// `Immediate` fires on any available price. Threshold and timeframe kinds
/// fire when a long's price is at or below the level, or a short's price is
/// at or above it.
pub fn evaluate_entry(
    record: &TradeRecord,
    underlying: Option<&MarketSnapshot>,
    option: Option<&MarketSnapshot>,
) -> Evaluation {
    let condition = &record.entry;
    if !condition.enabled {
        return Evaluation::NOT_TRIGGERED;
    }
    let Some(trigger) = condition.trigger else {
        return Evaluation::NOT_TRIGGERED;
    };
    let Some(price) = resolve_price(condition, trigger, underlying, option) else {
        return Evaluation::NOT_TRIGGERED;
    };

    if trigger == TriggerKind::Immediate {
        return Evaluation::hit(price);
    }

    let Some(level) = condition.level else {
        return Evaluation::NOT_TRIGGERED;
    };

    let comparison = match record.side {
        Side::Long => Comparison::AtOrBelow,
        Side::Short => Comparison::AtOrAbove,
    };
    Evaluation::when(comparison.holds(price, level), price)
}

/// Has the stop been hit? Long: price <= level. Short: price >= level.
pub fn evaluate_stop_loss(
    record: &TradeRecord,
    underlying: Option<&MarketSnapshot>,
    option: Option<&MarketSnapshot>,
) -> Evaluation {
    let comparison = match record.side {
        Side::Long => Comparison::AtOrBelow,
        Side::Short => Comparison::AtOrAbove,
    };
    evaluate_exit(&record.stop_loss, comparison, underlying, option)
}

/// Has the target been reached? Long: price >= level. Short: price <= level.
pub fn evaluate_take_profit(
    record: &TradeRecord,
    underlying: Option<&MarketSnapshot>,
    option: Option<&MarketSnapshot>,
) -> Evaluation {
    let comparison = match record.side {
        Side::Long => Comparison::AtOrAbove,
        Side::Short => Comparison::AtOrBelow,
    };
    evaluate_exit(&record.take_profit, comparison, underlying, option)
}

// Exits always need a level; `Immediate` on an exit compares the last tick like a touch.
fn evaluate_exit(
    condition: &ConditionSpec,
    comparison: Comparison,
    underlying: Option<&MarketSnapshot>,
    option: Option<&MarketSnapshot>,
) -> Evaluation {
    if !condition.enabled {
        return Evaluation::NOT_TRIGGERED;
    }
    let (Some(trigger), Some(level)) = (condition.trigger, condition.level) else {
        return Evaluation::NOT_TRIGGERED;
    };
    match resolve_price(condition, trigger, underlying, option) {
        Some(price) => Evaluation::when(comparison.holds(price, level), price),
        None => Evaluation::NOT_TRIGGERED,
    }
}
