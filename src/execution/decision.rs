use rust_decimal::Decimal;

use super::reconciler::FillPolicy;
use crate::models::{AssetClass, CloseReason, ManageFlag, MarketSnapshot, TradeRecord, TradeStatus};
use crate::strategy::{evaluate_entry, evaluate_stop_loss, evaluate_take_profit};

#[derive(Debug, Clone, PartialEq)]
pub enum TradeAction {
    /// Management flag says leave the record alone
    Skip,
    /// Pending trade force-closed before any position existed
    Discard,
    /// Nothing triggered this iteration
    Hold,
    Open { signal_price: Decimal },
    Close { reason: CloseReason, signal_price: Option<Decimal> },
}

#[derive(Debug, Clone)]
pub struct TradeDecision {
    pub action: TradeAction,
    pub reason: String,
}

impl TradeDecision {
    fn new(action: TradeAction, reason: impl Into<String>) -> Self {
        Self {
            action,
            reason: reason.into(),
        }
    }
}

/// Whether `decide` needs market data for this record at all.
///
/// A forced close only reads a price when the fill policy may fall back to
/// it, so a snapshot outage never blocks it otherwise.
pub fn needs_snapshots(record: &TradeRecord, fill_policy: FillPolicy) -> bool {
    match record.manage {
        ManageFlag::None => false,
        ManageFlag::ForceClose => {
            record.status == TradeStatus::Managing && fill_policy == FillPolicy::FallbackToSignal
        }
        ManageFlag::Manage => true,
    }
}

/// Decide what one trade should do this iteration.
///
/// Pure: reads the record and snapshots, performs no I/O.
pub fn decide(
    record: &TradeRecord,
    underlying: Option<&MarketSnapshot>,
    option: Option<&MarketSnapshot>,
) -> TradeDecision {
    match (record.manage, record.status) {
        (ManageFlag::None, _) => TradeDecision::new(TradeAction::Skip, "Not flagged for management"),

        (ManageFlag::ForceClose, TradeStatus::PendingEntry) => {
            TradeDecision::new(TradeAction::Discard, "Force-close before entry, nothing to unwind")
        }

        (ManageFlag::ForceClose, TradeStatus::Managing) => {
            let traded = match record.asset_class {
                AssetClass::Equity => underlying,
                AssetClass::Option => option,
            };
            TradeDecision::new(
                TradeAction::Close {
                    reason: CloseReason::Forced,
                    signal_price: traded.and_then(|s| s.last_price),
                },
                "Force-close requested",
            )
        }

        (ManageFlag::Manage, TradeStatus::PendingEntry) => {
            let entry = evaluate_entry(record, underlying, option);
            match entry.price {
                Some(price) if entry.triggered => TradeDecision::new(
                    TradeAction::Open { signal_price: price },
                    format!("Entry triggered at {}", price),
                ),
                _ => TradeDecision::new(TradeAction::Hold, "Entry not triggered"),
            }
        }

        (ManageFlag::Manage, TradeStatus::Managing) => {
            // Stop-loss first; take-profit is only looked at when the stop is clear
            let stop = evaluate_stop_loss(record, underlying, option);
            if stop.triggered {
                return TradeDecision::new(
                    TradeAction::Close {
                        reason: CloseReason::StopLoss,
                        signal_price: stop.price,
                    },
                    format!("Stop-loss hit at {}", display_price(stop.price)),
                );
            }

            let target = evaluate_take_profit(record, underlying, option);
            if target.triggered {
                return TradeDecision::new(
                    TradeAction::Close {
                        reason: CloseReason::TakeProfit,
                        signal_price: target.price,
                    },
                    format!("Take-profit hit at {}", display_price(target.price)),
                );
            }

            TradeDecision::new(TradeAction::Hold, "Stop-loss and take-profit clear")
        }
    }
}

fn display_price(price: Option<Decimal>) -> String {
    price.map_or_else(|| "?".to_string(), |p| p.to_string())
}
