use rust_decimal::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};

use super::broker::{Brokerage, EquitySide, OptionSide};
use crate::models::{AssetClass, Side, TradeRecord, OPTION_PREFIX};

/// How the controller treats an accepted order that carries no fill price
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// Only a broker-confirmed fill moves a trade to its next state
    #[default]
    RequireConfirmed,
    /// Use the evaluator's signal price when the broker accepted the
    /// order but reported no fill
    FallbackToSignal,
}

impl FillPolicy {
    /// Price a lifecycle transition may be recorded at, if any
    pub fn settle(&self, execution: &ExecutionResult, signal_price: Option<Decimal>) -> Option<Decimal> {
        match (self, execution.fill_price) {
            (_, Some(fill)) => Some(fill),
            (FillPolicy::FallbackToSignal, None) if execution.accepted => signal_price,
            _ => None,
        }
    }
}

/// Outcome of one market-order submission
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// Authoritative fill price; `None` means no confirmed fill
    pub fill_price: Option<Decimal>,
    /// Broker accepted the request (HTTP success and no error payload)
    pub accepted: bool,
    /// Raw response or error description, kept for diagnostics
    pub raw: Value,
}

impl ExecutionResult {
    fn failed(error: impl ToString) -> Self {
        Self {
            fill_price: None,
            accepted: false,
            raw: json!({ "error": error.to_string() }),
        }
    }

    fn from_response(raw: Value) -> Self {
        Self {
            fill_price: resolve_fill_price(&raw),
            accepted: true,
            raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Open,
    Close,
}

/// Order the brokerage should receive for a trade
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderTicket {
    Equity { symbol: String, quantity: u32, side: EquitySide },
    Option { contract: String, quantity: u32, side: OptionSide },
}

/// Submits opening/closing market orders and resolves their fill price
pub struct OrderReconciler<B> {
    broker: B,
}

impl<B: Brokerage> OrderReconciler<B> {
    pub fn new(broker: B) -> Self {
        Self { broker }
    }

    pub async fn submit_open(&self, record: &TradeRecord) -> ExecutionResult {
        self.submit(record, Direction::Open).await
    }

    pub async fn submit_close(&self, record: &TradeRecord) -> ExecutionResult {
        self.submit(record, Direction::Close).await
    }

    async fn submit(&self, record: &TradeRecord, direction: Direction) -> ExecutionResult {
        let Some(ticket) = ticket_for(record, direction) else {
            tracing::error!(trade_id = record.id, "Option trade has no contract to submit");
            return ExecutionResult::failed("missing option contract");
        };

        tracing::info!(trade_id = record.id, ticket = ?ticket, "Submitting market order");

        let response = match &ticket {
            OrderTicket::Equity { symbol, quantity, side } => {
                self.broker.place_equity_order(symbol, *quantity, *side).await
            }
            OrderTicket::Option { contract, quantity, side } => {
                self.broker.place_option_order(contract, *quantity, *side).await
            }
        };

        let result = match response {
            Ok(raw) => ExecutionResult::from_response(raw),
            Err(e) => {
                tracing::warn!(trade_id = record.id, error = %e, "Order submission failed");
                return ExecutionResult::failed(e);
            }
        };

        match result.fill_price {
            Some(price) => {
                tracing::info!(trade_id = record.id, fill_price = %price, "Order filled");
            }
            None => {
                // Accepted but unpriced: the order may be live at the broker
                tracing::error!(
                    trade_id = record.id,
                    response = %result.raw,
                    "Order accepted without a confirmable fill price"
                );
            }
        }

        result
    }
}

/// Map (asset class, side, direction) onto a broker order
fn ticket_for(record: &TradeRecord, direction: Direction) -> Option<OrderTicket> {
    let quantity = record.quantity;
    match record.asset_class {
        AssetClass::Equity => {
            let side = match (record.side, direction) {
                (Side::Long, Direction::Open) => EquitySide::Buy,
                (Side::Long, Direction::Close) => EquitySide::Sell,
                (Side::Short, Direction::Open) => EquitySide::SellShort,
                (Side::Short, Direction::Close) => EquitySide::BuyToCover,
            };
            Some(OrderTicket::Equity {
                symbol: record.symbol.clone(),
                quantity,
                side,
            })
        }
        AssetClass::Option => {
            let side = match (record.side, direction) {
                (Side::Long, Direction::Open) => OptionSide::BuyToOpen,
                (Side::Long, Direction::Close) => OptionSide::SellToClose,
                (Side::Short, Direction::Open) => OptionSide::SellToOpen,
                (Side::Short, Direction::Close) => OptionSide::BuyToClose,
            };
            let contract = record.contract.as_deref()?;
            Some(OrderTicket::Option {
                contract: broker_symbol(contract).to_string(),
                quantity,
                side,
            })
        }
    }
}

/// OCC symbol as the broker expects it, without vendor prefixes
pub fn broker_symbol(contract: &str) -> &str {
    contract.strip_prefix(OPTION_PREFIX).unwrap_or(contract)
}

/// Extract the fill price from an order response.
///
/// Prefers the first entry of `order.fills`, then `order.average_fill_price`.
/// Non-positive prices are treated as "not filled yet".
pub fn resolve_fill_price(response: &Value) -> Option<Decimal> {
    let order = response.get("order")?;

    let first_fill = match order.get("fills") {
        Some(Value::Array(fills)) => fills.first(),
        // Single fills are sometimes collapsed into an object
        Some(fill @ Value::Object(_)) => Some(fill),
        _ => None,
    };

    first_fill
        .and_then(|fill| fill.get("price"))
        .and_then(decimal_from_json)
        .or_else(|| order.get("average_fill_price").and_then(decimal_from_json))
        .or_else(|| order.get("avg_fill_price").and_then(decimal_from_json))
}

fn decimal_from_json(value: &Value) -> Option<Decimal> {
    let price = match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()?
        }
        Value::String(s) => Decimal::from_str(s.trim()).ok()?,
        _ => return None,
    };
    (price > Decimal::ZERO).then_some(price)
}
