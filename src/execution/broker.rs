use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Equity order sides understood by the brokerage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquitySide {
    Buy,
    Sell,
    SellShort,
    BuyToCover,
}

impl EquitySide {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquitySide::Buy => "buy",
            EquitySide::Sell => "sell",
            EquitySide::SellShort => "sell_short",
            EquitySide::BuyToCover => "buy_to_cover",
        }
    }
}

/// Option order sides understood by the brokerage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionSide {
    BuyToOpen,
    SellToClose,
    SellToOpen,
    BuyToClose,
}

impl OptionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionSide::BuyToOpen => "buy_to_open",
            OptionSide::SellToClose => "sell_to_close",
            OptionSide::SellToOpen => "sell_to_open",
            OptionSide::BuyToClose => "buy_to_close",
        }
    }
}

impl fmt::Display for EquitySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for OptionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("order rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid broker response: {0}")]
    Decode(String),
}

/// Market-order submission. Calls are not idempotent: a retried
/// submission after a timeout may place a second order.
///
/// Implementations return the broker's raw JSON response on acceptance.
#[async_trait]
pub trait Brokerage: Send + Sync {
    async fn place_equity_order(
        &self,
        symbol: &str,
        quantity: u32,
        side: EquitySide,
    ) -> Result<Value, BrokerError>;

    async fn place_option_order(
        &self,
        contract: &str,
        quantity: u32,
        side: OptionSide,
    ) -> Result<Value, BrokerError>;
}

#[async_trait]
impl<T: Brokerage + ?Sized> Brokerage for Arc<T> {
    async fn place_equity_order(
        &self,
        symbol: &str,
        quantity: u32,
        side: EquitySide,
    ) -> Result<Value, BrokerError> {
        (**self).place_equity_order(symbol, quantity, side).await
    }

    async fn place_option_order(
        &self,
        contract: &str,
        quantity: u32,
        side: OptionSide,
    ) -> Result<Value, BrokerError> {
        (**self).place_option_order(contract, quantity, side).await
    }
}
