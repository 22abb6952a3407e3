use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Primary key of a row in `active_trades`
pub type TradeId = i64;

/// Contract multiplier applied to option P&L
pub const OPTION_MULTIPLIER: i64 = 100;

/// Prefix some data vendors put in front of OCC option symbols
pub const OPTION_PREFIX: &str = "O:";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Option,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Equity => "equity",
            AssetClass::Option => "option",
        }
    }

    /// Units of underlying per contract, used for P&L
    pub fn multiplier(&self) -> i64 {
        match self {
            AssetClass::Equity => 1,
            AssetClass::Option => OPTION_MULTIPLIER,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

/// What the controller is allowed to do with a record this iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManageFlag {
    None,
    Manage,
    ForceClose,
}

/// Lifecycle status of an active trade. Terminal state is row deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    PendingEntry,
    Managing,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Immediate,
    ThresholdTouch,
    TimeframeClose,
}

impl TriggerKind {
    /// Whether the comparison price is a candle close rather than the last tick
    pub fn is_timeframe_based(&self) -> bool {
        matches!(self, TriggerKind::TimeframeClose)
    }
}

/// Which instrument a condition reads its price from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Underlying,
    Option,
}

/// One entry / stop-loss / take-profit rule
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionSpec {
    pub enabled: bool,
    pub trigger: Option<TriggerKind>,
    pub source: PriceSource,
    pub level: Option<Decimal>,
    pub timeframe: Option<String>,
}

impl ConditionSpec {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            trigger: None,
            source: PriceSource::Underlying,
            level: None,
            timeframe: None,
        }
    }
}

/// A pending or open trade directive, validated at the fetch boundary
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub id: TradeId,
    pub symbol: String,
    pub contract: Option<String>,
    pub asset_class: AssetClass,
    pub quantity: u32,
    pub side: Side,
    pub manage: ManageFlag,
    pub status: TradeStatus,
    pub entry: ConditionSpec,
    pub stop_loss: ConditionSpec,
    pub take_profit: ConditionSpec,
}

impl TradeRecord {
    /// Instrument the position is actually held in (underlying for equity, contract for options)
    pub fn traded_instrument(&self) -> Option<&str> {
        match self.asset_class {
            AssetClass::Equity => Some(self.symbol.as_str()),
            AssetClass::Option => self.contract.as_deref(),
        }
    }
}

/// Latest known market state for one instrument. Read-only to the controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub last_price: Option<Decimal>,
    #[serde(default)]
    pub tf_closes: HashMap<String, Decimal>,
}

impl MarketSnapshot {
    pub fn close_for(&self, timeframe: &str) -> Option<Decimal> {
        self.tf_closes.get(timeframe).copied()
    }
}

/// Why a managed position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    Forced,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::StopLoss => "sl",
            CloseReason::TakeProfit => "tp",
            CloseReason::Forced => "force",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============== Decoding ==============

/// A stored row that cannot be turned into a `TradeRecord`
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("unknown {field} value '{value}'")]
    UnknownValue { field: &'static str, value: String },
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i64),
    #[error("option trade has no contract identifier")]
    MissingContract,
    #[error("trade has no underlying symbol")]
    MissingSymbol,
}

fn unknown(field: &'static str, value: &str) -> RecordError {
    RecordError::UnknownValue {
        field,
        value: value.to_string(),
    }
}

impl FromStr for AssetClass {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equity" | "stock" => Ok(AssetClass::Equity),
            "option" => Ok(AssetClass::Option),
            other => Err(unknown("asset_type", other)),
        }
    }
}

impl FromStr for Side {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" | "" => Ok(Side::Long),
            "short" => Ok(Side::Short),
            other => Err(unknown("side", other)),
        }
    }
}

impl FromStr for TradeStatus {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "nt-waiting" => Ok(TradeStatus::PendingEntry),
            "nt-managing" | "pos-managing" => Ok(TradeStatus::Managing),
            other => Err(unknown("status", other)),
        }
    }
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::PendingEntry => "nt-waiting",
            TradeStatus::Managing => "nt-managing",
        }
    }
}

impl ManageFlag {
    /// Anything other than `Y` or `C` means "leave alone"
    pub fn parse(s: Option<&str>) -> Self {
        match s.map(str::trim) {
            Some("Y") | Some("y") => ManageFlag::Manage,
            Some("C") | Some("c") => ManageFlag::ForceClose,
            _ => ManageFlag::None,
        }
    }
}

impl FromStr for TriggerKind {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" | "now" => Ok(TriggerKind::Immediate),
            "threshold_touch" | "at" => Ok(TriggerKind::ThresholdTouch),
            "timeframe_close" => Ok(TriggerKind::TimeframeClose),
            other => Err(unknown("trigger", other)),
        }
    }
}

impl FromStr for PriceSource {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "underlying" | "equity" | "" => Ok(PriceSource::Underlying),
            "option" => Ok(PriceSource::Option),
            other => Err(unknown("price_source", other)),
        }
    }
}
