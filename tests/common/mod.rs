#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use trade_manager::db::{StoreError, TradeStore};
use trade_manager::execution::{BrokerError, Brokerage, EquitySide, OptionSide};
use trade_manager::persistence::SnapshotSource;
use trade_manager::{
    AssetClass, CloseReason, ConditionSpec, ManageFlag, MarketSnapshot, PriceSource, Side, TradeId,
    TradeRecord, TradeStatus, TriggerKind,
};

fn unavailable() -> StoreError {
    StoreError::Timeout(Duration::from_secs(5))
}

// ============================================================================
// Records and snapshots
// ============================================================================

pub fn immediate() -> ConditionSpec {
    ConditionSpec {
        enabled: true,
        trigger: Some(TriggerKind::Immediate),
        source: PriceSource::Underlying,
        level: None,
        timeframe: None,
    }
}

pub fn touch(source: PriceSource, level: Decimal) -> ConditionSpec {
    ConditionSpec {
        enabled: true,
        trigger: Some(TriggerKind::ThresholdTouch),
        source,
        level: Some(level),
        timeframe: None,
    }
}

pub fn equity_trade(id: TradeId, symbol: &str, status: TradeStatus) -> TradeRecord {
    TradeRecord {
        id,
        symbol: symbol.to_string(),
        contract: None,
        asset_class: AssetClass::Equity,
        quantity: 10,
        side: Side::Long,
        manage: ManageFlag::Manage,
        status,
        entry: immediate(),
        stop_loss: ConditionSpec::disabled(),
        take_profit: ConditionSpec::disabled(),
    }
}

pub fn tick(price: Decimal) -> MarketSnapshot {
    MarketSnapshot {
        last_price: Some(price),
        ..Default::default()
    }
}

pub fn filled(price: Decimal) -> Value {
    json!({ "order": { "id": 1001, "status": "ok", "fills": [{ "price": price.to_string() }] } })
}

pub fn accepted_unpriced() -> Value {
    json!({ "order": { "id": 1002, "status": "ok" } })
}

// ============================================================================
// Trade store
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedRow {
    pub trade_id: TradeId,
    pub open_price: Decimal,
    pub close_price: Option<Decimal>,
    pub close_reason: Option<CloseReason>,
}

#[derive(Default)]
struct StoreState {
    trades: Vec<TradeRecord>,
    executed: Vec<ExecutedRow>,
    writes: Vec<String>,
}

/// In-memory `TradeStore` with switchable failures
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
    pub fail_fetch: Mutex<bool>,
    pub fail_insert_open: Mutex<bool>,
    pub fail_mark_managing: Mutex<bool>,
    pub fail_close_record: Mutex<bool>,
}

impl FakeStore {
    pub fn with_trades(trades: Vec<TradeRecord>) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().trades = trades;
        store
    }

    pub fn seed_executed_open(&self, trade_id: TradeId, open_price: Decimal) {
        self.state.lock().unwrap().executed.push(ExecutedRow {
            trade_id,
            open_price,
            close_price: None,
            close_reason: None,
        });
    }

    pub fn trade(&self, id: TradeId) -> Option<TradeRecord> {
        self.state.lock().unwrap().trades.iter().find(|t| t.id == id).cloned()
    }

    pub fn executed(&self) -> Vec<ExecutedRow> {
        self.state.lock().unwrap().executed.clone()
    }

    /// Every mutation, in call order
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }
}

#[async_trait]
impl TradeStore for FakeStore {
    async fn fetch_active_trades(&self) -> Result<Vec<TradeRecord>, StoreError> {
        if *self.fail_fetch.lock().unwrap() {
            return Err(unavailable());
        }
        Ok(self.state.lock().unwrap().trades.clone())
    }

    async fn insert_executed_open(&self, record: &TradeRecord, price: Decimal) -> Result<(), StoreError> {
        if *self.fail_insert_open.lock().unwrap() {
            return Err(unavailable());
        }
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("insert_open:{}", record.id));
        state.executed.push(ExecutedRow {
            trade_id: record.id,
            open_price: price,
            close_price: None,
            close_reason: None,
        });
        Ok(())
    }

    async fn mark_managing(&self, trade_id: TradeId) -> Result<(), StoreError> {
        if *self.fail_mark_managing.lock().unwrap() {
            return Err(unavailable());
        }
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("mark_managing:{}", trade_id));
        if let Some(trade) = state.trades.iter_mut().find(|t| t.id == trade_id) {
            trade.status = TradeStatus::Managing;
        }
        Ok(())
    }

    async fn update_executed_close(
        &self,
        trade_id: TradeId,
        _asset_class: AssetClass,
        _quantity: u32,
        price: Decimal,
        reason: CloseReason,
    ) -> Result<(), StoreError> {
        if *self.fail_close_record.lock().unwrap() {
            return Err(unavailable());
        }
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("update_close:{}", trade_id));
        let row = state
            .executed
            .iter_mut()
            .find(|row| row.trade_id == trade_id && row.close_price.is_none())
            .ok_or(StoreError::MissingExecutedOpen(trade_id))?;
        row.close_price = Some(price);
        row.close_reason = Some(reason);
        Ok(())
    }

    async fn delete_trade(&self, trade_id: TradeId) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("delete:{}", trade_id));
        state.trades.retain(|t| t.id != trade_id);
        Ok(())
    }
}

// ============================================================================
// Snapshots
// ============================================================================

#[derive(Default)]
pub struct FakeSnapshots {
    snapshots: Mutex<HashMap<String, MarketSnapshot>>,
    failing: Mutex<HashSet<String>>,
    requests: Mutex<Vec<String>>,
}

impl FakeSnapshots {
    pub fn set(&self, instrument: &str, snapshot: MarketSnapshot) {
        self.snapshots.lock().unwrap().insert(instrument.to_string(), snapshot);
    }

    pub fn fail_for(&self, instrument: &str) {
        self.failing.lock().unwrap().insert(instrument.to_string());
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotSource for FakeSnapshots {
    async fn fetch_snapshot(&self, instrument: &str) -> Result<Option<MarketSnapshot>, StoreError> {
        self.requests.lock().unwrap().push(instrument.to_string());
        if self.failing.lock().unwrap().contains(instrument) {
            return Err(unavailable());
        }
        Ok(self.snapshots.lock().unwrap().get(instrument).cloned())
    }
}

// ============================================================================
// Broker
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerCall {
    pub instrument: String,
    pub quantity: u32,
    pub side: String,
}

/// Replays queued responses; an empty queue answers "accepted, no fill"
#[derive(Default)]
pub struct FakeBroker {
    responses: Mutex<VecDeque<Result<Value, BrokerError>>>,
    calls: Mutex<Vec<BrokerCall>>,
}

impl FakeBroker {
    pub fn respond(&self, response: Result<Value, BrokerError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<BrokerCall> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, instrument: &str, quantity: u32, side: &str) -> Result<Value, BrokerError> {
        self.calls.lock().unwrap().push(BrokerCall {
            instrument: instrument.to_string(),
            quantity,
            side: side.to_string(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(accepted_unpriced()))
    }
}

#[async_trait]
impl Brokerage for FakeBroker {
    async fn place_equity_order(&self, symbol: &str, quantity: u32, side: EquitySide) -> Result<Value, BrokerError> {
        self.answer(symbol, quantity, side.as_str())
    }

    async fn place_option_order(&self, contract: &str, quantity: u32, side: OptionSide) -> Result<Value, BrokerError> {
        self.answer(contract, quantity, side.as_str())
    }
}
