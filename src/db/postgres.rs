use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use super::{StoreError, TradeStore};
use crate::models::{
    AssetClass, CloseReason, ConditionSpec, ManageFlag, RecordError, Side, TradeId, TradeRecord,
    TradeStatus, TriggerKind,
};

const ACTIVE_TRADE_COLUMNS: &str = r#"
    id, symbol, occ, asset_type, qty, side, manage, status,
    entry_enabled, entry_cond, entry_type, entry_level, entry_tf,
    sl_enabled, sl_cond, sl_type, sl_level, sl_tf,
    tp_enabled, tp_cond, tp_type, tp_level, tp_tf
"#;

/// Postgres-backed `active_trades` / `executed_trades` store
pub struct PostgresTradeStore {
    pool: PgPool,
}

/// Raw condition columns for one of entry / sl / tp
#[derive(Debug, Clone, Default)]
pub struct ConditionColumns {
    pub enabled: bool,
    pub cond: Option<String>,
    pub price_type: Option<String>,
    pub level: Option<Decimal>,
    pub timeframe: Option<String>,
}

/// One `active_trades` row before validation
#[derive(Debug, Clone)]
pub struct ActiveTradeRow {
    pub id: TradeId,
    pub symbol: Option<String>,
    pub occ: Option<String>,
    pub asset_type: String,
    pub qty: i64,
    pub side: Option<String>,
    pub manage: Option<String>,
    pub status: String,
    pub entry: ConditionColumns,
    pub sl: ConditionColumns,
    pub tp: ConditionColumns,
}

impl ActiveTradeRow {
    fn from_pg(row: &PgRow) -> Result<Self, sqlx::Error> {
        let condition = |prefix: &str| -> Result<ConditionColumns, sqlx::Error> {
            Ok(ConditionColumns {
                enabled: row
                    .try_get::<Option<bool>, _>(format!("{prefix}_enabled").as_str())?
                    .unwrap_or(false),
                cond: row.try_get(format!("{prefix}_cond").as_str())?,
                price_type: row.try_get(format!("{prefix}_type").as_str())?,
                level: row.try_get(format!("{prefix}_level").as_str())?,
                timeframe: row.try_get(format!("{prefix}_tf").as_str())?,
            })
        };

        Ok(Self {
            id: row.try_get("id")?,
            symbol: row.try_get("symbol")?,
            occ: row.try_get("occ")?,
            asset_type: row.try_get("asset_type")?,
            qty: i64::from(row.try_get::<i32, _>("qty")?),
            side: row.try_get("side")?,
            manage: row.try_get("manage")?,
            status: row.try_get("status")?,
            entry: condition("entry")?,
            sl: condition("sl")?,
            tp: condition("tp")?,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Direction a legacy `ca` / `cb` code must agree with
#[derive(Debug, Clone, Copy)]
enum CloseDirection {
    /// `cb`: close below the level
    Below,
    /// `ca`: close above the level
    Above,
}

impl CloseDirection {
    fn legacy_code(self) -> &'static str {
        match self {
            CloseDirection::Below => "cb",
            CloseDirection::Above => "ca",
        }
    }
}

fn decode_trigger(
    field: &'static str,
    cond: &str,
    direction: CloseDirection,
) -> Result<TriggerKind, RecordError> {
    let code = cond.trim().to_ascii_lowercase();
    if code != "ca" && code != "cb" {
        return cond.parse();
    }

    // The comparison follows the side, so a code pointing the other way cannot be honoured
    if code == direction.legacy_code() {
        Ok(TriggerKind::TimeframeClose)
    } else {
        Err(RecordError::UnknownValue { field, value: code })
    }
}

fn decode_condition(
    field: &'static str,
    columns: ConditionColumns,
    inherited_timeframe: Option<&str>,
    direction: CloseDirection,
) -> Result<ConditionSpec, RecordError> {
    let trigger = non_empty(columns.cond)
        .map(|c| decode_trigger(field, &c, direction))
        .transpose()?;
    let source = columns.price_type.as_deref().unwrap_or("").parse()?;

    let mut timeframe = non_empty(columns.timeframe);
    if timeframe.is_none() && trigger.is_some_and(|t| t.is_timeframe_based()) {
        timeframe = inherited_timeframe.map(str::to_string);
    }

    Ok(ConditionSpec {
        enabled: columns.enabled,
        trigger,
        source,
        level: columns.level,
        timeframe,
    })
}

impl TryFrom<ActiveTradeRow> for TradeRecord {
    type Error = RecordError;

    fn try_from(row: ActiveTradeRow) -> Result<Self, Self::Error> {
        let asset_class: AssetClass = row.asset_type.parse()?;
        let status: TradeStatus = row.status.parse()?;
        let side: Side = row.side.as_deref().unwrap_or("").parse()?;

        let quantity = u32::try_from(row.qty)
            .ok()
            .filter(|q| *q > 0)
            .ok_or(RecordError::InvalidQuantity(row.qty))?;

        let symbol = non_empty(row.symbol).unwrap_or_default();
        let contract = non_empty(row.occ);
        // Options also need the underlying: conditions may read its snapshot
        if symbol.is_empty() {
            return Err(RecordError::MissingSymbol);
        }
        if asset_class == AssetClass::Option && contract.is_none() {
            return Err(RecordError::MissingContract);
        }

        // Entry and stop-loss fire on a move against a long; take-profit on a move with it
        let (adverse, favourable) = match side {
            Side::Long => (CloseDirection::Below, CloseDirection::Above),
            Side::Short => (CloseDirection::Above, CloseDirection::Below),
        };

        let entry_tf = non_empty(row.entry.timeframe.clone());
        let entry = decode_condition("entry_cond", row.entry, None, adverse)?;
        let stop_loss = decode_condition("sl_cond", row.sl, entry_tf.as_deref(), adverse)?;
        let take_profit = decode_condition("tp_cond", row.tp, entry_tf.as_deref(), favourable)?;

        Ok(TradeRecord {
            id: row.id,
            symbol,
            contract,
            asset_class,
            quantity,
            side,
            manage: ManageFlag::parse(row.manage.as_deref()),
            status,
            entry,
            stop_loss,
            take_profit,
        })
    }
}

impl PostgresTradeStore {
    /// Connect to Postgres and run migrations
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres");

        Ok(Self { pool })
    }
}

#[async_trait]
impl TradeStore for PostgresTradeStore {
    async fn fetch_active_trades(&self) -> Result<Vec<TradeRecord>, StoreError> {
        let query = format!(
            "SELECT {} FROM active_trades \
             WHERE status IN ('nt-waiting', 'nt-managing', 'pos-managing') \
             ORDER BY id ASC",
            ACTIVE_TRADE_COLUMNS
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut trades = Vec::with_capacity(rows.len());
        for row in &rows {
            let raw = match ActiveTradeRow::from_pg(row) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable active trade row");
                    continue;
                }
            };
            let id = raw.id;
            match TradeRecord::try_from(raw) {
                Ok(record) => trades.push(record),
                Err(e) => {
                    tracing::warn!(trade_id = id, error = %e, "Skipping invalid active trade");
                }
            }
        }

        tracing::debug!("Loaded {} active trades", trades.len());

        Ok(trades)
    }

    async fn insert_executed_open(&self, record: &TradeRecord, price: Decimal) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO executed_trades (
                id, active_trade_id, symbol, occ, asset_type, side, qty,
                open_price, opened_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.id)
        .bind(&record.symbol)
        .bind(record.contract.as_deref())
        .bind(record.asset_class.as_str())
        .bind(record.side.as_str())
        .bind(record.quantity as i32)
        .bind(price)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        tracing::debug!(trade_id = record.id, price = %price, "Inserted executed open");

        Ok(())
    }

    async fn mark_managing(&self, trade_id: TradeId) -> Result<(), StoreError> {
        sqlx::query("UPDATE active_trades SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(trade_id)
            .bind(TradeStatus::Managing.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_executed_close(
        &self,
        trade_id: TradeId,
        asset_class: AssetClass,
        quantity: u32,
        price: Decimal,
        reason: CloseReason,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE executed_trades
            SET close_price = $2,
                close_reason = $3,
                closed_at = $6,
                realized_pnl = ($2 - open_price) * $4 * $5
                    * CASE WHEN side = 'short' THEN -1 ELSE 1 END
            WHERE active_trade_id = $1 AND closed_at IS NULL
            "#,
        )
        .bind(trade_id)
        .bind(price)
        .bind(reason.as_str())
        .bind(quantity as i32)
        .bind(asset_class.multiplier())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingExecutedOpen(trade_id));
        }

        Ok(())
    }

    async fn delete_trade(&self, trade_id: TradeId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM active_trades WHERE id = $1")
            .bind(trade_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
