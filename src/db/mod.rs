// Trade persistence
pub mod postgres;

pub use postgres::PostgresTradeStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::{AssetClass, CloseReason, TradeId, TradeRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("malformed stored document: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("no open executed record for trade {0}")]
    MissingExecutedOpen(TradeId),
}

/// Active trades plus their executed-trade ledger
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// All trades under management, oldest first. Rows that fail validation
    /// are logged and left out.
    async fn fetch_active_trades(&self) -> Result<Vec<TradeRecord>, StoreError>;

    async fn insert_executed_open(&self, record: &TradeRecord, price: Decimal) -> Result<(), StoreError>;

    async fn mark_managing(&self, trade_id: TradeId) -> Result<(), StoreError>;

    async fn update_executed_close(
        &self,
        trade_id: TradeId,
        asset_class: AssetClass,
        quantity: u32,
        price: Decimal,
        reason: CloseReason,
    ) -> Result<(), StoreError>;

    async fn delete_trade(&self, trade_id: TradeId) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: TradeStore + ?Sized> TradeStore for Arc<T> {
    async fn fetch_active_trades(&self) -> Result<Vec<TradeRecord>, StoreError> {
        (**self).fetch_active_trades().await
    }

    async fn insert_executed_open(&self, record: &TradeRecord, price: Decimal) -> Result<(), StoreError> {
        (**self).insert_executed_open(record, price).await
    }

    async fn mark_managing(&self, trade_id: TradeId) -> Result<(), StoreError> {
        (**self).mark_managing(trade_id).await
    }

    async fn update_executed_close(
        &self,
        trade_id: TradeId,
        asset_class: AssetClass,
        quantity: u32,
        price: Decimal,
        reason: CloseReason,
    ) -> Result<(), StoreError> {
        (**self)
            .update_executed_close(trade_id, asset_class, quantity, price, reason)
            .await
    }

    async fn delete_trade(&self, trade_id: TradeId) -> Result<(), StoreError> {
        (**self).delete_trade(trade_id).await
    }
}
