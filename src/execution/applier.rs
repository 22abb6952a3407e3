use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;

use crate::db::{StoreError, TradeStore};
use crate::models::{CloseReason, TradeRecord};

/// Persistence failure after the broker already filled the order
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("executed-open record not written: {0}")]
    OpenRecord(#[source] StoreError),
    #[error("status not advanced to managing: {0}")]
    MarkManaging(#[source] StoreError),
    #[error("executed-close record not written: {0}")]
    CloseRecord(#[source] StoreError),
    #[error("active trade not deleted: {0}")]
    Delete(#[source] StoreError),
}

impl ApplyError {
    /// The active row survived even though the broker side moved on
    pub fn leaves_trade_active(&self) -> bool {
        !matches!(self, ApplyError::CloseRecord(_))
    }
}

/// Persists lifecycle transitions once a fill price is settled
pub struct StateApplier<S> {
    store: Arc<S>,
}

impl<S: TradeStore> StateApplier<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Record the executed open and move the trade to managing.
    ///
    /// The status is only advanced once the executed-open row exists.
    pub async fn open(&self, record: &TradeRecord, fill_price: Decimal) -> Result<(), ApplyError> {
        self.store
            .insert_executed_open(record, fill_price)
            .await
            .map_err(ApplyError::OpenRecord)?;

        self.store
            .mark_managing(record.id)
            .await
            .map_err(ApplyError::MarkManaging)?;

        tracing::info!(
            trade_id = record.id,
            symbol = %record.symbol,
            price = %fill_price,
            "Position opened, now managing"
        );
        Ok(())
    }

    /// Record the close and delete the active row.
    ///
    /// The row is deleted even if the close record fails so the position is
    /// never sold twice; the missing ledger entry is reported as `CloseRecord`.
    pub async fn close(
        &self,
        record: &TradeRecord,
        fill_price: Decimal,
        reason: CloseReason,
    ) -> Result<(), ApplyError> {
        let ledger = self
            .store
            .update_executed_close(record.id, record.asset_class, record.quantity, fill_price, reason)
            .await;

        if let Err(e) = &ledger {
            tracing::error!(
                trade_id = record.id,
                reason = %reason,
                price = %fill_price,
                error = %e,
                reconciliation_gap = true,
                "Executed close not recorded"
            );
        }

        self.store
            .delete_trade(record.id)
            .await
            .map_err(ApplyError::Delete)?;

        ledger.map_err(ApplyError::CloseRecord)?;

        tracing::info!(
            trade_id = record.id,
            symbol = %record.symbol,
            reason = %reason,
            price = %fill_price,
            "Position closed"
        );
        Ok(())
    }

    /// Drop a pending trade that never opened. No broker interaction.
    pub async fn discard(&self, record: &TradeRecord) -> Result<(), StoreError> {
        self.store.delete_trade(record.id).await?;
        tracing::info!(trade_id = record.id, symbol = %record.symbol, "Pending trade discarded");
        Ok(())
    }
}
