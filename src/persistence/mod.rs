use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{timeout, Duration};

use crate::db::StoreError;
use crate::models::MarketSnapshot;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read access to the latest market state per instrument
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// `Ok(None)` when nothing is known about the instrument
    async fn fetch_snapshot(&self, instrument: &str) -> Result<Option<MarketSnapshot>, StoreError>;
}

#[async_trait]
impl<T: SnapshotSource + ?Sized> SnapshotSource for Arc<T> {
    async fn fetch_snapshot(&self, instrument: &str) -> Result<Option<MarketSnapshot>, StoreError> {
        (**self).fetch_snapshot(instrument).await
    }
}

/// Snapshot document as written by the market-data service
#[derive(Debug, Clone, Default, Deserialize)]
struct StoredSnapshot {
    last_price: Option<Decimal>,
    #[serde(default)]
    tf_closes: HashMap<String, StoredClose>,
}

#[derive(Debug, Clone, Deserialize)]
struct StoredClose {
    close: Option<Decimal>,
}

impl From<StoredSnapshot> for MarketSnapshot {
    fn from(stored: StoredSnapshot) -> Self {
        let tf_closes = stored
            .tf_closes
            .into_iter()
            .filter_map(|(tf, candle)| candle.close.map(|close| (tf, close)))
            .collect();

        MarketSnapshot {
            last_price: stored.last_price,
            tf_closes,
        }
    }
}

fn snapshot_key(instrument: &str) -> String {
    format!("spot:{}", instrument)
}

/// Redis-backed market snapshots, read-only
///
/// One JSON document per instrument under `spot:{instrument}`.
#[derive(Clone)]
pub struct RedisSnapshotStore {
    conn: ConnectionManager,
}

impl RedisSnapshotStore {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)?;

        let conn = timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(CONNECT_TIMEOUT))??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }
}

#[async_trait]
impl SnapshotSource for RedisSnapshotStore {
    async fn fetch_snapshot(&self, instrument: &str) -> Result<Option<MarketSnapshot>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(snapshot_key(instrument)).await?;

        let Some(json) = raw else {
            tracing::debug!(instrument, "No snapshot stored");
            return Ok(None);
        };

        let stored: StoredSnapshot = serde_json::from_str(&json)?;
        Ok(Some(stored.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_stored_snapshot_conversion() {
        let json = r#"{
            "last_price": 101.25,
            "tf_closes": {
                "5m": { "close": 100.5 },
                "1h": { "close": null }
            }
        }"#;
        let stored: StoredSnapshot = serde_json::from_str(json).unwrap();
        let snapshot = MarketSnapshot::from(stored);

        assert_eq!(snapshot.last_price, Some(dec!(101.25)));
        assert_eq!(snapshot.close_for("5m"), Some(dec!(100.5)));
        // Null closes are dropped rather than stored as zero
        assert_eq!(snapshot.close_for("1h"), None);
    }

    #[test]
    fn test_missing_fields_default() {
        let stored: StoredSnapshot = serde_json::from_str(r#"{ "last_price": null }"#).unwrap();
        let snapshot = MarketSnapshot::from(stored);

        assert_eq!(snapshot, MarketSnapshot::default());
    }

    #[test]
    fn test_snapshot_key() {
        assert_eq!(snapshot_key("AMD"), "spot:AMD");
        assert_eq!(snapshot_key("O:AMD250919C00160000"), "spot:O:AMD250919C00160000");
    }
}
