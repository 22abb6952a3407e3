use anyhow::{ensure, Result};
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::Deserialize;
use tokio::time::Duration;

use crate::api::tradier::{TradierConfig, TRADIER_API_BASE};
use crate::execution::{FillPolicy, ManagerSettings};

pub const DEFAULT_CONFIG_PATH: &str = "trade_manager.toml";

/// Startup settings, immutable once loaded
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Seconds to sleep between iterations
    pub poll_interval_secs: u64,
    pub database_url: String,
    pub redis_url: String,
    pub tradier_base_url: String,
    pub tradier_account_id: String,
    pub tradier_token: String,
    pub order_timeout_secs: u64,
    pub orders_per_minute: u32,
    pub fill_policy: FillPolicy,
    /// Consecutive unfilled orders before a trade is escalated in the logs
    pub unfilled_escalation_threshold: u32,
}

impl Settings {
    /// Defaults, then the optional TOML file, then the environment, then
    /// the `--interval` override.
    pub fn load(path: &str, interval_override: Option<u64>) -> Result<Self> {
        let mut builder = base_builder(path)?
            .add_source(Environment::default().try_parsing(true));

        if let Some(secs) = interval_override {
            builder = builder.set_override("poll_interval_secs", secs)?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.poll_interval_secs > 0, "poll_interval_secs must be positive");
        ensure!(self.order_timeout_secs > 0, "order_timeout_secs must be positive");
        ensure!(!self.database_url.trim().is_empty(), "database_url is required");
        ensure!(!self.tradier_account_id.trim().is_empty(), "tradier_account_id is required");
        ensure!(!self.tradier_token.trim().is_empty(), "tradier_token is required");
        Ok(())
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            fill_policy: self.fill_policy,
            unfilled_escalation_threshold: self.unfilled_escalation_threshold,
        }
    }

    pub fn tradier_config(&self) -> TradierConfig {
        TradierConfig {
            base_url: self.tradier_base_url.clone(),
            account_id: self.tradier_account_id.clone(),
            token: self.tradier_token.clone(),
            timeout: Duration::from_secs(self.order_timeout_secs),
            orders_per_minute: self.orders_per_minute,
        }
    }
}

fn base_builder(path: &str) -> Result<ConfigBuilder<DefaultState>> {
    let builder = config::Config::builder()
        .set_default("poll_interval_secs", 5)?
        .set_default("database_url", "")?
        .set_default("redis_url", "redis://127.0.0.1:6379")?
        .set_default("tradier_base_url", TRADIER_API_BASE)?
        .set_default("tradier_account_id", "")?
        .set_default("tradier_token", "")?
        .set_default("order_timeout_secs", 8)?
        .set_default("orders_per_minute", 60)?
        .set_default("fill_policy", "require_confirmed")?
        .set_default("unfilled_escalation_threshold", 3)?
        .add_source(File::with_name(path).required(false));
    Ok(builder)
}
