use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use trade_manager::api::TradierClient;
use trade_manager::config::{Settings, DEFAULT_CONFIG_PATH};
use trade_manager::db::PostgresTradeStore;
use trade_manager::execution::TradeManager;
use trade_manager::persistence::RedisSnapshotStore;

#[derive(Parser, Debug)]
#[command(name = "trade-manager", about = "Automated trade lifecycle controller")]
struct Cli {
    /// Optional TOML settings file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Seconds between iterations (overrides config)
    #[arg(long)]
    interval: Option<u64>,

    /// Run a single iteration and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config, cli.interval).context("Failed to load settings")?;

    tracing::info!("🚀 Trade manager starting");
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Poll interval: {}s", settings.poll_interval_secs);
    tracing::info!("  Broker: {} (account {})", settings.tradier_base_url, settings.tradier_account_id);
    tracing::info!("  Order timeout: {}s", settings.order_timeout_secs);
    tracing::info!("  Fill policy: {:?}", settings.fill_policy);

    let store = PostgresTradeStore::new(&settings.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    let snapshots = RedisSnapshotStore::new(&settings.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    let broker = TradierClient::new(settings.tradier_config()).context("Failed to build Tradier client")?;

    let mut manager = TradeManager::new(Arc::new(store), snapshots, broker, settings.manager_settings());

    if cli.once {
        let report = manager.run_iteration().await;
        tracing::info!("✅ Single iteration done: {:?}", report);
        return Ok(());
    }

    tracing::info!("\nPress Ctrl+C to stop...\n");

    manager
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    tracing::info!("👋 Trade manager stopped");
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trade_manager=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
