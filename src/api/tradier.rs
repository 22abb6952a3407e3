use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::execution::broker::{BrokerError, Brokerage, EquitySide, OptionSide};

pub const TRADIER_API_BASE: &str = "https://api.tradier.com";

type OrderRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Connection settings for the Tradier brokerage API
#[derive(Debug, Clone)]
pub struct TradierConfig {
    /// Base URL without the `/v1` suffix
    pub base_url: String,
    pub account_id: String,
    pub token: String,
    /// Hard limit for a single order request
    pub timeout: Duration,
    pub orders_per_minute: u32,
}

/// Market-order client for Tradier.
///
/// Cloneable; clones share the HTTP pool and the rate limiter.
#[derive(Clone)]
pub struct TradierClient {
    client: Client,
    orders_url: String,
    token: String,
    rate_limiter: Arc<OrderRateLimiter>,
}

impl TradierClient {
    pub fn new(config: TradierConfig) -> Result<Self, BrokerError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        let per_minute = NonZeroU32::new(config.orders_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        Ok(Self {
            client,
            orders_url: orders_url(&config.base_url, &config.account_id),
            token: config.token,
            rate_limiter,
        })
    }

    /// POST a market order and return the decoded response body
    async fn post_order(&self, params: &[(&str, &str)]) -> Result<Value, BrokerError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .post(&self.orders_url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BrokerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| BrokerError::Decode(e.to_string()))?;

        // Validation failures come back as 200 with an `errors` payload
        if let Some(errors) = body.get("errors") {
            return Err(BrokerError::Rejected {
                status: status.as_u16(),
                body: errors.to_string(),
            });
        }

        tracing::debug!(response = %body, "Tradier order response");

        Ok(body)
    }
}

#[async_trait]
impl Brokerage for TradierClient {
    async fn place_equity_order(
        &self,
        symbol: &str,
        quantity: u32,
        side: EquitySide,
    ) -> Result<Value, BrokerError> {
        let quantity = quantity.to_string();
        let params = [
            ("class", "equity"),
            ("symbol", symbol),
            ("side", side.as_str()),
            ("quantity", quantity.as_str()),
            ("type", "market"),
            ("duration", "day"),
        ];

        self.post_order(&params).await
    }

    async fn place_option_order(
        &self,
        contract: &str,
        quantity: u32,
        side: OptionSide,
    ) -> Result<Value, BrokerError> {
        let underlying = occ_root(contract);
        let quantity = quantity.to_string();
        let params = [
            ("class", "option"),
            ("symbol", underlying),
            ("option_symbol", contract),
            ("side", side.as_str()),
            ("quantity", quantity.as_str()),
            ("type", "market"),
            ("duration", "day"),
        ];

        self.post_order(&params).await
    }
}

fn orders_url(base_url: &str, account_id: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = base.strip_suffix("/v1").unwrap_or(base);
    format!("{}/v1/accounts/{}/orders", base, account_id)
}

/// Underlying root of an OCC symbol (`AMD250919C00160000` -> `AMD`)
fn occ_root(contract: &str) -> &str {
    let end = contract
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(contract.len());
    &contract[..end]
}
