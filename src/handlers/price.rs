//! Binance price lookups
//!
//! Two read-only calls against the public Binance REST API: the latest price
//! of a symbol and its 24 hour ticker. Both record the outcome in the
//! [`ActivityLog`]. A non-success HTTP status becomes a [`ToolError`] whose code
//! is the status itself.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{ debug, warn };
use url::Url;

use crate::ToolParams;
use crate::errors::Error;
use crate::types::ToolError;

use super::activity_log::ActivityLog;

pub const DEFAULT_API_URL: &str = "https://api.binance.com";
pub const DEFAULT_DATA_URL: &str = "https://data-api.binance.vision";

/// Where and how to reach Binance
#[derive(Debug, Clone)]
pub struct PriceApiConfig {
    /// Base URL for `/api/v3/ticker/price`
    pub api_url: String,
    /// Base URL for `/api/v3/ticker/24hr`
    pub data_url: String,
    pub timeout: Duration,
}

impl Default for PriceApiConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            data_url: DEFAULT_DATA_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Arguments shared by both price tools
#[derive(Debug, Clone, Deserialize, ToolParams)]
pub struct SymbolArgs {
    #[param(description = "The symbol or name of the crypto asset, e.g. BTCUSDT or bitcoin")]
    pub symbol: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

/// Map common coin names to their USDT trading pair
pub fn normalize_symbol(name: &str) -> String {
    match name.trim().to_lowercase().as_str() {
        "bitcoin" | "btc" => "BTCUSDT".to_string(),
        "ethereum" | "eth" => "ETHUSDT".to_string(),
        _ => name.trim().to_uppercase(),
    }
}

/// Client for the two Binance endpoints the tools use
pub struct PriceApi {
    http: reqwest::Client,
    config: PriceApiConfig,
    log: Arc<ActivityLog>,
}

impl PriceApi {
    pub fn new(config: PriceApiConfig, log: Arc<ActivityLog>) -> Result<Self, Error> {
        let http = reqwest::Client
            ::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http, config, log })
    }

    pub fn config(&self) -> &PriceApiConfig {
        &self.config
    }

    fn endpoint(base: &str, path: &str, symbol: &str) -> Result<Url, ToolError> {
        let address = format!("{}{}", base.trim_end_matches('/'), path);
        Url::parse_with_params(&address, &[("symbol", symbol)]).map_err(|e|
            ToolError::internal(format!("Invalid Binance URL {}: {}", address, e))
        )
    }

    async fn fetch(&self, url: Url, symbol: &str) -> Result<reqwest::Response, ToolError> {
        debug!("GET {}", url);
        let response = self.http
            .get(url)
            .send().await
            .map_err(|e| ToolError::internal(format!("Request to Binance failed for {}: {}", symbol, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("Error getting price for {}: {} {}", symbol, status.as_u16(), body.trim());
        if let Err(e) = self.log.record_failure(&message).await {
            warn!("Failed to write activity log: {}", e);
        }
        Err(ToolError::new(status.as_u16() as i64, message))
    }

    /// `"The current price of {SYMBOL} is {price}"`
    pub async fn get_price(&self, symbol: &str) -> Result<String, ToolError> {
        let symbol = normalize_symbol(symbol);
        let url = Self::endpoint(&self.config.api_url, "/api/v3/ticker/price", &symbol)?;
        let ticker: TickerPrice = self
            .fetch(url, &symbol).await?
            .json().await
            .map_err(|e| ToolError::internal(format!("Unexpected price response for {}: {}", symbol, e)))?;

        if let Err(e) = self.log.record_success(&symbol, &ticker.price).await {
            warn!("Failed to write activity log: {}", e);
        }
        Ok(format!("The current price of {} is {}", symbol, ticker.price))
    }

    /// The 24 hour ticker statistics as returned by Binance
    pub async fn get_price_change(&self, symbol: &str) -> Result<Value, ToolError> {
        let symbol = normalize_symbol(symbol);
        let url = Self::endpoint(&self.config.data_url, "/api/v3/ticker/24hr", &symbol)?;
        self.fetch(url, &symbol).await?
            .json().await
            .map_err(|e| ToolError::internal(format!("Unexpected 24hr response for {}: {}", symbol, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("bitcoin"), "BTCUSDT");
        assert_eq!(normalize_symbol("BTC"), "BTCUSDT");
        assert_eq!(normalize_symbol("Ethereum"), "ETHUSDT");
        assert_eq!(normalize_symbol("eth"), "ETHUSDT");
        assert_eq!(normalize_symbol("solusdt"), "SOLUSDT");
    }

    #[test]
    fn test_endpoint_encodes_symbol() {
        let url = PriceApi::endpoint("http://localhost:9000/", "/api/v3/ticker/price", "BTC USDT").unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/api/v3/ticker/price?symbol=BTC+USDT");
    }

    #[test]
    fn test_symbol_args_schema() {
        let schema = SymbolArgs::parameter_schema();
        let symbol = schema.get("symbol").unwrap();
        assert!(symbol.required);
    }
}
