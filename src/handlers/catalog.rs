//! The registry served by the `binance-mcp-server` binary

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::{ Error, FieldError };
use crate::registry::{ PromptSpec, Registry, ResourceBody, ResourceSpec, ResourceTemplateSpec, ToolSpec };
use crate::types::PromptArgument;

use super::activity_log::ActivityLog;
use super::price::{ PriceApi, SymbolArgs };

pub const ACTIVITY_LOG_URI: &str = "file://activity.log";
pub const CRYPTO_PRICE_TEMPLATE: &str = "resource://crypto_price/{symbol}";

const SYMBOL_HINTS: &str =
    "When using the get_price and get_price_price_change tools, use the symbol as the argument.\n\
Symbols: For bitcoin/btc, the symbol is \"BTCUSDT\".\n\
Symbols: For ethereum/eth, the symbol is \"ETHUSDT\".";

fn executive_summary() -> String {
    format!(
        "Get the prices of the following crypto asset: btc, eth\n\n\
Provide me with an executive summary including the two-sentence summary of the crypto asset, \
the current price, the price change in the last 24 hours, and the percentage change in the last 24 hours.\n\n{}",
        SYMBOL_HINTS
    )
}

fn crypto_summary(arguments: &HashMap<String, String>) -> Result<String, Error> {
    let crypto = arguments.get("crypto").ok_or_else(|| Error::Validation {
        fields: vec![FieldError::new("crypto", "missing required argument")],
    })?;
    Ok(
        format!(
            "Get the current price of the following crypto asset:\n{}\n\
and also provide a summary of the price changes in the last 24 hours.\n\n{}",
            crypto,
            SYMBOL_HINTS
        )
    )
}

/// Tools, resources and prompts backed by the Binance API and the activity log
pub fn binance_registry(api: Arc<PriceApi>, log: Arc<ActivityLog>) -> Result<Registry, Error> {
    let mut builder = Registry::builder();

    let price_api = Arc::clone(&api);
    builder.register_tool(
        ToolSpec::typed(
            "get_price",
            "Get the current price of a crypto asset from Binance",
            move |args: SymbolArgs| {
                let api = Arc::clone(&price_api);
                async move { api.get_price(&args.symbol).await.map(Value::String) }
            }
        )
    )?;

    let change_api = Arc::clone(&api);
    builder.register_tool(
        ToolSpec::typed(
            "get_price_price_change",
            "Get the price change of the last 24 hours of a crypto asset from Binance",
            move |args: SymbolArgs| {
                let api = Arc::clone(&change_api);
                async move { api.get_price_change(&args.symbol).await }
            }
        )
    )?;

    builder.register_resource(
        ResourceSpec::from_fn(ACTIVITY_LOG_URI, "activity_log", move |_uri, _variables| {
            let log = Arc::clone(&log);
            async move { log.read_all().await.map(ResourceBody::from) }
        })
            .with_description("Every price lookup made by this server")
            .with_mime_type("text/plain")
    )?;

    let resource_api = Arc::clone(&api);
    builder.register_resource_template(
        ResourceTemplateSpec::from_fn(CRYPTO_PRICE_TEMPLATE, "crypto_price", move |_uri, variables| {
            let api = Arc::clone(&resource_api);
            async move {
                let symbol = variables.get("symbol").cloned().unwrap_or_default();
                api.get_price(&symbol).await.map(ResourceBody::from).map_err(Error::from)
            }
        })?
            .with_description("Current price of a crypto asset")
            .with_mime_type("text/plain")
    )?;

    builder.register_prompt(
        PromptSpec::from_text(
            "executive_summary",
            "Returns an executive summary of Bitcoin and Ethereum",
            Vec::new(),
            |_| Ok(executive_summary())
        )
    )?;

    builder.register_prompt(
        PromptSpec::from_text(
            "crypto_summary",
            "Returns a summary of a crypto asset",
            vec![PromptArgument::required("crypto", "Name or symbol of the crypto asset")],
            crypto_summary
        )
    )?;

    Ok(builder.build())
}
