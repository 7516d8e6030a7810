//! Binance tool handlers
//!
//! The price lookups, the activity log they write to, and the registry that
//! exposes both as tools, resources and prompts.

pub mod activity_log;
pub mod catalog;
pub mod price;

pub use activity_log::ActivityLog;
pub use catalog::{ ACTIVITY_LOG_URI, CRYPTO_PRICE_TEMPLATE, binance_registry };
pub use price::{ PriceApi, PriceApiConfig, SymbolArgs, normalize_symbol };
