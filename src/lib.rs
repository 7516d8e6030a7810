//! Binance MCP
//!
//! This crate provides a Rust implementation of the Model Context Protocol
//! (MCP): a session engine that negotiates capabilities, advertises a registry
//! of tools, resources and prompts, and dispatches calls concurrently, plus a
//! client that performs the handshake and invokes those operations. It speaks
//! newline-delimited JSON-RPC over stdio or child processes and the streamable
//! HTTP transport.
//!
//! The [`handlers`] module builds the registry served by the
//! `binance-mcp-server` binary: Binance price lookups, an activity log and a
//! pair of prompts.

// Generated code from `#[derive(ToolParams)]` names this crate by its public path
extern crate self as binance_mcp;

pub mod client;
pub mod codec;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod lifecycle;
pub mod logging;
pub mod messages;
pub mod registry;
pub mod server;
pub mod transport;
pub mod types;

// Re-export commonly used items
pub use client::{ Client, ClientConfig };
pub use errors::Error;
pub use lifecycle::SessionState;
pub use messages::Message;
pub use registry::{ Registry, ToolParams, ToolSpec };
pub use server::{ Server, ServerConfig };
pub use tool_derive::ToolParams;
pub use transport::{ Transport, TransportConfig };
