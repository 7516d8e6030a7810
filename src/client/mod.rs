//! Client Implementation
//!
//! This module provides the client half of the protocol: it connects over a
//! [`TransportConfig`](crate::transport::TransportConfig) or any open
//! transport, performs the handshake and exposes typed calls for tools,
//! resources and prompts.

pub mod client;
pub mod requests;

pub use client::{ Client, ClientConfig };
pub use requests::RequestManager;
