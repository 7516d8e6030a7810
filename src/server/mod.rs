//! Server module
//!
//! This module contains the session engine that serves one connection and the
//! [`Server`] that hands out sessions over stdio or HTTP.

pub mod server;
pub mod session;

pub use server::{ Server, ServerBuilder, ServerConfig };
pub use session::{ NegotiatedSession, ServerSession };
