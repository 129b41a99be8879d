//! Discord gateway event source.

pub mod client;
pub mod payload;

pub use client::{DEFAULT_GATEWAY_URL, GatewayClient, GatewayConfig};
