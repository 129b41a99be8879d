//! stream-notify library crate.
//!
//! Tracks which guild members are streaming in voice channels and announces
//! each new go-live session once.

pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod notification;
pub mod presence;
pub mod service;
pub mod utils;

pub use error::{Error, Result};
pub use service::StreamNotifier;
