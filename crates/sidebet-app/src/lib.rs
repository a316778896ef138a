//! Sidebet Application - high-level client logic
//!
//! Coordinates the crypto core and encrypted key storage.

pub mod client;
pub mod error;

pub use client::MarketClient;
pub use error::{Error, Result};
