//! Typed client for the exchange backend consumed by the trading deck.
//!
//! This crate contains:
//! - Wire types for market and account data (Ticker, IndexPrice, Balance, Position)
//! - A reqwest-based HTTP client with bounded request timeouts
//!
//! The exchange itself is an external collaborator: this crate only reads
//! market and account state, it never places or manages orders.

pub mod client;
pub mod types;

pub use client::{ExchangeClient, ExchangeError, REQUEST_TIMEOUT};
pub use types::{Balance, IndexPrice, Position, PositionSide, Ticker};
