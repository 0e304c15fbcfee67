//! Wire types for the exchange backend API.
//!
//! CRITICAL: All prices and quantities use `rust_decimal::Decimal`.
//! NEVER use f64 for financial math.
//!
//! The exchange serializes decimals as JSON strings, so every `Decimal`
//! field carries a string deserializer.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 24h ticker for a single trading pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    /// Trading pair symbol (e.g., "BTC-USD").
    pub symbol: String,
    /// Last traded price.
    #[serde(deserialize_with = "deserialize_decimal_string")]
    pub last_price: Decimal,
    /// Price change over the last 24h, as a ratio (0.012 = +1.2%).
    #[serde(deserialize_with = "deserialize_decimal_string")]
    pub change_24h: Decimal,
    /// 24h high.
    #[serde(deserialize_with = "deserialize_decimal_string")]
    pub high_24h: Decimal,
    /// 24h low.
    #[serde(deserialize_with = "deserialize_decimal_string")]
    pub low_24h: Decimal,
    /// 24h traded volume in quote currency.
    #[serde(deserialize_with = "deserialize_decimal_string")]
    pub volume_24h: Decimal,
}

/// Aggregate market index (e.g., a sector or volatility index).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPrice {
    /// Index name (e.g., "DEFI-10").
    pub name: String,
    #[serde(deserialize_with = "deserialize_decimal_string")]
    pub value: Decimal,
    /// Change over the last 24h, as a ratio.
    #[serde(deserialize_with = "deserialize_decimal_string")]
    pub change_24h: Decimal,
}

/// Asset balance for an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Asset symbol (e.g., "USDC").
    pub asset: String,
    /// Freely available amount.
    #[serde(deserialize_with = "deserialize_decimal_string")]
    pub free: Decimal,
    /// Amount locked in open orders.
    #[serde(deserialize_with = "deserialize_decimal_string")]
    pub locked: Decimal,
}

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Open position for an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Trading pair symbol.
    pub symbol: String,
    pub side: PositionSide,
    #[serde(deserialize_with = "deserialize_decimal_string")]
    pub size: Decimal,
    #[serde(deserialize_with = "deserialize_decimal_string")]
    pub entry_price: Decimal,
    #[serde(deserialize_with = "deserialize_decimal_string")]
    pub mark_price: Decimal,
    #[serde(deserialize_with = "deserialize_decimal_string")]
    pub unrealized_pnl: Decimal,
}

/// Helper to deserialize decimal from string.
pub(crate) fn deserialize_decimal_string<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    s.parse::<Decimal>().map_err(serde::de::Error::custom)
}
