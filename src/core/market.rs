//! Market data abstractions and core types

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One coin as last reported by the market data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinSnapshot {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub image: String,
    pub price_usd: f64,
    /// 24h change in percent, if the provider reported one.
    pub change: Option<f64>,
    pub sparkline: Vec<f64>,
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetches the current market for the given provider coin ids.
    async fn fetch_markets(&self, coin_ids: &[String]) -> Result<Vec<CoinSnapshot>>;
}

/// Looks up a coin by its (upper case) ticker symbol.
pub fn find_by_symbol<'a>(snapshots: &'a [CoinSnapshot], symbol: &str) -> Option<&'a CoinSnapshot> {
    snapshots
        .iter()
        .find(|coin| coin.symbol.eq_ignore_ascii_case(symbol))
}
