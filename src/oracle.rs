//! Price Resolver
//! Mission: Pluggable USD price lookups for outcome resolution
//!
//! The settlement engine only sees the `PriceProvider` trait. Every failure
//! mode on the feed side (unknown symbol, HTTP error, missing field,
//! timeout) collapses to `None`, which the engine surfaces as a retriable
//! price-unavailable condition without mutating any state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::models::Config;

#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// USD price of `symbol` at a specific instant, or None if the feed
    /// cannot produce one
    async fn get_price_at(&self, symbol: &str, at: DateTime<Utc>) -> Option<f64>;

    /// Current USD price of `symbol`
    async fn get_current_price(&self, symbol: &str) -> Option<f64>;
}

// ===== CoinGecko =====

/// CoinGecko free-API provider. Public rate limit is 10-50 calls/min,
/// which is plenty for settlement-time lookups.
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
}

/// Symbols the mini-app supports out of the box
fn symbol_to_id(symbol: &str) -> Option<&'static str> {
    match symbol.to_ascii_uppercase().as_str() {
        "BTC" => Some("bitcoin"),
        "ETH" => Some("ethereum"),
        "WLD" => Some("worldcoin-wld"),
        "USDC" => Some("usd-coin"),
        "USDT" => Some("tether"),
        "SOL" => Some("solana"),
        "MATIC" => Some("matic-network"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    market_data: Option<HistoryMarketData>,
}

#[derive(Debug, Deserialize)]
struct HistoryMarketData {
    current_price: Option<HashMap<String, f64>>,
}

impl CoinGeckoProvider {
    pub fn new(base_url: String, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    async fn get_price_at(&self, symbol: &str, at: DateTime<Utc>) -> Option<f64> {
        let coin_id = match symbol_to_id(symbol) {
            Some(id) => id,
            None => {
                warn!("Unknown asset symbol: {}", symbol);
                return None;
            }
        };

        // CoinGecko history endpoint wants DD-MM-YYYY
        let date = at.format("%d-%m-%Y").to_string();
        let url = format!("{}/coins/{}/history?date={}", self.base_url, coin_id, date);

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("CoinGecko request failed for {} at {}: {}", symbol, date, e);
                return None;
            }
        };
        if !response.status().is_success() {
            warn!("CoinGecko API error for {}: {}", symbol, response.status());
            return None;
        }

        let body: HistoryResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                warn!("CoinGecko response parse failed for {}: {}", symbol, e);
                return None;
            }
        };

        let price = body
            .market_data
            .and_then(|m| m.current_price)
            .and_then(|p| p.get("usd").copied());
        if price.is_none() {
            warn!("No price data for {} on {}", symbol, date);
        }
        price
    }

    async fn get_current_price(&self, symbol: &str) -> Option<f64> {
        let coin_id = match symbol_to_id(symbol) {
            Some(id) => id,
            None => {
                warn!("Unknown asset symbol: {}", symbol);
                return None;
            }
        };

        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.base_url, coin_id
        );

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("CoinGecko request failed for {}: {}", symbol, e);
                return None;
            }
        };
        if !response.status().is_success() {
            warn!("CoinGecko API error for {}: {}", symbol, response.status());
            return None;
        }

        let body: HashMap<String, HashMap<String, f64>> = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                warn!("CoinGecko response parse failed for {}: {}", symbol, e);
                return None;
            }
        };

        body.get(coin_id).and_then(|p| p.get("usd").copied())
    }
}

// ===== Fixed provider (demo mode + tests) =====

/// Deterministic provider backed by preset price points. `get_price_at`
/// returns the latest point at or before the requested instant.
#[derive(Debug, Default)]
pub struct FixedPriceProvider {
    points: HashMap<String, Vec<(DateTime<Utc>, f64)>>,
}

impl FixedPriceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price_at(mut self, symbol: &str, at: DateTime<Utc>, price: f64) -> Self {
        let series = self.points.entry(symbol.to_ascii_uppercase()).or_default();
        series.push((at, price));
        series.sort_by_key(|(t, _)| *t);
        self
    }

    /// Flat demo prices so the app works fully offline
    pub fn with_demo_prices() -> Self {
        let origin = DateTime::<Utc>::UNIX_EPOCH;
        Self::new()
            .with_price_at("BTC", origin, 65_000.0)
            .with_price_at("ETH", origin, 3_400.0)
            .with_price_at("WLD", origin, 2.4)
            .with_price_at("SOL", origin, 150.0)
    }
}

#[async_trait]
impl PriceProvider for FixedPriceProvider {
    async fn get_price_at(&self, symbol: &str, at: DateTime<Utc>) -> Option<f64> {
        let series = self.points.get(&symbol.to_ascii_uppercase())?;
        series
            .iter()
            .rev()
            .find(|(t, _)| *t <= at)
            .map(|(_, price)| *price)
    }

    async fn get_current_price(&self, symbol: &str) -> Option<f64> {
        let series = self.points.get(&symbol.to_ascii_uppercase())?;
        series.last().map(|(_, price)| *price)
    }
}

/// Build the provider selected by configuration
pub fn create_price_provider(config: &Config) -> anyhow::Result<Arc<dyn PriceProvider>> {
    match config.price_provider.as_str() {
        "fixed" => Ok(Arc::new(FixedPriceProvider::with_demo_prices())),
        _ => Ok(Arc::new(CoinGeckoProvider::new(
            config.coingecko_base_url.clone(),
            config.price_timeout_secs,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_fixed_provider_picks_latest_point_at_or_before() {
        let t0 = Utc::now();
        let provider = FixedPriceProvider::new()
            .with_price_at("BTC", t0, 100.0)
            .with_price_at("BTC", t0 + Duration::hours(1), 110.0);

        assert_eq!(provider.get_price_at("BTC", t0).await, Some(100.0));
        assert_eq!(
            provider
                .get_price_at("BTC", t0 + Duration::minutes(30))
                .await,
            Some(100.0)
        );
        assert_eq!(
            provider.get_price_at("BTC", t0 + Duration::hours(2)).await,
            Some(110.0)
        );
        // Before the first point: unavailable
        assert_eq!(
            provider.get_price_at("BTC", t0 - Duration::hours(1)).await,
            None
        );
        assert_eq!(provider.get_current_price("BTC").await, Some(110.0));
    }

    #[tokio::test]
    async fn test_fixed_provider_unknown_symbol() {
        let provider = FixedPriceProvider::with_demo_prices();
        assert_eq!(provider.get_price_at("DOGE", Utc::now()).await, None);
        assert_eq!(provider.get_current_price("DOGE").await, None);
    }

    #[test]
    fn test_symbol_mapping() {
        assert_eq!(symbol_to_id("btc"), Some("bitcoin"));
        assert_eq!(symbol_to_id("WLD"), Some("worldcoin-wld"));
        assert_eq!(symbol_to_id("DOGE"), None);
    }
}
