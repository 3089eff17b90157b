use crate::core::market::{CoinSnapshot, MarketDataProvider};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

const USER_AGENT: &str = concat!("xtrade/", env!("CARGO_PKG_VERSION"));

/// Market data from a CoinGecko compatible `/coins/markets` endpoint.
pub struct CoinGeckoProvider {
    base_url: String,
    client: reqwest::Client,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(CoinGeckoProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[derive(Deserialize, Debug)]
struct MarketCoin {
    id: String,
    symbol: String,
    name: String,
    #[serde(default)]
    image: Option<String>,
    current_price: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    sparkline_in_7d: Option<Sparkline>,
}

#[derive(Deserialize, Debug)]
struct Sparkline {
    #[serde(default)]
    price: Vec<f64>,
}

impl From<MarketCoin> for CoinSnapshot {
    fn from(coin: MarketCoin) -> Self {
        CoinSnapshot {
            id: coin.id,
            symbol: coin.symbol.to_uppercase(),
            name: coin.name,
            image: coin.image.unwrap_or_default(),
            price_usd: coin.current_price.unwrap_or(0.0).max(0.0),
            change: coin.price_change_percentage_24h,
            sparkline: coin.sparkline_in_7d.map(|s| s.price).unwrap_or_default(),
        }
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoProvider {
    #[instrument(name = "CoinGeckoMarketsFetch", skip(self), fields(coins = coin_ids.len()))]
    async fn fetch_markets(&self, coin_ids: &[String]) -> Result<Vec<CoinSnapshot>> {
        let url = format!(
            "{}/api/v3/coins/markets?vs_currency=usd&ids={}&order=market_cap_desc&per_page=100&page=1&sparkline=true&price_change_percentage=24h",
            self.base_url,
            coin_ids.join(",")
        );
        debug!("Requesting market data from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} URL: {}", e, url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} fetching market data",
                response.status()
            ));
        }

        let text = response.text().await?;
        let coins: Vec<MarketCoin> =
            serde_json::from_str(&text).context("Failed to parse market data response")?;
        debug!(count = coins.len(), "Received market data");

        Ok(coins.into_iter().map(CoinSnapshot::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MARKETS_PATH: &str = "/api/v3/coins/markets";

    async fn mock_markets(status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(MARKETS_PATH))
            .and(query_param("vs_currency", "usd"))
            .and(query_param("ids", "bitcoin,ethereum"))
            .and(query_param("sparkline", "true"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    fn ids() -> Vec<String> {
        vec!["bitcoin".to_string(), "ethereum".to_string()]
    }

    #[tokio::test]
    async fn test_successful_markets_fetch() {
        let body = r#"[
            {
                "id": "bitcoin",
                "symbol": "btc",
                "name": "Bitcoin",
                "image": "https://img.example/btc.png",
                "current_price": 60000.5,
                "price_change_percentage_24h": -1.25,
                "sparkline_in_7d": {"price": [59000.0, 59500.0, 60000.5]}
            },
            {
                "id": "ethereum",
                "symbol": "eth",
                "name": "Ethereum",
                "image": "https://img.example/eth.png",
                "current_price": 3000.0,
                "price_change_percentage_24h": null,
                "sparkline_in_7d": null
            }
        ]"#;
        let mock_server = mock_markets(200, body).await;

        let provider = CoinGeckoProvider::new(&mock_server.uri()).unwrap();
        let coins = provider.fetch_markets(&ids()).await.unwrap();

        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].symbol, "BTC");
        assert_eq!(coins[0].price_usd, 60000.5);
        assert_eq!(coins[0].change, Some(-1.25));
        assert_eq!(coins[0].sparkline, vec![59000.0, 59500.0, 60000.5]);
        assert_eq!(coins[1].symbol, "ETH");
        assert_eq!(coins[1].change, None);
        assert!(coins[1].sparkline.is_empty());
    }

    #[tokio::test]
    async fn test_markets_http_error() {
        let mock_server = mock_markets(429, "rate limited").await;

        let provider = CoinGeckoProvider::new(&mock_server.uri()).unwrap();
        let result = provider.fetch_markets(&ids()).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "HTTP error: 429 Too Many Requests fetching market data"
        );
    }

    #[tokio::test]
    async fn test_markets_malformed_response() {
        let mock_server = mock_markets(200, r#"{"status": "unexpected"}"#).await;

        let provider = CoinGeckoProvider::new(&mock_server.uri()).unwrap();
        let result = provider.fetch_markets(&ids()).await;
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse market data response")
        );
    }
}
