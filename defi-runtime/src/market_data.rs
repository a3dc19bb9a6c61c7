use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::AutomationError;
use crate::types::PriceData;

/// Strategy-scoped input for the portfolio drift lookup.
#[derive(Debug, Clone, Copy)]
pub struct DriftContext<'a> {
    pub strategy_id: &'a str,
}

/// Price / portfolio / market data consumed by condition evaluation.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_price(&self, asset: &str) -> Result<Decimal, AutomationError>;

    /// Deviation from target allocation, in percent.
    async fn get_portfolio_drift(&self, ctx: DriftContext<'_>) -> Result<Decimal, AutomationError>;

    /// Market volatility as a fraction (0.30 = 30%).
    async fn get_volatility(&self) -> Result<Decimal, AutomationError>;
}

#[derive(Debug, Clone)]
pub struct MarketDataClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: f64,
    #[allow(dead_code)]
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct DriftResponse {
    drift_pct: f64,
}

#[derive(Debug, Deserialize)]
struct VolatilityResponse {
    volatility: f64,
}

impl MarketDataClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Fetch price for a single asset
    pub async fn price_data(&self, asset: &str) -> Result<PriceData, AutomationError> {
        let url = format!("{}/price/{}", self.base_url, asset);
        let resp: PriceResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| AutomationError::MarketData(e.to_string()))?;

        Ok(PriceData {
            asset: asset.to_string(),
            price_usd: to_decimal(resp.price)?,
            source: self.base_url.clone(),
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl MarketDataProvider for MarketDataClient {
    async fn get_price(&self, asset: &str) -> Result<Decimal, AutomationError> {
        Ok(self.price_data(asset).await?.price_usd)
    }

    async fn get_portfolio_drift(&self, ctx: DriftContext<'_>) -> Result<Decimal, AutomationError> {
        let url = format!("{}/portfolio/drift", self.base_url);
        let resp: DriftResponse = self
            .client
            .get(&url)
            .query(&[("strategy_id", ctx.strategy_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| AutomationError::MarketData(e.to_string()))?;
        to_decimal(resp.drift_pct)
    }

    async fn get_volatility(&self) -> Result<Decimal, AutomationError> {
        let url = format!("{}/volatility", self.base_url);
        let resp: VolatilityResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| AutomationError::MarketData(e.to_string()))?;
        to_decimal(resp.volatility)
    }
}

fn to_decimal(value: f64) -> Result<Decimal, AutomationError> {
    Decimal::try_from(value).map_err(|e| AutomationError::MarketData(e.to_string()))
}

/// Fixed price table for paper runs without a market data service.
#[derive(Debug, Clone)]
pub struct StaticMarketData {
    prices: HashMap<String, Decimal>,
    drift_pct: Decimal,
    volatility: Decimal,
}

impl Default for StaticMarketData {
    fn default() -> Self {
        let prices = [
            ("XLM", Decimal::new(12, 2)),
            ("USDC", Decimal::ONE),
            ("BTC", Decimal::new(45000, 0)),
            ("ETH", Decimal::new(3000, 0)),
        ]
        .into_iter()
        .map(|(asset, price)| (asset.to_string(), price))
        .collect();

        Self {
            prices,
            drift_pct: Decimal::ZERO,
            volatility: Decimal::new(20, 2),
        }
    }
}

impl StaticMarketData {
    pub fn with_price(mut self, asset: &str, price: Decimal) -> Self {
        self.prices.insert(asset.to_uppercase(), price);
        self
    }

    pub fn with_drift(mut self, drift_pct: Decimal) -> Self {
        self.drift_pct = drift_pct;
        self
    }

    pub fn with_volatility(mut self, volatility: Decimal) -> Self {
        self.volatility = volatility;
        self
    }
}

#[async_trait]
impl MarketDataProvider for StaticMarketData {
    async fn get_price(&self, asset: &str) -> Result<Decimal, AutomationError> {
        self.prices
            .get(&asset.to_uppercase())
            .copied()
            .ok_or_else(|| AutomationError::MarketData(format!("No price for {asset}")))
    }

    async fn get_portfolio_drift(&self, _ctx: DriftContext<'_>) -> Result<Decimal, AutomationError> {
        Ok(self.drift_pct)
    }

    async fn get_volatility(&self) -> Result<Decimal, AutomationError> {
        Ok(self.volatility)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_price() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/price/XLM"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "price": 0.125,
                "symbol": "XLM"
            })))
            .mount(&mock_server)
            .await;

        let client = MarketDataClient::new(mock_server.uri());
        let price = client.get_price("XLM").await.unwrap();
        assert_eq!(price, Decimal::new(125, 3));
    }

    #[tokio::test]
    async fn test_drift_and_volatility() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/portfolio/drift"))
            .and(query_param("strategy_id", "s-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "drift_pct": 7.5
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/volatility"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "volatility": 0.25
            })))
            .mount(&mock_server)
            .await;

        let client = MarketDataClient::new(mock_server.uri());
        let drift = client
            .get_portfolio_drift(DriftContext { strategy_id: "s-1" })
            .await
            .unwrap();
        assert_eq!(drift, Decimal::new(75, 1));
        assert_eq!(client.get_volatility().await.unwrap(), Decimal::new(25, 2));
    }

    #[tokio::test]
    async fn test_server_error_is_market_data_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/price/BTC"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = MarketDataClient::new(mock_server.uri());
        assert!(matches!(
            client.get_price("BTC").await,
            Err(AutomationError::MarketData(_))
        ));
    }

    #[tokio::test]
    async fn test_static_table() {
        let data = StaticMarketData::default().with_price("xlm", Decimal::new(8, 2));
        assert_eq!(data.get_price("XLM").await.unwrap(), Decimal::new(8, 2));
        assert_eq!(data.get_price("usdc").await.unwrap(), Decimal::ONE);
        assert!(data.get_price("DOGE").await.is_err());
    }
}
