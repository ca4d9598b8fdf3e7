//! BTC price widget feed: public market APIs, primary plus fallback.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hashwatch_types::{
    series::{BtcTicker, PricePoint},
    Result,
};
use serde::Deserialize;
use tracing::debug;

use crate::client_error;

const COINGECKO_MARKETS: &str =
    "https://api.coingecko.com/api/v3/coins/markets?vs_currency=usd&ids=bitcoin&price_change_percentage=24h";
const COINGECKO_CHART: &str =
    "https://api.coingecko.com/api/v3/coins/bitcoin/market_chart?vs_currency=usd";
const BINANCE_TICKER: &str = "https://api.binance.com/api/v3/ticker/24hr?symbol=BTCUSDT";
const BINANCE_KLINES: &str = "https://api.binance.com/api/v3/klines?symbol=BTCUSDT&interval=5m";

#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn fetch_ticker(&self) -> Result<BtcTicker>;
    async fn fetch_history(&self, hours: u32) -> Result<Vec<PricePoint>>;
}

/// Free public market data, no API key. CoinGecko first, Binance when it
/// fails; callers degrade to "price unavailable" when both do.
pub struct PublicPriceFeed {
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct GeckoMarket {
    current_price: f64,
    #[serde(default)]
    price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    high_24h: Option<f64>,
    #[serde(default)]
    low_24h: Option<f64>,
}

#[derive(Deserialize)]
struct GeckoChart {
    /// `[millis, price]` pairs.
    prices: Vec<(f64, f64)>,
}

#[derive(Deserialize)]
struct BinanceTicker {
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "priceChangePercent")]
    price_change_percent: String,
    #[serde(rename = "highPrice")]
    high_price: String,
    #[serde(rename = "lowPrice")]
    low_price: String,
}

impl PublicPriceFeed {
    pub fn new(request_timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()
            .map_err(|err| client_error(format!("failed to build price client: {err}")))?;
        Ok(Self { http })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| client_error(format!("price fetch failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(client_error(format!("price fetch returned HTTP {status}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|err| client_error(format!("price body invalid: {err}")))
    }

    async fn gecko_ticker(&self) -> Result<BtcTicker> {
        let markets: Vec<GeckoMarket> = self.get_json(COINGECKO_MARKETS).await?;
        let market = markets
            .into_iter()
            .next()
            .ok_or_else(|| client_error("empty markets response"))?;
        Ok(BtcTicker {
            price_usd: market.current_price,
            change_24h_pct: market.price_change_percentage_24h,
            high_24h: market.high_24h,
            low_24h: market.low_24h,
            fetched_at: Utc::now(),
        })
    }

    async fn binance_ticker(&self) -> Result<BtcTicker> {
        let ticker: BinanceTicker = self.get_json(BINANCE_TICKER).await?;
        let parse = |s: &str| s.parse::<f64>().ok();
        let price_usd = parse(&ticker.last_price)
            .ok_or_else(|| client_error("unparsable Binance price"))?;
        Ok(BtcTicker {
            price_usd,
            change_24h_pct: parse(&ticker.price_change_percent),
            high_24h: parse(&ticker.high_price),
            low_24h: parse(&ticker.low_price),
            fetched_at: Utc::now(),
        })
    }

    async fn gecko_history(&self, hours: u32) -> Result<Vec<PricePoint>> {
        let days = (hours as f64 / 24.0).max(1.0).ceil() as u32;
        let url = format!("{COINGECKO_CHART}&days={days}");
        let chart: GeckoChart = self.get_json(&url).await?;
        Ok(chart
            .prices
            .into_iter()
            .filter_map(|(millis, price)| {
                Some(PricePoint {
                    at: millis_to_utc(millis as i64)?,
                    price_usd: price,
                })
            })
            .collect())
    }

    async fn binance_history(&self, hours: u32) -> Result<Vec<PricePoint>> {
        // 5-minute klines; Binance caps a single request at 1000 rows.
        let limit = (u64::from(hours) * 12).min(1000);
        let url = format!("{BINANCE_KLINES}&limit={limit}");
        let klines: Vec<Vec<serde_json::Value>> = self.get_json(&url).await?;
        Ok(klines
            .into_iter()
            .filter_map(|row| {
                let open_ms = row.first()?.as_i64()?;
                let close: f64 = row.get(4)?.as_str()?.parse().ok()?;
                Some(PricePoint {
                    at: millis_to_utc(open_ms)?,
                    price_usd: close,
                })
            })
            .collect())
    }
}

fn millis_to_utc(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

#[async_trait]
impl PriceFeed for PublicPriceFeed {
    async fn fetch_ticker(&self) -> Result<BtcTicker> {
        match self.gecko_ticker().await {
            Ok(ticker) => Ok(ticker),
            Err(err) => {
                debug!("primary price source failed ({err}); trying fallback");
                self.binance_ticker().await
            }
        }
    }

    async fn fetch_history(&self, hours: u32) -> Result<Vec<PricePoint>> {
        match self.gecko_history(hours).await {
            Ok(points) if !points.is_empty() => Ok(points),
            Ok(_) => self.binance_history(hours).await,
            Err(err) => {
                debug!("primary price history failed ({err}); trying fallback");
                self.binance_history(hours).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gecko_chart_pairs_deserialize() {
        let chart: GeckoChart =
            serde_json::from_str(r#"{"prices": [[1714521600000, 61250.5], [1714521900000, 61301.0]]}"#)
                .expect("parse chart");
        assert_eq!(chart.prices.len(), 2);
        assert!((chart.prices[1].1 - 61301.0).abs() < f64::EPSILON);
    }

    #[test]
    fn binance_ticker_strings_parse() {
        let ticker: BinanceTicker = serde_json::from_str(
            r#"{"lastPrice": "61250.10", "priceChangePercent": "-1.25", "highPrice": "62000", "lowPrice": "60800"}"#,
        )
        .expect("parse ticker");
        assert_eq!(ticker.last_price.parse::<f64>().unwrap(), 61250.10);
        assert_eq!(ticker.price_change_percent.parse::<f64>().unwrap(), -1.25);
    }

    #[test]
    fn kline_rows_map_to_points() {
        let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(
            r#"[[1714521600000, "61000", "61500", "60900", "61250.5", "12.3"]]"#,
        )
        .expect("parse klines");
        let open_ms = rows[0][0].as_i64().unwrap();
        let close: f64 = rows[0][4].as_str().unwrap().parse().unwrap();
        assert_eq!(open_ms, 1714521600000);
        assert!((close - 61250.5).abs() < f64::EPSILON);
    }
}
