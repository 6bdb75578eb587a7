//! Binance spot REST adapter (native, no external SDK dependency).
//!
//! Public endpoints cover market data (ticker, exchange info, klines);
//! balance lookup and order placement go through HMAC-SHA256 signed
//! requests. When constructed in dry-run mode, orders are routed to the
//! exchange's validate-only `/order/test` endpoint instead of `/order`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde_json::Value;
use sha2::Sha256;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::{ExchangeClient, Kline, OrderAck, OrderRequest};
use crate::domain::SymbolFilters;
use crate::error::{QuarterdeckError, Result};

type HmacSha256 = Hmac<Sha256>;

const API_KEY_HEADER: &str = "X-MBX-APIKEY";
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// API credentials for signed endpoints
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub secret: String,
}

impl ApiCredentials {
    pub fn new(api_key: String, secret: String) -> Self {
        Self { api_key, secret }
    }

    /// Load from the configured environment variables
    pub fn from_env(api_key_env: &str, api_secret_env: &str) -> Result<Self> {
        let api_key = std::env::var(api_key_env).map_err(|_| {
            QuarterdeckError::Config(config::ConfigError::NotFound(api_key_env.into()))
        })?;
        let secret = std::env::var(api_secret_env).map_err(|_| {
            QuarterdeckError::Config(config::ConfigError::NotFound(api_secret_env.into()))
        })?;
        Ok(Self::new(api_key, secret))
    }
}

pub struct BinanceRest {
    client: Client,
    base_url: String,
    credentials: ApiCredentials,
    recv_window_ms: u64,
    dry_run: bool,
}

impl BinanceRest {
    pub fn new(
        base_url: &str,
        credentials: ApiCredentials,
        recv_window_ms: u64,
        dry_run: bool,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            recv_window_ms,
            dry_run,
        })
    }

    /// Hex-encoded HMAC-SHA256 of the request query string
    fn sign(&self, query: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.credentials.secret.as_bytes())
            .map_err(|e| QuarterdeckError::Signature(format!("HMAC init failed: {e}")))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&self.credentials.api_key)
            .map_err(|e| QuarterdeckError::Signature(format!("Invalid API key header: {e}")))?;
        headers.insert(API_KEY_HEADER, value);
        Ok(headers)
    }

    async fn public_get(&self, path: &str, query: &[(String, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(QuarterdeckError::MarketDataUnavailable(format!(
                "GET {path} returned {status}: {body}"
            )));
        }

        Ok(response.json().await?)
    }

    async fn signed_request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
    ) -> Result<Value> {
        let timestamp = Utc::now().timestamp_millis();
        let mut query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>();
        query.push(format!("recvWindow={}", self.recv_window_ms));
        query.push(format!("timestamp={timestamp}"));
        let query = query.join("&");
        let signature = self.sign(&query)?;

        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query, signature
        );
        let response = self
            .client
            .request(method.clone(), &url)
            .headers(self.auth_headers()?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return if method == Method::POST {
                Err(QuarterdeckError::OrderRejected(format!(
                    "{path} returned {status}: {body}"
                )))
            } else {
                Err(QuarterdeckError::MarketDataUnavailable(format!(
                    "{method} {path} returned {status}: {body}"
                )))
            };
        }

        Ok(response.json().await?)
    }
}

fn decimal_field(value: &Value, field: &str) -> Result<Decimal> {
    let raw = value
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| QuarterdeckError::InvalidMarketData(format!("missing field {field}")))?;
    Decimal::from_str(raw)
        .map_err(|e| QuarterdeckError::InvalidMarketData(format!("bad decimal in {field}: {e}")))
}

fn decimal_at(row: &[Value], index: usize) -> Result<Decimal> {
    let raw = row
        .get(index)
        .and_then(|v| v.as_str())
        .ok_or_else(|| QuarterdeckError::InvalidMarketData(format!("missing kline column {index}")))?;
    Decimal::from_str(raw)
        .map_err(|e| QuarterdeckError::InvalidMarketData(format!("bad kline decimal: {e}")))
}

fn millis_to_utc(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| QuarterdeckError::InvalidMarketData(format!("bad timestamp {millis}")))
}

#[async_trait]
impl ExchangeClient for BinanceRest {
    fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    async fn get_balance(&self, asset: &str) -> Result<Decimal> {
        let account = self
            .signed_request(Method::GET, "/api/v3/account", &[])
            .await?;

        let balances = account
            .get("balances")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                QuarterdeckError::InvalidMarketData("account response missing balances".into())
            })?;

        for balance in balances {
            if balance.get("asset").and_then(|v| v.as_str()) == Some(asset) {
                return decimal_field(balance, "free");
            }
        }

        // An asset never traded simply does not appear in the account
        debug!(asset, "asset not present in account balances, treating as zero");
        Ok(Decimal::ZERO)
    }

    async fn last_price(&self, symbol: &str) -> Result<Decimal> {
        let ticker = self
            .public_get(
                "/api/v3/ticker/24hr",
                &[("symbol".to_string(), symbol.to_string())],
            )
            .await?;
        decimal_field(&ticker, "lastPrice")
    }

    async fn symbol_filters(&self, symbol: &str) -> Result<SymbolFilters> {
        let info = self
            .public_get(
                "/api/v3/exchangeInfo",
                &[("symbol".to_string(), symbol.to_string())],
            )
            .await?;

        let filters = info
            .get("symbols")
            .and_then(|v| v.as_array())
            .and_then(|symbols| symbols.first())
            .and_then(|s| s.get("filters"))
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                QuarterdeckError::InvalidMarketData(format!("no filters returned for {symbol}"))
            })?;

        let mut tick_size = None;
        let mut step_size = None;
        let mut min_notional = None;

        for filter in filters {
            match filter.get("filterType").and_then(|v| v.as_str()) {
                Some("PRICE_FILTER") => tick_size = Some(decimal_field(filter, "tickSize")?),
                Some("LOT_SIZE") => step_size = Some(decimal_field(filter, "stepSize")?),
                // The exchange renamed MIN_NOTIONAL to NOTIONAL; accept both
                Some("MIN_NOTIONAL") | Some("NOTIONAL") => {
                    min_notional = Some(decimal_field(filter, "minNotional")?)
                }
                _ => {}
            }
        }

        match (tick_size, step_size, min_notional) {
            (Some(tick_size), Some(step_size), Some(min_notional)) => Ok(SymbolFilters {
                tick_size,
                step_size,
                min_notional,
            }),
            _ => Err(QuarterdeckError::InvalidMarketData(format!(
                "incomplete trading filters for {symbol}"
            ))),
        }
    }

    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>> {
        let rows = self
            .public_get(
                "/api/v3/klines",
                &[
                    ("symbol".to_string(), symbol.to_string()),
                    ("interval".to_string(), interval.to_string()),
                    ("limit".to_string(), limit.to_string()),
                ],
            )
            .await?;

        let rows = rows.as_array().ok_or_else(|| {
            QuarterdeckError::InvalidMarketData("klines response is not an array".into())
        })?;

        let mut klines = Vec::with_capacity(rows.len());
        for row in rows {
            let row = row.as_array().ok_or_else(|| {
                QuarterdeckError::InvalidMarketData("kline row is not an array".into())
            })?;
            let open_millis = row.first().and_then(|v| v.as_i64()).ok_or_else(|| {
                QuarterdeckError::InvalidMarketData("kline row missing open time".into())
            })?;
            klines.push(Kline {
                open_time: millis_to_utc(open_millis)?,
                open: decimal_at(row, 1)?,
                high: decimal_at(row, 2)?,
                low: decimal_at(row, 3)?,
                close: decimal_at(row, 4)?,
                volume: decimal_at(row, 5)?,
            });
        }

        Ok(klines)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck> {
        let path = if self.dry_run {
            "/api/v3/order/test"
        } else {
            "/api/v3/order"
        };

        let params = vec![
            ("symbol".to_string(), request.symbol.clone()),
            ("side".to_string(), request.side.to_string()),
            ("type".to_string(), request.order_type.to_string()),
            ("timeInForce".to_string(), request.time_in_force.to_string()),
            ("quantity".to_string(), request.quantity.to_string()),
            ("price".to_string(), request.price.to_string()),
        ];

        let response = self.signed_request(Method::POST, path, &params).await?;

        // The test endpoint acknowledges with an empty object
        let order_id = response.get("orderId").and_then(|v| v.as_u64());
        if order_id.is_none() && !self.dry_run {
            warn!(symbol = %request.symbol, "live order response carried no order id");
        }

        Ok(OrderAck {
            symbol: request.symbol.clone(),
            order_id,
            quantity: request.quantity,
            price: request.price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn decimal_field_parses_string_numbers() {
        let value = json!({"lastPrice": "333.333"});
        assert_eq!(decimal_field(&value, "lastPrice").unwrap(), dec!(333.333));
    }

    #[test]
    fn decimal_field_rejects_missing_field() {
        let value = json!({});
        assert!(decimal_field(&value, "lastPrice").is_err());
    }

    #[test]
    fn signature_is_stable_hex() {
        let client = BinanceRest::new(
            "https://api.binance.com",
            ApiCredentials::new("key".into(), "secret".into()),
            5000,
            true,
        )
        .unwrap();

        let first = client.sign("symbol=BTCUSDT&timestamp=1").unwrap();
        let second = client.sign("symbol=BTCUSDT&timestamp=1").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
