use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::SymbolFilters;
use crate::error::Result;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Market => write!(f, "MARKET"),
        }
    }
}

/// Time in force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good Till Cancelled
    GTC,
    /// Fill Or Kill
    FOK,
    /// Immediate Or Cancel
    IOC,
}

impl std::fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeInForce::GTC => write!(f, "GTC"),
            TimeInForce::FOK => write!(f, "FOK"),
            TimeInForce::IOC => write!(f, "IOC"),
        }
    }
}

/// Order request (what we want to do)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub quantity: Decimal,
    pub price: Decimal,
}

impl OrderRequest {
    /// Limit GTC order, the only kind the decision loop places
    pub fn limit_gtc(symbol: &str, side: OrderSide, quantity: Decimal, price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::GTC,
            quantity,
            price,
        }
    }
}

/// Exchange acknowledgment of a placed order.
///
/// The loop does not poll order status afterwards; the acknowledged quantity
/// is assumed to fill. Dry-run (test endpoint) orders come back with no id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub symbol: String,
    pub order_id: Option<u64>,
    pub quantity: Decimal,
    pub price: Decimal,
}

/// One candlestick of the lookback window fed to inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Opaque exchange capability consumed by the decision loop.
///
/// Implementations must surface lookup failures as
/// `MarketDataUnavailable` and declined orders as `OrderRejected`.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Whether orders are routed to the exchange's validate-only endpoint
    fn is_dry_run(&self) -> bool;

    /// Free balance of an asset
    async fn get_balance(&self, asset: &str) -> Result<Decimal>;

    /// Last traded price for a symbol
    async fn last_price(&self, symbol: &str) -> Result<Decimal>;

    /// Trading filters for a symbol (called once at startup, cached by the caller)
    async fn symbol_filters(&self, symbol: &str) -> Result<SymbolFilters>;

    /// Most recent `limit` candles for a symbol at the given interval
    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>>;

    /// Place (or dry-run validate) a limit order
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck>;
}
