pub mod binance;
pub mod traits;

pub use binance::BinanceRest;
pub use traits::{
    ExchangeClient, Kline, OrderAck, OrderRequest, OrderSide, OrderType, TimeInForce,
};
