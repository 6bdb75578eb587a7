pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod filters;
pub mod inference;
pub mod ledger;
pub mod schedule;
pub mod state;

pub use config::AppConfig;
pub use domain::{Instrument, Position, PredictionRecord, PredictionTable, SymbolFilters};
pub use engine::TradeEngine;
pub use error::{QuarterdeckError, Result};
pub use exchange::{BinanceRest, ExchangeClient, Kline, OrderAck, OrderRequest, OrderSide};
pub use inference::{ModelPredictor, Predictor, PredictorAggregator};
pub use ledger::SimLedger;
pub use state::{StateSnapshot, StateStore};
