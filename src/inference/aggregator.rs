//! Fan-out scoring of every configured instrument.
//!
//! The per-instrument calls are independent and side-effect-free, so they
//! run concurrently and join before any decision is made; the assembled
//! table keeps instrument configuration order regardless of completion
//! order. An instrument whose window fetch or inference fails is logged and
//! excluded from the cycle instead of aborting it.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::MarketDataConfig;
use crate::domain::{Instrument, PredictionRecord, PredictionTable};
use crate::error::{QuarterdeckError, Result};
use crate::exchange::ExchangeClient;
use crate::inference::{IndicatorConfig, Prediction, Predictor};

pub struct PredictorAggregator {
    exchange: Arc<dyn ExchangeClient>,
    interval: String,
    limit: u32,
    indicators: IndicatorConfig,
}

impl PredictorAggregator {
    pub fn new(exchange: Arc<dyn ExchangeClient>, market_data: &MarketDataConfig) -> Self {
        Self {
            exchange,
            interval: market_data.interval.clone(),
            limit: market_data.limit,
            indicators: IndicatorConfig {
                emas: market_data.emas.clone(),
                volume_emas: market_data.volume_emas.clone(),
            },
        }
    }

    async fn score_one(
        &self,
        instrument: &Instrument,
        predictor: &dyn Predictor,
    ) -> Result<Prediction> {
        let window = self
            .exchange
            .klines(&instrument.symbol, &self.interval, self.limit)
            .await?;
        if window.is_empty() {
            return Err(QuarterdeckError::InferenceFailure {
                instrument: instrument.name.clone(),
                reason: "empty candle window".into(),
            });
        }

        let prediction = predictor.predict(&window, &self.indicators).await?;
        if !prediction.score.is_finite() {
            return Err(QuarterdeckError::InferenceFailure {
                instrument: instrument.name.clone(),
                reason: format!("non-finite score {}", prediction.score),
            });
        }
        Ok(prediction)
    }

    /// Score every instrument and assemble the cycle's prediction table.
    ///
    /// All instruments are scored before the table is returned, so the
    /// selector never runs against a partially scored cycle.
    pub async fn score_all(
        &self,
        instruments: &[(Instrument, Arc<dyn Predictor>)],
    ) -> PredictionTable {
        let futures = instruments
            .iter()
            .map(|(instrument, predictor)| self.score_one(instrument, predictor.as_ref()));
        let results = join_all(futures).await;

        let mut table = PredictionTable::new();
        for ((instrument, _), result) in instruments.iter().zip(results) {
            match result {
                Ok(prediction) => {
                    info!(
                        name = %instrument.name,
                        symbol = %instrument.symbol,
                        score = prediction.score,
                        threshold = instrument.threshold,
                        open_time = %prediction.open_time,
                        "scored instrument"
                    );
                    table.push(PredictionRecord {
                        open_time: prediction.open_time,
                        name: instrument.name.clone(),
                        symbol: instrument.symbol.clone(),
                        threshold: instrument.threshold,
                        score: prediction.score,
                    });
                }
                Err(e) => {
                    warn!(
                        name = %instrument.name,
                        error = %e,
                        "excluding instrument from this cycle"
                    );
                }
            }
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SymbolFilters;
    use crate::exchange::{Kline, OrderAck, OrderRequest};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct StubExchange;

    #[async_trait]
    impl ExchangeClient for StubExchange {
        fn is_dry_run(&self) -> bool {
            true
        }

        async fn get_balance(&self, _asset: &str) -> Result<Decimal> {
            Ok(dec!(1000))
        }

        async fn last_price(&self, _symbol: &str) -> Result<Decimal> {
            Ok(dec!(100))
        }

        async fn symbol_filters(&self, _symbol: &str) -> Result<SymbolFilters> {
            Ok(SymbolFilters {
                tick_size: dec!(0.01),
                step_size: dec!(0.0001),
                min_notional: dec!(10),
            })
        }

        async fn klines(&self, _symbol: &str, _interval: &str, limit: u32) -> Result<Vec<Kline>> {
            let open_time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
            Ok((0..limit)
                .map(|_| Kline {
                    open_time,
                    open: dec!(100),
                    high: dec!(101),
                    low: dec!(99),
                    close: dec!(100),
                    volume: dec!(5),
                })
                .collect())
        }

        async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck> {
            Ok(OrderAck {
                symbol: request.symbol.clone(),
                order_id: None,
                quantity: request.quantity,
                price: request.price,
            })
        }
    }

    struct FixedPredictor(f64);

    #[async_trait]
    impl Predictor for FixedPredictor {
        async fn predict(
            &self,
            window: &[Kline],
            _indicators: &IndicatorConfig,
        ) -> Result<Prediction> {
            Ok(Prediction {
                score: self.0,
                open_time: window.last().unwrap().open_time,
            })
        }
    }

    struct FailingPredictor;

    #[async_trait]
    impl Predictor for FailingPredictor {
        async fn predict(
            &self,
            _window: &[Kline],
            _indicators: &IndicatorConfig,
        ) -> Result<Prediction> {
            Err(QuarterdeckError::InferenceFailure {
                instrument: "btc".into(),
                reason: "model exploded".into(),
            })
        }
    }

    fn instrument(name: &str, threshold: f64) -> Instrument {
        Instrument {
            name: name.into(),
            symbol: format!("{}USDT", name.to_uppercase()),
            threshold,
            filters: SymbolFilters {
                tick_size: dec!(0.01),
                step_size: dec!(0.0001),
                min_notional: dec!(10),
            },
        }
    }

    fn market_data() -> MarketDataConfig {
        MarketDataConfig {
            interval: "15m".into(),
            limit: 10,
            emas: vec![12],
            volume_emas: vec![20],
        }
    }

    #[tokio::test]
    async fn table_keeps_configuration_order() {
        let aggregator = PredictorAggregator::new(Arc::new(StubExchange), &market_data());
        let instruments: Vec<(Instrument, Arc<dyn Predictor>)> = vec![
            (instrument("btc", 0.6), Arc::new(FixedPredictor(0.7))),
            (instrument("eth", 0.6), Arc::new(FixedPredictor(0.9))),
        ];

        let table = aggregator.score_all(&instruments).await;
        let names: Vec<_> = table.records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["btc", "eth"]);
    }

    #[tokio::test]
    async fn failing_instrument_is_excluded_not_fatal() {
        let aggregator = PredictorAggregator::new(Arc::new(StubExchange), &market_data());
        let instruments: Vec<(Instrument, Arc<dyn Predictor>)> = vec![
            (instrument("btc", 0.6), Arc::new(FailingPredictor)),
            (instrument("eth", 0.6), Arc::new(FixedPredictor(0.9))),
        ];

        let table = aggregator.score_all(&instruments).await;
        assert_eq!(table.len(), 1);
        assert_eq!(table.records()[0].name, "eth");
    }

    #[tokio::test]
    async fn non_finite_scores_are_excluded() {
        let aggregator = PredictorAggregator::new(Arc::new(StubExchange), &market_data());
        let instruments: Vec<(Instrument, Arc<dyn Predictor>)> = vec![(
            instrument("btc", 0.6),
            Arc::new(FixedPredictor(f64::NAN)),
        )];

        let table = aggregator.score_all(&instruments).await;
        assert!(table.is_empty());
    }
}
