//! Inference seam: the trained model and its feature scaler live behind the
//! `Predictor` trait. The decision loop only sees a scalar score and the
//! open time of the candle it was computed from.

pub mod aggregator;
pub mod model;

pub use aggregator::PredictorAggregator;
pub use model::ModelPredictor;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::exchange::Kline;

/// Indicator parameters forwarded to the feature pipeline
#[derive(Debug, Clone, Default)]
pub struct IndicatorConfig {
    pub emas: Vec<u32>,
    pub volume_emas: Vec<u32>,
}

/// One model output for one instrument
#[derive(Debug, Clone, Copy)]
pub struct Prediction {
    /// Model score; the selector compares this against the instrument threshold
    pub score: f64,
    /// Open time of the most recent completed candle in the window
    pub open_time: DateTime<Utc>,
}

/// Per-instrument inference capability (model + scaler).
///
/// Must be deterministic for a given window. Failures surface as
/// `InferenceFailure` and exclude only that instrument from the cycle.
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, window: &[Kline], indicators: &IndicatorConfig) -> Result<Prediction>;
}
