//! JSON-loaded model inference (CPU-only, dependency-light).
//!
//! A `ModelPredictor` pairs a small dense network with a standard-score
//! feature scaler, both exported to JSON at training time. Features are EMAs
//! of closing price and volume over the configured spans, computed from the
//! candle window; the network collapses them to a single score.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{QuarterdeckError, Result};
use crate::exchange::Kline;
use crate::inference::{IndicatorConfig, Prediction, Predictor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
    Tanh,
    Sigmoid,
}

impl Default for Activation {
    fn default() -> Self {
        Self::Linear
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Weights shape: [out_dim][in_dim]
    pub weights: Vec<Vec<f64>>,
    /// Bias shape: [out_dim]
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

impl DenseLayer {
    fn out_dim(&self) -> usize {
        self.weights.len()
    }
}

/// Small MLP with a scalar output (the prediction score)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseNetwork {
    pub input_dim: usize,
    pub layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let network: Self = serde_json::from_str(&content)?;
        network.validate().map_err(QuarterdeckError::Validation)?;
        Ok(network)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.input_dim == 0 {
            return Err("input_dim must be > 0".to_string());
        }
        if self.layers.is_empty() {
            return Err("layers must not be empty".to_string());
        }

        let mut expected_in = self.input_dim;
        for (idx, layer) in self.layers.iter().enumerate() {
            if layer.out_dim() == 0 {
                return Err(format!("layer[{idx}] out_dim must be > 0"));
            }
            if layer.bias.len() != layer.out_dim() {
                return Err(format!(
                    "layer[{idx}] bias len {} != out_dim {}",
                    layer.bias.len(),
                    layer.out_dim()
                ));
            }
            for (r, row) in layer.weights.iter().enumerate() {
                if row.len() != expected_in {
                    return Err(format!(
                        "layer[{idx}] weights row {r} len {} != expected in_dim {expected_in}",
                        row.len()
                    ));
                }
                if row.iter().any(|v| !v.is_finite()) {
                    return Err(format!("layer[{idx}] weights contain non-finite values"));
                }
            }
            expected_in = layer.out_dim();
        }
        if expected_in != 1 {
            return Err(format!("final layer must have out_dim 1, got {expected_in}"));
        }
        Ok(())
    }

    pub fn forward_scalar(&self, input: &[f64]) -> Result<f64> {
        if input.len() != self.input_dim {
            return Err(QuarterdeckError::Validation(format!(
                "input dim mismatch: got {}, expected {}",
                input.len(),
                self.input_dim
            )));
        }

        let mut x: Vec<f64> = input.to_vec();
        for layer in &self.layers {
            let mut y = Vec::with_capacity(layer.out_dim());
            for (row, bias) in layer.weights.iter().zip(&layer.bias) {
                let sum: f64 = bias + row.iter().zip(&x).map(|(w, v)| w * v).sum::<f64>();
                y.push(apply_activation(sum, layer.activation));
            }
            x = y;
        }
        Ok(x[0])
    }
}

fn apply_activation(x: f64, act: Activation) -> f64 {
    match act {
        Activation::Linear => x,
        Activation::Relu => x.max(0.0),
        Activation::Tanh => x.tanh(),
        Activation::Sigmoid => sigmoid(x),
    }
}

fn sigmoid(x: f64) -> f64 {
    // Numerically-stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

/// Standard-score scaler exported alongside the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl FeatureScaler {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let scaler: Self = serde_json::from_str(&content)?;
        if scaler.mean.len() != scaler.std.len() {
            return Err(QuarterdeckError::Validation(format!(
                "scaler mean len {} != std len {}",
                scaler.mean.len(),
                scaler.std.len()
            )));
        }
        if scaler.std.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(QuarterdeckError::Validation(
                "scaler std must be finite and > 0".into(),
            ));
        }
        Ok(scaler)
    }

    pub fn transform(&self, features: &mut [f64]) -> Result<()> {
        if features.len() != self.mean.len() {
            return Err(QuarterdeckError::Validation(format!(
                "scaler dim mismatch: got {}, expected {}",
                features.len(),
                self.mean.len()
            )));
        }
        for (i, value) in features.iter_mut().enumerate() {
            *value = (*value - self.mean[i]) / self.std[i];
        }
        Ok(())
    }
}

/// Exponential moving average over a span, seeded with the first value
fn ema(values: impl Iterator<Item = f64>, span: u32) -> Option<f64> {
    let alpha = 2.0 / (f64::from(span) + 1.0);
    let mut acc: Option<f64> = None;
    for value in values {
        acc = Some(match acc {
            None => value,
            Some(prev) => alpha * value + (1.0 - alpha) * prev,
        });
    }
    acc
}

/// EMA features over the candle window, prices first then volumes,
/// each group in configured span order.
pub fn ema_features(window: &[Kline], indicators: &IndicatorConfig) -> Vec<f64> {
    use rust_decimal::prelude::ToPrimitive;

    let closes: Vec<f64> = window
        .iter()
        .map(|k| k.close.to_f64().unwrap_or(f64::NAN))
        .collect();
    let volumes: Vec<f64> = window
        .iter()
        .map(|k| k.volume.to_f64().unwrap_or(f64::NAN))
        .collect();

    let mut features = Vec::with_capacity(indicators.emas.len() + indicators.volume_emas.len());
    for span in &indicators.emas {
        features.push(ema(closes.iter().copied(), *span).unwrap_or(f64::NAN));
    }
    for span in &indicators.volume_emas {
        features.push(ema(volumes.iter().copied(), *span).unwrap_or(f64::NAN));
    }
    features
}

/// Model + scaler behind the `Predictor` seam
pub struct ModelPredictor {
    instrument: String,
    network: DenseNetwork,
    scaler: FeatureScaler,
}

impl ModelPredictor {
    pub fn load(instrument: &str, model_path: &str, scaler_path: &str) -> Result<Self> {
        let network = DenseNetwork::from_file(model_path)?;
        let scaler = FeatureScaler::from_file(scaler_path)?;
        if scaler.mean.len() != network.input_dim {
            return Err(QuarterdeckError::Validation(format!(
                "scaler dim {} != model input dim {} for {instrument}",
                scaler.mean.len(),
                network.input_dim
            )));
        }
        Ok(Self {
            instrument: instrument.to_string(),
            network,
            scaler,
        })
    }

    fn failure(&self, reason: String) -> QuarterdeckError {
        QuarterdeckError::InferenceFailure {
            instrument: self.instrument.clone(),
            reason,
        }
    }
}

#[async_trait]
impl Predictor for ModelPredictor {
    async fn predict(&self, window: &[Kline], indicators: &IndicatorConfig) -> Result<Prediction> {
        let last = window
            .last()
            .ok_or_else(|| self.failure("empty candle window".into()))?;

        let mut features = ema_features(window, indicators);
        if features.iter().any(|f| !f.is_finite()) {
            return Err(self.failure("non-finite feature values".into()));
        }
        self.scaler
            .transform(&mut features)
            .map_err(|e| self.failure(e.to_string()))?;

        let score = self
            .network
            .forward_scalar(&features)
            .map_err(|e| self.failure(e.to_string()))?;

        Ok(Prediction {
            score,
            open_time: last.open_time,
        })
    }
}
