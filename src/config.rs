use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub schedule: ScheduleConfig,
    pub trading: TradingConfig,
    pub market_data: MarketDataConfig,
    pub instruments: Vec<InstrumentSpec>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// REST API endpoint (e.g., "https://api.binance.com")
    pub rest_url: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Environment variable holding the API secret
    #[serde(default = "default_api_secret_env")]
    pub api_secret_env: String,
    /// Signed-request validity window in milliseconds
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
}

fn default_api_key_env() -> String {
    "BINANCE_API_KEY".to_string()
}

fn default_api_secret_env() -> String {
    "BINANCE_API_SECRET".to_string()
}

fn default_recv_window_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Candle boundary spacing in minutes (four windows per hour)
    #[serde(default = "default_boundary_minutes")]
    pub boundary_minutes: u32,
    /// Seconds past the boundary at which the loop wakes
    #[serde(default = "default_boundary_offset_secs")]
    pub boundary_offset_secs: u32,
    /// Extra delay after waking so the closing candle is available upstream
    #[serde(default = "default_grace_delay_secs")]
    pub grace_delay_secs: u64,
    /// Sleep after a completed cycle before re-arming the boundary check
    #[serde(default = "default_waiting_time_secs")]
    pub waiting_time_secs: u64,
}

fn default_boundary_minutes() -> u32 {
    15
}

fn default_boundary_offset_secs() -> u32 {
    1
}

fn default_grace_delay_secs() -> u64 {
    2
}

fn default_waiting_time_secs() -> u64 {
    240
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            boundary_minutes: default_boundary_minutes(),
            boundary_offset_secs: default_boundary_offset_secs(),
            grace_delay_secs: default_grace_delay_secs(),
            waiting_time_secs: default_waiting_time_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Simulated ledger instead of live order placement
    #[serde(default = "default_test_mode")]
    pub test_mode: bool,
    /// Starting simulated cash (test mode only)
    #[serde(default)]
    pub starting_cash: Option<Decimal>,
    /// Quote asset the loop trades against
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
    /// Checkpoint file for position/ledger recovery across restarts
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// Retry attempts for transient market-data failures
    #[serde(default = "default_market_data_retries")]
    pub market_data_retries: u32,
}

fn default_test_mode() -> bool {
    true
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_state_file() -> String {
    "state.json".to_string()
}

fn default_market_data_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    /// Candle interval (e.g., "15m")
    pub interval: String,
    /// Lookback window length in candles
    pub limit: u32,
    /// EMA spans fed to the feature pipeline
    #[serde(default)]
    pub emas: Vec<u32>,
    /// Volume EMA spans fed to the feature pipeline
    #[serde(default)]
    pub volume_emas: Vec<u32>,
}

/// One tradable instrument as configured (filters are fetched at startup)
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentSpec {
    /// Display name, also the base asset ticker (e.g., "btc")
    pub name: String,
    /// Exchange trading symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Minimum prediction score required to buy this instrument
    pub threshold: f64,
    /// Path or identifier of the trained model artifact
    pub model: String,
    /// Path or identifier of the feature scaler artifact
    pub scaler: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "quarterdeck=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file with `QUARTERDECK_*` env overrides
    pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.to_path_buf()))
            .add_source(Environment::with_prefix("QUARTERDECK").separator("__"))
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.instruments.is_empty() {
            return Err(config::ConfigError::Message(
                "at least one instrument must be configured".into(),
            ));
        }
        if self.schedule.boundary_minutes == 0 || 60 % self.schedule.boundary_minutes != 0 {
            return Err(config::ConfigError::Message(format!(
                "boundary_minutes must divide 60, got {}",
                self.schedule.boundary_minutes
            )));
        }
        if self.schedule.boundary_offset_secs >= 60 {
            return Err(config::ConfigError::Message(
                "boundary_offset_secs must be below 60".into(),
            ));
        }
        if self.trading.test_mode && self.trading.starting_cash.is_none() {
            return Err(config::ConfigError::Message(
                "starting_cash is required in test mode".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            exchange: ExchangeConfig {
                rest_url: "https://api.binance.com".into(),
                api_key_env: default_api_key_env(),
                api_secret_env: default_api_secret_env(),
                recv_window_ms: default_recv_window_ms(),
            },
            schedule: ScheduleConfig::default(),
            trading: TradingConfig {
                test_mode: true,
                starting_cash: Some(Decimal::new(1000, 0)),
                quote_asset: default_quote_asset(),
                state_file: default_state_file(),
                market_data_retries: default_market_data_retries(),
            },
            market_data: MarketDataConfig {
                interval: "15m".into(),
                limit: 200,
                emas: vec![12, 26],
                volume_emas: vec![20],
            },
            instruments: vec![InstrumentSpec {
                name: "btc".into(),
                symbol: "BTCUSDT".into(),
                threshold: 0.6,
                model: "models/btc.onnx".into(),
                scaler: "models/btc-scaler.json".into(),
            }],
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn validate_accepts_base_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_instrument_list() {
        let mut config = base_config();
        config.instruments.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_divisor_boundary() {
        let mut config = base_config();
        config.schedule.boundary_minutes = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_starting_cash_in_test_mode() {
        let mut config = base_config();
        config.trading.starting_cash = None;
        assert!(config.validate().is_err());
    }
}
