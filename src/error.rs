use thiserror::Error;

/// Main error type for the trading loop
#[derive(Error, Debug)]
pub enum QuarterdeckError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Filesystem errors (model artifacts, state file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Inference errors
    #[error("Inference failed for {instrument}: {reason}")]
    InferenceFailure { instrument: String, reason: String },

    // Market data errors
    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // Order errors
    #[error(
        "Trading filter violation for {symbol}: notional {notional} below minimum {min_notional}"
    )]
    FilterViolation {
        symbol: String,
        notional: rust_decimal::Decimal,
        min_notional: rust_decimal::Decimal,
    },

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    // Ledger errors
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    // State persistence errors
    #[error("State persistence error: {0}")]
    Persistence(String),

    // Request signing errors
    #[error("Signature error: {0}")]
    Signature(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Result type alias using QuarterdeckError
pub type Result<T> = std::result::Result<T, QuarterdeckError>;

impl QuarterdeckError {
    /// Transient errors are worth a bounded retry inside a cycle;
    /// everything else aborts the cycle immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            QuarterdeckError::Http(_) | QuarterdeckError::MarketDataUnavailable(_)
        )
    }
}
