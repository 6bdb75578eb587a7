use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::InstrumentSpec;

/// Exchange-imposed quantization and minimum-size constraints for a symbol.
///
/// Fetched once at startup and treated as read-only for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFilters {
    /// Price must be an integer multiple of this
    pub tick_size: Decimal,
    /// Quantity must be an integer multiple of this
    pub step_size: Decimal,
    /// Minimum order notional (price * quantity)
    pub min_notional: Decimal,
}

/// A tradable instrument with its cached exchange metadata.
///
/// Immutable after startup; the decision loop only reads from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    /// Display name, also the base asset ticker in lowercase (e.g., "btc")
    pub name: String,
    /// Exchange trading symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Minimum prediction score required before this instrument is buyable
    pub threshold: f64,
    /// Trading filters cached from the exchange at startup
    pub filters: SymbolFilters,
}

impl Instrument {
    pub fn from_spec(spec: &InstrumentSpec, filters: SymbolFilters) -> Self {
        Self {
            name: spec.name.clone(),
            symbol: spec.symbol.clone(),
            threshold: spec.threshold,
            filters,
        }
    }

    /// Asset ticker used for balance lookups when liquidating
    pub fn base_asset(&self) -> String {
        self.name.to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn base_asset_is_uppercased_name() {
        let instrument = Instrument {
            name: "eth".into(),
            symbol: "ETHUSDT".into(),
            threshold: 0.7,
            filters: SymbolFilters {
                tick_size: dec!(0.01),
                step_size: dec!(0.0001),
                min_notional: dec!(10),
            },
        };
        assert_eq!(instrument.base_asset(), "ETH");
    }
}
