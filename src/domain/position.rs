use serde::{Deserialize, Serialize};

use super::Instrument;

/// Position state machine: at most one instrument held at a time.
///
/// Transitions per cycle: `Holding` is liquidated back to `Flat` at cycle
/// start, and `Flat` moves to `Holding` only after a winner is bought. The
/// machine never terminates; it persists across cycles (and, via the
/// checkpoint file, across restarts).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Position {
    #[default]
    Flat,
    Holding(Instrument),
}

impl Position {
    pub fn is_flat(&self) -> bool {
        matches!(self, Position::Flat)
    }

    pub fn held(&self) -> Option<&Instrument> {
        match self {
            Position::Flat => None,
            Position::Holding(instrument) => Some(instrument),
        }
    }

    /// Clear the position, returning the instrument that was held
    pub fn take(&mut self) -> Option<Instrument> {
        match std::mem::take(self) {
            Position::Flat => None,
            Position::Holding(instrument) => Some(instrument),
        }
    }

    pub fn hold(&mut self, instrument: Instrument) {
        *self = Position::Holding(instrument);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SymbolFilters;
    use rust_decimal_macros::dec;

    fn btc() -> Instrument {
        Instrument {
            name: "btc".into(),
            symbol: "BTCUSDT".into(),
            threshold: 0.6,
            filters: SymbolFilters {
                tick_size: dec!(0.01),
                step_size: dec!(0.00001),
                min_notional: dec!(10),
            },
        }
    }

    #[test]
    fn starts_flat() {
        assert!(Position::default().is_flat());
    }

    #[test]
    fn take_clears_a_held_position() {
        let mut position = Position::default();
        position.hold(btc());
        assert!(!position.is_flat());

        let taken = position.take();
        assert_eq!(taken.map(|i| i.symbol), Some("BTCUSDT".to_string()));
        assert!(position.is_flat());
    }

    #[test]
    fn take_on_flat_returns_none() {
        assert!(Position::default().take().is_none());
    }
}
