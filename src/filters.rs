//! Order normalization against exchange trading filters.
//!
//! Prices snap down to the tick size, quantities snap down to the step size,
//! and the resulting notional must clear the symbol's minimum. Rounding is
//! truncating, never nearest: an order must not exceed what the raw inputs
//! could afford.

use rust_decimal::Decimal;

use crate::domain::SymbolFilters;
use crate::error::{QuarterdeckError, Result};

/// Snap `value` down to the nearest integer multiple of `quantum`
fn quantize_down(value: Decimal, quantum: Decimal) -> Result<Decimal> {
    if quantum <= Decimal::ZERO {
        return Err(QuarterdeckError::Validation(format!(
            "filter quantum must be positive, got {quantum}"
        )));
    }
    Ok((value / quantum).trunc() * quantum)
}

/// Normalize a raw price/quantity pair for `symbol` against its filters.
///
/// Returns the adjusted pair, or `FilterViolation` when the adjusted
/// notional falls below the minimum. Callers must treat the violation as
/// "no trade this cycle", not retry with different inputs.
pub fn normalize(
    symbol: &str,
    raw_price: Decimal,
    raw_quantity: Decimal,
    filters: &SymbolFilters,
) -> Result<(Decimal, Decimal)> {
    let price = quantize_down(raw_price, filters.tick_size)?;
    let quantity = quantize_down(raw_quantity, filters.step_size)?;

    let notional = price * quantity;
    if notional < filters.min_notional {
        return Err(QuarterdeckError::FilterViolation {
            symbol: symbol.to_string(),
            notional,
            min_notional: filters.min_notional,
        });
    }

    Ok((price, quantity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn filters() -> SymbolFilters {
        SymbolFilters {
            tick_size: dec!(0.01),
            step_size: dec!(0.0001),
            min_notional: dec!(10),
        }
    }

    #[test]
    fn outputs_are_multiples_of_tick_and_step() {
        let (price, quantity) =
            normalize("BTCUSDT", dec!(333.333), dec!(3.00001234), &filters()).unwrap();

        assert_eq!(price, dec!(333.33));
        assert_eq!(quantity, dec!(3.0000));
        assert_eq!((price / dec!(0.01)).fract(), Decimal::ZERO);
        assert_eq!((quantity / dec!(0.0001)).fract(), Decimal::ZERO);
    }

    #[test]
    fn rounding_never_exceeds_raw_inputs() {
        let raw_price = dec!(99.999);
        let raw_quantity = dec!(1.23456789);
        let (price, quantity) = normalize("BTCUSDT", raw_price, raw_quantity, &filters()).unwrap();

        assert!(price <= raw_price);
        assert!(quantity <= raw_quantity);
    }

    #[test]
    fn already_aligned_inputs_pass_through() {
        let (price, quantity) = normalize("BTCUSDT", dec!(100.00), dec!(0.2500), &filters()).unwrap();
        assert_eq!(price, dec!(100.00));
        assert_eq!(quantity, dec!(0.2500));
    }

    #[test]
    fn small_notional_is_a_filter_violation() {
        // cash = 5 at price 333.333 -> quantity 0.0150 -> notional ~5 < 10
        let quantity = dec!(5) / dec!(333.333);
        let err = normalize("BTCUSDT", dec!(333.333), quantity, &filters()).unwrap_err();
        assert!(matches!(err, QuarterdeckError::FilterViolation { .. }));
    }

    #[test]
    fn large_notional_proceeds() {
        // cash = 1000 at price 333.333 -> quantity ~3.0000 -> notional ~1000
        let quantity = dec!(1000) / dec!(333.333);
        let (price, adjusted) = normalize("BTCUSDT", dec!(333.333), quantity, &filters()).unwrap();
        assert!(price * adjusted >= dec!(10));
    }

    #[test]
    fn zero_quantum_is_rejected() {
        let mut f = filters();
        f.step_size = Decimal::ZERO;
        let err = normalize("BTCUSDT", dec!(100), dec!(1), &f).unwrap_err();
        assert!(matches!(err, QuarterdeckError::Validation(_)));
    }
}
