//! Simulated cash/holdings ledger for test mode.
//!
//! In test mode fills are applied here instead of being sent to the
//! exchange; in live mode the exchange balance is the ledger and this type
//! is never constructed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{QuarterdeckError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimLedger {
    /// Quote-asset cash available to buy with
    pub cash: Decimal,
    /// Base-asset quantity of the currently held instrument; zero when flat
    pub holdings: Decimal,
}

impl SimLedger {
    pub fn new(starting_cash: Decimal) -> Self {
        Self {
            cash: starting_cash,
            holdings: Decimal::ZERO,
        }
    }

    /// Apply a buy fill: debit cash, credit holdings
    pub fn buy(&mut self, price: Decimal, quantity: Decimal) -> Result<()> {
        let cost = price * quantity;
        if cost > self.cash {
            return Err(QuarterdeckError::InsufficientFunds(format!(
                "buy cost {cost} exceeds cash {}",
                self.cash
            )));
        }
        self.cash -= cost;
        self.holdings += quantity;
        Ok(())
    }

    /// Apply a sell fill: credit cash, debit holdings
    pub fn sell(&mut self, price: Decimal, quantity: Decimal) -> Result<()> {
        if quantity > self.holdings {
            return Err(QuarterdeckError::InsufficientFunds(format!(
                "sell quantity {quantity} exceeds holdings {}",
                self.holdings
            )));
        }
        self.cash += price * quantity;
        self.holdings -= quantity;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SymbolFilters;
    use crate::filters::normalize;
    use rust_decimal_macros::dec;

    #[test]
    fn buy_debits_cash_and_credits_holdings() {
        let mut ledger = SimLedger::new(dec!(1000));
        ledger.buy(dec!(100), dec!(4)).unwrap();
        assert_eq!(ledger.cash, dec!(600));
        assert_eq!(ledger.holdings, dec!(4));
    }

    #[test]
    fn overspending_is_rejected() {
        let mut ledger = SimLedger::new(dec!(100));
        assert!(ledger.buy(dec!(100), dec!(2)).is_err());
        assert_eq!(ledger.cash, dec!(100));
        assert_eq!(ledger.holdings, Decimal::ZERO);
    }

    #[test]
    fn selling_more_than_held_is_rejected() {
        let mut ledger = SimLedger::new(dec!(0));
        assert!(ledger.sell(dec!(100), dec!(1)).is_err());
    }

    #[test]
    fn buy_then_sell_at_same_price_never_gains_cash() {
        let filters = SymbolFilters {
            tick_size: dec!(0.01),
            step_size: dec!(0.0001),
            min_notional: dec!(10),
        };
        let price = dec!(333.333);
        let starting_cash = dec!(1000);

        let mut ledger = SimLedger::new(starting_cash);

        let raw_quantity = ledger.cash / price;
        let (buy_price, quantity) = normalize("BTCUSDT", price, raw_quantity, &filters).unwrap();
        ledger.buy(buy_price, quantity).unwrap();

        let (sell_price, sell_quantity) =
            normalize("BTCUSDT", price, ledger.holdings, &filters).unwrap();
        ledger.sell(sell_price, sell_quantity).unwrap();

        // Round-trip at one price returns the starting cash minus rounding
        // loss, never more.
        assert!(ledger.cash <= starting_cash);
        assert!(starting_cash - ledger.cash < dec!(1));
        assert_eq!(ledger.holdings, Decimal::ZERO);
    }
}
