// Price Feed Integration
//
// The core only needs `latest_price() -> (price, valid)`. Whether it comes from
// Pyth, Chainlink or a keeper-pushed value is the adapter's business. A reading
// that is invalid or non-positive aborts the calling operation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::Price;

/// A single oracle answer. `price` is raw so a misbehaving source can
/// report zero or a negative value; `Exchange` rejects those.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleReading {
    pub price: Decimal,
    pub valid: bool,
}

impl OracleReading {
    /// The price, if the reading can be used at all.
    pub fn usable_price(&self) -> Option<Price> {
        if !self.valid {
            return None;
        }
        Price::new(self.price)
    }
}

/// Trait for price oracle adapters.
pub trait PriceOracle {
    fn latest_price(&self) -> OracleReading;
}

/// Oracle whose answer is set by hand. Used by tests and the simulator.
#[derive(Debug, Clone)]
pub struct StaticOracle {
    price: Decimal,
    valid: bool,
}

impl StaticOracle {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            valid: true,
        }
    }

    pub fn set_price(&mut self, price: Decimal) {
        self.price = price;
    }

    pub fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }
}

impl PriceOracle for StaticOracle {
    fn latest_price(&self) -> OracleReading {
        OracleReading {
            price: self.price,
            valid: self.valid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn usable_price_requires_valid_positive() {
        let mut oracle = StaticOracle::new(dec!(2000));
        assert_eq!(
            oracle.latest_price().usable_price(),
            Some(Price::new_unchecked(dec!(2000)))
        );

        oracle.set_valid(false);
        assert_eq!(oracle.latest_price().usable_price(), None);

        oracle.set_valid(true);
        oracle.set_price(dec!(0));
        assert_eq!(oracle.latest_price().usable_price(), None);
        oracle.set_price(dec!(-3));
        assert_eq!(oracle.latest_price().usable_price(), None);
    }
}
