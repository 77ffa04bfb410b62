//! Margin, liquidation checks and request validation.
//!
//! Equity for the liquidation check is `collateral + pnl + fundingPnl +
//! entryImpact`. Exit impact is left out here and only charged at final
//! settlement. A position is flagged when equity is strictly below
//! `size * maintenanceMarginRate`; negative equity is always below.
//!
//! Request validation is the soft-rejection path: it produces a
//! confidential flag, never an error.

use crate::confidential::{ConfidentialCompute, ConfidentialExt, Ebool, Euint};
use crate::position::{EntryRange, Position};
use crate::signed::SignedValue;
use crate::config::MarketParams;
use crate::types::{to_fixed, Price, Quote, SCALE};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginParams {
    /// fraction of notional that equity must stay at or above
    pub maintenance_margin_rate: Decimal,
}

impl Default for MarginParams {
    fn default() -> Self {
        Self {
            maintenance_margin_rate: dec!(0.05),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarginEngine {
    maintenance_rate: u128,
    max_leverage: u128,
    min_size: u128,
    max_size: u128,
    max_oi_per_side: u128,
}

impl MarginEngine {
    pub fn new(params: &MarginParams, limits: &MarketParams) -> Self {
        Self {
            maintenance_rate: to_fixed(params.maintenance_margin_rate).unwrap_or(0),
            max_leverage: to_fixed(limits.max_leverage.value()).unwrap_or(SCALE),
            min_size: limits.min_size.to_fixed().unwrap_or(0),
            max_size: limits.max_size.to_fixed().unwrap_or(0),
            max_oi_per_side: limits.max_oi_per_side.to_fixed().unwrap_or(0),
        }
    }

    /// size * maintenanceMarginRate
    pub fn required_margin(&self, cc: &mut dyn ConfidentialCompute, size: Euint) -> Euint {
        cc.mul_div_plain(size, self.maintenance_rate, SCALE)
    }

    /// Equity as seen by the liquidation check.
    pub fn maintenance_equity(
        &self,
        cc: &mut dyn ConfidentialCompute,
        position: &Position,
        mark: Price,
        funding_pnl: SignedValue,
    ) -> SignedValue {
        let collateral = collateral_value(cc, position.collateral);
        let pnl = price_pnl(cc, position.direction, position.size, position.entry_price, mark);
        let equity = collateral.add(cc, pnl);
        let equity = equity.add(cc, funding_pnl);
        equity.add(cc, position.entry_impact)
    }

    /// Confidential `toBeLiquidated`: equity < requiredMargin.
    pub fn check_liquidation(
        &self,
        cc: &mut dyn ConfidentialCompute,
        position: &Position,
        mark: Price,
        funding_pnl: SignedValue,
    ) -> Ebool {
        let equity = self.maintenance_equity(cc, position, mark, funding_pnl);
        let required = self.required_margin(cc, position.size);
        equity.lt_unsigned(cc, required)
    }

    /// Confidential `requestValid`. `side_oi` is the filled OI plus the
    /// reservations of accepted, unfilled requests on the request's side.
    pub fn validate_request(
        &self,
        cc: &mut dyn ConfidentialCompute,
        size: Euint,
        collateral: Quote,
        range: EntryRange,
        side_oi: Euint,
    ) -> Ebool {
        let min_size = cc.constant(self.min_size);
        let max_size = cc.constant(self.max_size);
        let above_min = cc.ge(size, min_size);
        let below_max = cc.le(size, max_size);
        let size_ok = cc.and(above_min, below_max);

        // size <= collateral * maxLeverage, both sides in SCALE^2
        let notional = cc.mul_div_plain(size, SCALE, 1);
        let capacity = cc.constant(
            collateral
                .to_fixed()
                .unwrap_or(0)
                .saturating_mul(self.max_leverage),
        );
        let leverage_ok = cc.le(notional, capacity);

        let oi_after = cc.add(side_oi, size);
        let oi_cap = cc.constant(self.max_oi_per_side);
        let oi_ok = cc.le(oi_after, oi_cap);

        let zero = cc.constant(0);
        let low_positive = cc.gt(range.low, zero);
        let ordered = cc.le(range.low, range.high);
        let range_ok = cc.and(low_positive, ordered);

        let valid = cc.and(size_ok, leverage_ok);
        let valid = cc.and(valid, oi_ok);
        cc.and(valid, range_ok)
    }

    /// Confidential `priceInRange`: low <= price <= high.
    pub fn price_in_range(&self, cc: &mut dyn ConfidentialCompute, range: EntryRange, price: Price) -> Ebool {
        let price = cc.constant(price.to_fixed().unwrap_or(0));
        let above_low = cc.ge(price, range.low);
        let below_high = cc.le(price, range.high);
        cc.and(above_low, below_high)
    }
}

/// Plaintext collateral lifted into a non-negative signed value.
pub fn collateral_value(cc: &mut dyn ConfidentialCompute, collateral: Quote) -> SignedValue {
    let magnitude = cc.constant(collateral.to_fixed().unwrap_or(0));
    SignedValue::non_negative(cc, magnitude)
}

/// size * |mark - entry| / entry, a gain when the move favours the direction.
pub fn price_pnl(
    cc: &mut dyn ConfidentialCompute,
    direction: Ebool,
    size: Euint,
    entry_price: Euint,
    mark: Price,
) -> SignedValue {
    let mark = cc.constant(mark.to_fixed().unwrap_or(0));
    let up = cc.ge(mark, entry_price);
    let down = cc.ge(entry_price, mark);
    let gain = cc.select_bool(direction, up, down);

    let moved = cc.abs_diff(mark, entry_price);
    let scaled = cc.mul(size, moved);
    let magnitude = cc.div(scaled, entry_price);

    SignedValue::new(gain, magnitude)
}
