//! Price impact.
//!
//! Quadratic impact against pre-trade OI skew: a trade of `size` moving
//! skew from `s` to `s'` costs `coefficient * (s'^2 - s^2) / price`.
//! Trades that push skew further out pay; trades that pull it back earn.
//!
//! The coefficient is `price * GAMMA / (2 * effectiveLiquidity)` where
//! effective liquidity thins out as the funding rate approaches its cap:
//! `max(tvl * FACTOR, MIN_LIQUIDITY) / (1 + BETA * utilization)`.
//!
//! Entry impact is snapshotted at fill. Exit impact is recomputed at
//! settlement as the opposite trade against the current skew, so the two
//! only cancel when the coefficient has not moved in between.

use crate::confidential::{ConfidentialCompute, ConfidentialExt, Ebool, Euint};
use crate::ledger::OpenInterest;
use crate::signed::SignedValue;
use crate::types::{to_fixed, Price, Quote, COEF_SCALE, SCALE, UTIL_SCALE};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactParams {
    /// GAMMA: price move, as a fraction, for a skew equal to the liquidity
    pub gamma: Decimal,
    /// FACTOR: share of pool TVL counted as depth
    pub liquidity_factor: Decimal,
    /// MIN_LIQUIDITY floor on depth
    pub min_liquidity: Quote,
    /// BETA: how strongly funding utilization thins depth
    pub beta: Decimal,
}

impl Default for ImpactParams {
    fn default() -> Self {
        Self {
            gamma: dec!(0.01),
            liquidity_factor: dec!(1),
            min_liquidity: Quote::new(dec!(100_000)),
            beta: dec!(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImpactEngine {
    gamma: u128,
    liquidity_factor: u128,
    min_liquidity: u128,
    beta: u128,
}

impl ImpactEngine {
    pub fn new(params: &ImpactParams) -> Self {
        Self {
            gamma: to_fixed(params.gamma).unwrap_or(0),
            liquidity_factor: to_fixed(params.liquidity_factor).unwrap_or(0),
            min_liquidity: to_fixed(params.min_liquidity.value()).unwrap_or(0),
            beta: to_fixed(params.beta).unwrap_or(0),
        }
    }

    /// max(tvl * FACTOR, MIN_LIQUIDITY), fixed point. plaintext: TVL is public.
    pub fn base_liquidity(&self, pool_tvl: Quote) -> u128 {
        let tvl = pool_tvl.to_fixed().unwrap_or(0);
        let scaled = tvl.saturating_mul(self.liquidity_factor) / SCALE;
        scaled.max(self.min_liquidity).max(1)
    }

    pub fn effective_liquidity(
        &self,
        cc: &mut dyn ConfidentialCompute,
        pool_tvl: Quote,
        utilization: Euint,
    ) -> Euint {
        let base = self.base_liquidity(pool_tvl);
        // 1 + BETA * util, in UTIL_SCALE
        let stress = cc.mul_div_plain(utilization, self.beta, SCALE);
        let one = cc.constant(UTIL_SCALE);
        let denominator = cc.add(one, stress);
        let numerator = cc.constant(base.saturating_mul(UTIL_SCALE));
        cc.div(numerator, denominator)
    }

    /// price * GAMMA / (2 * effectiveLiquidity), in COEF_SCALE.
    pub fn coefficient(
        &self,
        cc: &mut dyn ConfidentialCompute,
        price: Price,
        pool_tvl: Quote,
        utilization: Euint,
    ) -> Euint {
        let liquidity = self.effective_liquidity(cc, pool_tvl, utilization);
        let price = price.to_fixed().unwrap_or(0);
        // price_f * gamma_f / liquidity_f is in SCALE; lift to COEF_SCALE
        let numerator = cc.constant(
            price
                .saturating_mul(self.gamma)
                .saturating_mul(COEF_SCALE / SCALE),
        );
        let two = cc.constant(2);
        let denominator = cc.mul(liquidity, two);
        cc.div(numerator, denominator)
    }

    /// Impact of a trade against the given skew. Positive = trader earns.
    ///
    /// Routing by trade side and skew side:
    /// - long into long skew, short into short skew: loss of `x^2 + 2mx`
    /// - long into short skew, short into long skew: `x^2 - 2mx`, a loss
    ///   when positive and a gain otherwise, computed as `|x^2 - 2mx|`
    pub fn trade_impact(
        &self,
        cc: &mut dyn ConfidentialCompute,
        is_long_trade: Ebool,
        size: Euint,
        oi: OpenInterest,
        coefficient: Euint,
        price: Price,
    ) -> SignedValue {
        let skew_sign = cc.ge(oi.long, oi.short);
        let skew_mag = cc.abs_diff(oi.long, oi.short);

        let size_sq = cc.mul(size, size);
        let two = cc.constant(2);
        let cross = cc.mul(skew_mag, size);
        let two_cross = cc.mul(cross, two);

        let widening = cc.add(size_sq, two_cross);
        let narrowing_loss = cc.gt(size_sq, two_cross);
        let narrowing = cc.abs_diff(size_sq, two_cross);

        let same_side = cc.bool_eq(is_long_trade, skew_sign);
        let bucket = cc.select(same_side, widening, narrowing);
        let loss = cc.encrypt_bool(false);
        let narrowing_sign = cc.not(narrowing_loss);
        let sign = cc.select_bool(same_side, loss, narrowing_sign);

        let price = cc.constant(price.to_fixed().unwrap_or(1).max(1));
        let per_price = cc.div(bucket, price);
        let coef_scale = cc.constant(COEF_SCALE);
        let magnitude = {
            let scaled = cc.mul(per_price, coefficient);
            cc.div(scaled, coef_scale)
        };

        SignedValue::new(sign, magnitude)
    }

    pub fn entry_impact(
        &self,
        cc: &mut dyn ConfidentialCompute,
        direction: Ebool,
        size: Euint,
        oi: OpenInterest,
        coefficient: Euint,
        price: Price,
    ) -> SignedValue {
        self.trade_impact(cc, direction, size, oi, coefficient, price)
    }

    /// Closing a long is a short trade for impact purposes.
    pub fn exit_impact(
        &self,
        cc: &mut dyn ConfidentialCompute,
        direction: Ebool,
        size: Euint,
        oi: OpenInterest,
        coefficient: Euint,
        price: Price,
    ) -> SignedValue {
        let closing_side = cc.not(direction);
        self.trade_impact(cc, closing_side, size, oi, coefficient, price)
    }
}
