// 5.0: funding. the heavier OI side pays the lighter side, continuously, through two
// cumulative per-unit-notional indices. 5.0 has params, 5.1 accrual, 5.2 the rate.
//
// sign convention: a positive index bump is a cost. longs and shorts always bump with
// opposite signs, so cum_long + cum_short stays flat.

use crate::confidential::{ConfidentialCompute, ConfidentialExt, Ebool, Euint};
use crate::ledger::OpenInterest;
use crate::signed::SignedValue;
use crate::types::{to_fixed, Quote, Timestamp, FUNDING_SCALE, SECONDS_PER_DAY, UTIL_SCALE};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingParams {
    // cap on |rate|, as a fraction of notional per day (0.001 = 0.1%/day)
    pub max_daily_rate: Decimal,
    // skew at which the rate reaches the cap. the rate is linear below it.
    pub skew_scale: Quote,
}

impl Default for FundingParams {
    fn default() -> Self {
        Self {
            max_daily_rate: dec!(0.001),
            skew_scale: Quote::new(dec!(10_000)),
        }
    }
}

impl FundingParams {
    /// MAX_ABS_RATE: per-second cap in FUNDING_SCALE units.
    pub fn max_rate_per_second(&self) -> u128 {
        (self.max_daily_rate * Decimal::from(FUNDING_SCALE as u64) / Decimal::from(SECONDS_PER_DAY as u64))
            .trunc()
            .to_u128()
            .unwrap_or(0)
    }

    pub fn skew_scale_fixed(&self) -> u128 {
        to_fixed(self.skew_scale.value()).unwrap_or(0)
    }
}

/// Cumulative indices and the derived rate. The rate is only ever written
/// by `set_rate_from_skew`.
#[derive(Debug, Clone)]
pub struct FundingEngine {
    max_rate: u128,
    skew_scale: u128,
    cum_long: SignedValue,
    cum_short: SignedValue,
    rate: SignedValue,
    last_update: Timestamp,
}

impl FundingEngine {
    pub fn new(cc: &mut dyn ConfidentialCompute, params: &FundingParams, now: Timestamp) -> Self {
        Self {
            max_rate: params.max_rate_per_second(),
            skew_scale: params.skew_scale_fixed(),
            cum_long: SignedValue::zero(cc),
            cum_short: SignedValue::zero(cc),
            rate: SignedValue::zero(cc),
            last_update: now,
        }
    }

    pub fn rate(&self) -> SignedValue {
        self.rate
    }

    pub fn cumulative(&self) -> (SignedValue, SignedValue) {
        (self.cum_long, self.cum_short)
    }

    pub fn last_update(&self) -> Timestamp {
        self.last_update
    }

    pub fn max_rate(&self) -> u128 {
        self.max_rate
    }

    // 5.1: bump both indices by rate * dt. returns whole seconds accrued.
    pub fn accrue(&mut self, cc: &mut dyn ConfidentialCompute, now: Timestamp) -> u64 {
        if now == self.last_update {
            return 0;
        }
        if now < self.last_update {
            warn!(
                now = now.as_millis(),
                last = self.last_update.as_millis(),
                "Funding: clock went backwards, skipping accrual"
            );
            return 0;
        }

        let dt = self.last_update.whole_secs_until(&now);
        if dt == 0 {
            return 0;
        }

        let elapsed = cc.encrypt(dt as u128);
        let bump = cc.mul(self.rate.magnitude, elapsed);
        let long_bump = SignedValue::new(self.rate.sign, bump);
        let short_bump = SignedValue::new(cc.not(self.rate.sign), bump);

        self.cum_long = self.cum_long.add(cc, long_bump);
        self.cum_short = self.cum_short.add(cc, short_bump);
        // carry the sub-second remainder into the next accrual
        self.last_update = self.last_update.plus_millis(dt as i64 * 1000);

        debug!(elapsed_secs = dt, "Funding: accrued");
        dt
    }

    // 5.2: re-derive the rate from OI skew. call after every OI change.
    pub fn set_rate_from_skew(&mut self, cc: &mut dyn ConfidentialCompute, oi: OpenInterest) {
        let skew_sign = cc.ge(oi.long, oi.short);
        let skew_mag = cc.abs_diff(oi.long, oi.short);

        let raw = cc.mul_div_plain(skew_mag, self.max_rate, self.skew_scale.max(1));
        let cap = cc.constant(self.max_rate);
        let magnitude = cc.min(raw, cap);

        self.rate = SignedValue::new(skew_sign, magnitude);
    }

    /// Cumulative index of the side the confidential direction selects.
    pub fn index_for(&self, cc: &mut dyn ConfidentialCompute, direction: Ebool) -> SignedValue {
        SignedValue::select(cc, direction, self.cum_long, self.cum_short)
    }

    /// Funding PnL since the entry snapshot: -(index_now - snapshot) * size.
    pub fn funding_pnl(
        &self,
        cc: &mut dyn ConfidentialCompute,
        direction: Ebool,
        size: Euint,
        entry_snapshot: SignedValue,
    ) -> SignedValue {
        let current = self.index_for(cc, direction);
        let accrued_cost = current.sub(cc, entry_snapshot);
        let scale = cc.constant(FUNDING_SCALE);
        accrued_cost.negate(cc).mul_div(cc, size, scale)
    }

    /// |rate| / MAX_ABS_RATE in UTIL_SCALE units, capped at 1.
    pub fn utilization(&self, cc: &mut dyn ConfidentialCompute) -> Euint {
        let util = cc.mul_div_plain(self.rate.magnitude, UTIL_SCALE, self.max_rate.max(1));
        let one = cc.constant(UTIL_SCALE);
        cc.min(util, one)
    }
}
