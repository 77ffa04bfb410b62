//! Sign + magnitude arithmetic over confidential non-negative integers.
//!
//! The backend has no negative numbers, so every signed confidential
//! quantity (funding indices, funding and price PnL, impact terms, equity)
//! is a `SignedValue`: `sign == true` means non-negative and `magnitude`
//! is always the absolute value.
//!
//! Addition never subtracts a larger magnitude from a smaller one. Both
//! orderings are prepared with `select` and the right one is picked by the
//! comparison result. A zero result may carry either sign (for example
//! `(-5) + 5` keeps the left sign); consumers read `(false, 0)` as zero.

use crate::confidential::{ConfidentialCompute, ConfidentialExt, Ebool, Euint};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedValue {
    pub sign: Ebool,
    pub magnitude: Euint,
}

impl SignedValue {
    pub fn new(sign: Ebool, magnitude: Euint) -> Self {
        Self { sign, magnitude }
    }

    pub fn zero(cc: &mut dyn ConfidentialCompute) -> Self {
        Self::from_plain(cc, 0)
    }

    pub fn non_negative(cc: &mut dyn ConfidentialCompute, magnitude: Euint) -> Self {
        let sign = cc.encrypt_bool(true);
        Self { sign, magnitude }
    }

    /// Trivial encryption of a plaintext signed constant.
    pub fn from_plain(cc: &mut dyn ConfidentialCompute, value: i128) -> Self {
        let sign = cc.encrypt_bool(value >= 0);
        let magnitude = cc.encrypt(value.unsigned_abs());
        Self { sign, magnitude }
    }

    pub fn negate(self, cc: &mut dyn ConfidentialCompute) -> Self {
        Self {
            sign: cc.not(self.sign),
            magnitude: self.magnitude,
        }
    }

    pub fn add(self, cc: &mut dyn ConfidentialCompute, other: Self) -> Self {
        let sum = cc.add(self.magnitude, other.magnitude);
        let a_ge_b = cc.ge(self.magnitude, other.magnitude);

        let hi = cc.select(a_ge_b, self.magnitude, other.magnitude);
        let lo = cc.select(a_ge_b, other.magnitude, self.magnitude);
        let diff = cc.sub(hi, lo);

        let same_sign = cc.bool_eq(self.sign, other.sign);
        let magnitude = cc.select(same_sign, sum, diff);

        let larger_sign = cc.select_bool(a_ge_b, self.sign, other.sign);
        let sign = cc.select_bool(same_sign, self.sign, larger_sign);

        Self { sign, magnitude }
    }

    pub fn sub(self, cc: &mut dyn ConfidentialCompute, other: Self) -> Self {
        let negated = other.negate(cc);
        self.add(cc, negated)
    }

    pub fn select(cc: &mut dyn ConfidentialCompute, cond: Ebool, if_true: Self, if_false: Self) -> Self {
        Self {
            sign: cc.select_bool(cond, if_true.sign, if_false.sign),
            magnitude: cc.select(cond, if_true.magnitude, if_false.magnitude),
        }
    }

    /// magnitude * mul / div, sign unchanged.
    pub fn mul_div(self, cc: &mut dyn ConfidentialCompute, mul: Euint, div: Euint) -> Self {
        let scaled = cc.mul(self.magnitude, mul);
        Self {
            sign: self.sign,
            magnitude: cc.div(scaled, div),
        }
    }

    pub fn mul_div_plain(self, cc: &mut dyn ConfidentialCompute, mul: u128, div: u128) -> Self {
        Self {
            sign: self.sign,
            magnitude: cc.mul_div_plain(self.magnitude, mul, div),
        }
    }

    /// max(0, self). negative values become zero.
    pub fn clamp_to_zero(self, cc: &mut dyn ConfidentialCompute) -> Euint {
        let zero = cc.encrypt(0);
        cc.select(self.sign, self.magnitude, zero)
    }

    pub fn is_negative(self, cc: &mut dyn ConfidentialCompute) -> Ebool {
        cc.not(self.sign)
    }

    /// Strictly below a non-negative threshold. any negative value is below.
    pub fn lt_unsigned(self, cc: &mut dyn ConfidentialCompute, threshold: Euint) -> Ebool {
        let below = cc.gt(threshold, self.magnitude);
        let t = cc.encrypt_bool(true);
        cc.select_bool(self.sign, below, t)
    }
}
