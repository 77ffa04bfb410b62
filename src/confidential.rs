//! Confidential computation capability.
//!
//! The core never sees plaintext for confidential values. It holds opaque
//! handles (`Euint`, `Ebool`) and asks a backend to combine them. The only
//! way back to plaintext is the two-phase reveal: `request_reveal` now,
//! `poll_reveal` on some later call. A poll that is not ready is normal.
//!
//! `Ebool` deliberately has no conversion to `bool`. Every conditional over
//! confidential data goes through `select`.
//!
//! `InMemoryCompute` is MOCKED: plaintext kept in maps, reveals delivered by
//! an explicit off-core step. Production would sit on an FHE or MPC network.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{error, warn};

/// Opaque handle to a confidential unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Euint(u64);

/// Opaque handle to a confidential boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ebool(u64);

/// Result of polling a reveal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reveal<T> {
    Pending,
    Ready(T),
}

impl<T> Reveal<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Reveal::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Reveal::Ready(v) => Some(v),
            Reveal::Pending => None,
        }
    }
}

/// The primitive operations the settlement core consumes.
///
/// Arithmetic is over non-negative integers only. `sub(a, b)` with `b > a`
/// has no meaningful result; callers must order operands first.
pub trait ConfidentialCompute {
    fn encrypt(&mut self, value: u128) -> Euint;
    fn encrypt_bool(&mut self, value: bool) -> Ebool;

    fn add(&mut self, a: Euint, b: Euint) -> Euint;
    fn sub(&mut self, a: Euint, b: Euint) -> Euint;
    fn mul(&mut self, a: Euint, b: Euint) -> Euint;
    /// Truncating division.
    fn div(&mut self, a: Euint, b: Euint) -> Euint;

    fn ge(&mut self, a: Euint, b: Euint) -> Ebool;
    fn gt(&mut self, a: Euint, b: Euint) -> Ebool;

    fn select(&mut self, cond: Ebool, if_true: Euint, if_false: Euint) -> Euint;
    fn select_bool(&mut self, cond: Ebool, if_true: Ebool, if_false: Ebool) -> Ebool;

    /// Fire-and-forget.
    fn request_reveal(&mut self, value: Euint);
    fn request_reveal_bool(&mut self, value: Ebool);

    fn poll_reveal(&self, value: Euint) -> Reveal<u128>;
    fn poll_reveal_bool(&self, value: Ebool) -> Reveal<bool>;
}

/// Derived combinators, built only from `select`, `select_bool` and `ge`.
pub trait ConfidentialExt: ConfidentialCompute {
    fn constant(&mut self, value: u128) -> Euint {
        self.encrypt(value)
    }

    fn not(&mut self, a: Ebool) -> Ebool {
        let t = self.encrypt_bool(true);
        let f = self.encrypt_bool(false);
        self.select_bool(a, f, t)
    }

    fn and(&mut self, a: Ebool, b: Ebool) -> Ebool {
        let f = self.encrypt_bool(false);
        self.select_bool(a, b, f)
    }

    fn or(&mut self, a: Ebool, b: Ebool) -> Ebool {
        let t = self.encrypt_bool(true);
        self.select_bool(a, t, b)
    }

    fn bool_eq(&mut self, a: Ebool, b: Ebool) -> Ebool {
        let not_b = self.not(b);
        self.select_bool(a, b, not_b)
    }

    fn le(&mut self, a: Euint, b: Euint) -> Ebool {
        self.ge(b, a)
    }

    fn max(&mut self, a: Euint, b: Euint) -> Euint {
        let a_ge_b = self.ge(a, b);
        self.select(a_ge_b, a, b)
    }

    fn min(&mut self, a: Euint, b: Euint) -> Euint {
        let a_ge_b = self.ge(a, b);
        self.select(a_ge_b, b, a)
    }

    /// |a - b| as max minus min. never subtracts the larger operand.
    fn abs_diff(&mut self, a: Euint, b: Euint) -> Euint {
        let a_ge_b = self.ge(a, b);
        let hi = self.select(a_ge_b, a, b);
        let lo = self.select(a_ge_b, b, a);
        self.sub(hi, lo)
    }

    /// a * mul / div, with plaintext factors encrypted trivially.
    fn mul_div_plain(&mut self, a: Euint, mul: u128, div: u128) -> Euint {
        let m = self.encrypt(mul);
        let d = self.encrypt(div);
        let scaled = self.mul(a, m);
        self.div(scaled, d)
    }
}

impl<T: ConfidentialCompute + ?Sized> ConfidentialExt for T {}

/// Deterministic in-memory backend.
///
/// Arithmetic wraps like on-chain ciphertexts do, with a warning so tests
/// notice. Division by zero yields `u128::MAX`. Requested reveals sit in a
/// FIFO queue until `deliver_reveals` or `deliver_next` runs.
#[derive(Debug, Default)]
pub struct InMemoryCompute {
    uints: HashMap<u64, u128>,
    bools: HashMap<u64, bool>,
    next_handle: u64,
    queue: VecDeque<RevealTarget>,
    queued: HashSet<RevealTarget>,
    revealed: HashSet<RevealTarget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RevealTarget {
    Uint(u64),
    Bool(u64),
}

impl InMemoryCompute {
    pub fn new() -> Self {
        Self::default()
    }

    /// The off-core decryption step: resolves every queued reveal.
    pub fn deliver_reveals(&mut self) -> usize {
        let count = self.queue.len();
        self.deliver_next(count)
    }

    /// Resolves up to `n` queued reveals in request order.
    pub fn deliver_next(&mut self, n: usize) -> usize {
        let mut delivered = 0;
        while delivered < n {
            let Some(target) = self.queue.pop_front() else {
                break;
            };
            self.queued.remove(&target);
            self.revealed.insert(target);
            delivered += 1;
        }
        delivered
    }

    pub fn pending_reveals(&self) -> usize {
        self.queue.len()
    }

    /// Test introspection. not part of the capability.
    pub fn peek(&self, value: Euint) -> u128 {
        self.uint(value)
    }

    pub fn peek_bool(&self, value: Ebool) -> bool {
        self.boolean(value)
    }

    pub fn peek_signed(&self, value: crate::signed::SignedValue) -> i128 {
        let magnitude = self.uint(value.magnitude) as i128;
        if self.boolean(value.sign) {
            magnitude
        } else {
            -magnitude
        }
    }

    fn alloc(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn store(&mut self, value: u128) -> Euint {
        let id = self.alloc();
        self.uints.insert(id, value);
        Euint(id)
    }

    fn store_bool(&mut self, value: bool) -> Ebool {
        let id = self.alloc();
        self.bools.insert(id, value);
        Ebool(id)
    }

    fn uint(&self, handle: Euint) -> u128 {
        match self.uints.get(&handle.0) {
            Some(v) => *v,
            None => {
                error!(handle = handle.0, "unknown confidential uint handle");
                0
            }
        }
    }

    fn boolean(&self, handle: Ebool) -> bool {
        match self.bools.get(&handle.0) {
            Some(v) => *v,
            None => {
                error!(handle = handle.0, "unknown confidential bool handle");
                false
            }
        }
    }

    fn enqueue(&mut self, target: RevealTarget) {
        if self.revealed.contains(&target) {
            return;
        }
        if self.queued.insert(target) {
            self.queue.push_back(target);
        }
    }
}

impl ConfidentialCompute for InMemoryCompute {
    fn encrypt(&mut self, value: u128) -> Euint {
        self.store(value)
    }

    fn encrypt_bool(&mut self, value: bool) -> Ebool {
        self.store_bool(value)
    }

    fn add(&mut self, a: Euint, b: Euint) -> Euint {
        let (x, y) = (self.uint(a), self.uint(b));
        let (sum, overflow) = x.overflowing_add(y);
        if overflow {
            warn!(lhs = x, rhs = y, "confidential add wrapped");
        }
        self.store(sum)
    }

    fn sub(&mut self, a: Euint, b: Euint) -> Euint {
        let (x, y) = (self.uint(a), self.uint(b));
        let (diff, underflow) = x.overflowing_sub(y);
        if underflow {
            warn!(lhs = x, rhs = y, "confidential sub wrapped");
        }
        self.store(diff)
    }

    fn mul(&mut self, a: Euint, b: Euint) -> Euint {
        let (x, y) = (self.uint(a), self.uint(b));
        let (product, overflow) = x.overflowing_mul(y);
        if overflow {
            warn!(lhs = x, rhs = y, "confidential mul wrapped");
        }
        self.store(product)
    }

    fn div(&mut self, a: Euint, b: Euint) -> Euint {
        let (x, y) = (self.uint(a), self.uint(b));
        let quotient = x.checked_div(y).unwrap_or(u128::MAX);
        self.store(quotient)
    }

    fn ge(&mut self, a: Euint, b: Euint) -> Ebool {
        let result = self.uint(a) >= self.uint(b);
        self.store_bool(result)
    }

    fn gt(&mut self, a: Euint, b: Euint) -> Ebool {
        let result = self.uint(a) > self.uint(b);
        self.store_bool(result)
    }

    fn select(&mut self, cond: Ebool, if_true: Euint, if_false: Euint) -> Euint {
        let chosen = if self.boolean(cond) { if_true } else { if_false };
        let value = self.uint(chosen);
        self.store(value)
    }

    fn select_bool(&mut self, cond: Ebool, if_true: Ebool, if_false: Ebool) -> Ebool {
        let chosen = if self.boolean(cond) { if_true } else { if_false };
        let value = self.boolean(chosen);
        self.store_bool(value)
    }

    fn request_reveal(&mut self, value: Euint) {
        self.enqueue(RevealTarget::Uint(value.0));
    }

    fn request_reveal_bool(&mut self, value: Ebool) {
        self.enqueue(RevealTarget::Bool(value.0));
    }

    fn poll_reveal(&self, value: Euint) -> Reveal<u128> {
        if self.revealed.contains(&RevealTarget::Uint(value.0)) {
            Reveal::Ready(self.uint(value))
        } else {
            Reveal::Pending
        }
    }

    fn poll_reveal_bool(&self, value: Ebool) -> Reveal<bool> {
        if self.revealed.contains(&RevealTarget::Bool(value.0)) {
            Reveal::Ready(self.boolean(value))
        } else {
            Reveal::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_combinators_truth_table() {
        let mut cc = InMemoryCompute::new();
        for a in [false, true] {
            for b in [false, true] {
                let ea = cc.encrypt_bool(a);
                let eb = cc.encrypt_bool(b);
                let not_a = cc.not(ea);
                let and = cc.and(ea, eb);
                let or = cc.or(ea, eb);
                let eq = cc.bool_eq(ea, eb);
                assert_eq!(cc.peek_bool(not_a), !a);
                assert_eq!(cc.peek_bool(and), a && b);
                assert_eq!(cc.peek_bool(or), a || b);
                assert_eq!(cc.peek_bool(eq), a == b);
            }
        }
    }

    #[test]
    fn abs_diff_orders_operands() {
        let mut cc = InMemoryCompute::new();
        let a = cc.encrypt(3);
        let b = cc.encrypt(10);
        let d1 = cc.abs_diff(a, b);
        let d2 = cc.abs_diff(b, a);
        assert_eq!(cc.peek(d1), 7);
        assert_eq!(cc.peek(d2), 7);
        let hi = cc.max(a, b);
        let lo = cc.min(a, b);
        assert_eq!((cc.peek(hi), cc.peek(lo)), (10, 3));
    }

    #[test]
    fn division_truncates_and_zero_divisor_saturates() {
        let mut cc = InMemoryCompute::new();
        let seven = cc.encrypt(7);
        let two = cc.encrypt(2);
        let zero = cc.encrypt(0);
        let q = cc.div(seven, two);
        let z = cc.div(seven, zero);
        assert_eq!(cc.peek(q), 3);
        assert_eq!(cc.peek(z), u128::MAX);
    }

    #[test]
    fn reveal_requires_off_core_step() {
        let mut cc = InMemoryCompute::new();
        let v = cc.encrypt(42);
        assert_eq!(cc.poll_reveal(v), Reveal::Pending);

        cc.request_reveal(v);
        cc.request_reveal(v); // duplicate request queues once
        assert_eq!(cc.pending_reveals(), 1);
        assert_eq!(cc.poll_reveal(v), Reveal::Pending);

        cc.deliver_reveals();
        assert_eq!(cc.poll_reveal(v), Reveal::Ready(42));
        assert_eq!(cc.pending_reveals(), 0);
    }

    #[test]
    fn partial_delivery_is_fifo() {
        let mut cc = InMemoryCompute::new();
        let first = cc.encrypt_bool(true);
        let second = cc.encrypt_bool(false);
        cc.request_reveal_bool(first);
        cc.request_reveal_bool(second);

        assert_eq!(cc.deliver_next(1), 1);
        assert_eq!(cc.poll_reveal_bool(first), Reveal::Ready(true));
        assert_eq!(cc.poll_reveal_bool(second), Reveal::Pending);
    }
}
