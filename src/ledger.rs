//! Position ledger.
//!
//! Single owner of the position records and the open-interest aggregates.
//! OI moves exactly twice per position: up by its notional at fill, down
//! by the same notional at settlement, on the side its confidential
//! direction selects. Ids are append-only and never reused.
//!
//! Accepted requests that have not filled yet hold a reservation on their
//! side. The per-side cap is checked against OI plus reservations, so
//! requests in flight together cannot fill past it.

use crate::confidential::{ConfidentialCompute, ConfidentialExt, Ebool, Euint};
use crate::position::Position;
use crate::types::{PositionId, Quote};
use std::collections::BTreeMap;

/// Snapshot of the confidential OI aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenInterest {
    pub long: Euint,
    pub short: Euint,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Escrow shortfall: releasing {requested} with {escrowed} escrowed")]
    EscrowShortfall { requested: Quote, escrowed: Quote },
}

#[derive(Debug, Clone)]
pub struct PositionStore {
    positions: BTreeMap<PositionId, Position>,
    next_id: u64,
    long_oi: Euint,
    short_oi: Euint,
    reserved: OpenInterest,
    escrowed_collateral: Quote,
}

impl PositionStore {
    pub fn new(cc: &mut dyn ConfidentialCompute) -> Self {
        Self {
            positions: BTreeMap::new(),
            next_id: 1,
            long_oi: cc.encrypt(0),
            short_oi: cc.encrypt(0),
            reserved: OpenInterest {
                long: cc.encrypt(0),
                short: cc.encrypt(0),
            },
            escrowed_collateral: Quote::zero(),
        }
    }

    pub fn allocate_id(&mut self) -> PositionId {
        let id = PositionId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, position: Position) {
        debug_assert!(!self.positions.contains_key(&position.id));
        self.positions.insert(position.id, position);
    }

    /// Write back a modified copy of an existing record.
    pub fn update(&mut self, position: Position) {
        debug_assert!(self.positions.contains_key(&position.id));
        self.positions.insert(position.id, position);
    }

    pub fn get(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(&id)
    }

    pub fn get_mut(&mut self, id: PositionId) -> Option<&mut Position> {
        self.positions.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn live_ids(&self) -> Vec<PositionId> {
        self.positions
            .values()
            .filter(|p| p.is_live())
            .map(|p| p.id)
            .collect()
    }

    pub fn open_interest(&self) -> OpenInterest {
        OpenInterest {
            long: self.long_oi,
            short: self.short_oi,
        }
    }

    /// OI on the side the confidential direction selects.
    pub fn side_open_interest(&self, cc: &mut dyn ConfidentialCompute, direction: Ebool) -> Euint {
        cc.select(direction, self.long_oi, self.short_oi)
    }

    /// Filled OI plus reservations on the selected side: what a new
    /// request is capped against.
    pub fn side_commitment(&self, cc: &mut dyn ConfidentialCompute, direction: Ebool) -> Euint {
        let filled = self.side_open_interest(cc, direction);
        let reserved = cc.select(direction, self.reserved.long, self.reserved.short);
        cc.add(filled, reserved)
    }

    pub fn reserved_interest(&self) -> OpenInterest {
        self.reserved
    }

    /// `amount` is zero for a request that will be rejected.
    pub fn reserve(&mut self, cc: &mut dyn ConfidentialCompute, direction: Ebool, amount: Euint) {
        let (long_delta, short_delta) = split_by_side(cc, direction, amount);
        self.reserved.long = cc.add(self.reserved.long, long_delta);
        self.reserved.short = cc.add(self.reserved.short, short_delta);
    }

    /// Drops an accepted request's reservation, at fill or at expiry.
    pub fn release_reservation(&mut self, cc: &mut dyn ConfidentialCompute, direction: Ebool, size: Euint) {
        let (long_delta, short_delta) = split_by_side(cc, direction, size);
        self.reserved.long = cc.sub(self.reserved.long, long_delta);
        self.reserved.short = cc.sub(self.reserved.short, short_delta);
    }

    pub fn increase_open_interest(&mut self, cc: &mut dyn ConfidentialCompute, direction: Ebool, size: Euint) {
        let (long_delta, short_delta) = split_by_side(cc, direction, size);
        self.long_oi = cc.add(self.long_oi, long_delta);
        self.short_oi = cc.add(self.short_oi, short_delta);
    }

    /// Only ever called with the exact notional added at fill, so the
    /// subtraction cannot go below zero.
    pub fn decrease_open_interest(&mut self, cc: &mut dyn ConfidentialCompute, direction: Ebool, size: Euint) {
        let (long_delta, short_delta) = split_by_side(cc, direction, size);
        self.long_oi = cc.sub(self.long_oi, long_delta);
        self.short_oi = cc.sub(self.short_oi, short_delta);
    }

    pub fn escrowed_collateral(&self) -> Quote {
        self.escrowed_collateral
    }

    pub fn escrow_collateral(&mut self, amount: Quote) {
        self.escrowed_collateral = self.escrowed_collateral.add(amount);
    }

    pub fn release_collateral(&mut self, amount: Quote) -> Result<(), LedgerError> {
        if amount > self.escrowed_collateral {
            return Err(LedgerError::EscrowShortfall {
                requested: amount,
                escrowed: self.escrowed_collateral,
            });
        }
        self.escrowed_collateral = self.escrowed_collateral.sub(amount);
        Ok(())
    }
}

// (long share, short share) of a size; the other side gets zero
fn split_by_side(cc: &mut dyn ConfidentialCompute, direction: Ebool, size: Euint) -> (Euint, Euint) {
    let zero = cc.constant(0);
    let long_delta = cc.select(direction, size, zero);
    let short_delta = cc.select(direction, zero, size);
    (long_delta, short_delta)
}
