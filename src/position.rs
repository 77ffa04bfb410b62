// 4.0: the position record. direction and size stay confidential for the whole life
// of the position; collateral and the settlement price are plaintext.
// 4.1 has the lifecycle enums, 4.2 the per-concern reveal latches.

use crate::confidential::{Ebool, Euint};
use crate::signed::SignedValue;
use crate::types::{PositionId, Price, Quote, Timestamp, TraderId};
use serde::{Deserialize, Serialize};
use std::fmt;

// 4.1: Requested -> Pending -> Open -> AwaitingSettlement -> {Liquidated | Closed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Requested,
    Pending,
    Open,
    AwaitingSettlement,
    Liquidated,
    Closed,
}

impl PositionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PositionStatus::Liquidated | PositionStatus::Closed)
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PositionStatus::Requested => "requested",
            PositionStatus::Pending => "pending",
            PositionStatus::Open => "open",
            PositionStatus::AwaitingSettlement => "awaiting_settlement",
            PositionStatus::Liquidated => "liquidated",
            PositionStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseCause {
    Close,
    Liquidation,
}

impl CloseCause {
    pub fn terminal_status(&self) -> PositionStatus {
        match self {
            CloseCause::Close => PositionStatus::Closed,
            CloseCause::Liquidation => PositionStatus::Liquidated,
        }
    }
}

/// Acceptable fill band, checked against the oracle at fill time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRange {
    pub low: Euint,
    pub high: Euint,
}

/// Confidential validity flags plus the plaintext `removed` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validity {
    pub request_valid: Ebool,
    pub price_in_range: Ebool,
    pub to_be_liquidated: Ebool,
    pub removed: bool,
}

// 4.2: one latch per outstanding reveal. a set latch blocks re-issuing that request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealLatches {
    pub request_valid: bool,
    pub price_in_range: bool,
    pub to_be_liquidated: bool,
    pub equity: bool,
}

impl RevealLatches {
    pub fn outstanding(&self) -> usize {
        [
            self.request_valid,
            self.price_in_range,
            self.to_be_liquidated,
            self.equity,
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub owner: TraderId,
    /// true = long
    pub direction: Ebool,
    /// notional, 6-decimal fixed point
    pub size: Euint,
    pub collateral: Quote,
    pub entry_range: EntryRange,
    pub entry_price: Euint,
    pub entry_funding: SignedValue,
    pub entry_impact: SignedValue,
    pub settlement_price: Option<Price>,
    pub status: PositionStatus,
    pub close_cause: Option<CloseCause>,
    pub validity: Validity,
    pub pending_equity: Euint,
    pub latches: RevealLatches,
    /// plaintext price the outstanding range check was evaluated against
    pub range_check_price: Option<Price>,
    pub range_checks: u32,
    pub close_requested: bool,
    pub payout: Option<Quote>,
    pub requested_at: Timestamp,
    pub filled_at: Option<Timestamp>,
    pub settled_at: Option<Timestamp>,
}

impl Position {
    pub fn is_removed(&self) -> bool {
        self.validity.removed
    }

    /// Removed requests and terminal statuses are never touched again.
    pub fn is_finished(&self) -> bool {
        self.validity.removed || self.status.is_terminal()
    }

    pub fn is_live(&self) -> bool {
        !self.is_finished()
    }
}
