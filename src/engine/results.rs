// 8.0.2: result types and errors for engine operations.

use crate::config::ConfigError;
use crate::custody::CustodyError;
use crate::ledger::LedgerError;
use crate::liquidity::VaultError;
use crate::position::{CloseCause, PositionStatus};
use crate::settlement::SettlementError;
use crate::types::{PositionId, Price, Quote, TraderId};
use rust_decimal::Decimal;

/// What a sweep did to one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// a reveal is still in flight
    Waiting,
    /// removed or terminal, nothing to do
    Idle,
    /// request valid, first entry-range check issued
    Accepted,
    /// request invalid, collateral refunded
    Rejected { refund: Quote },
    /// price was outside the band, checked again at the latest price
    RangeCheckRetried { attempt: u32 },
    /// too many failed range checks, collateral refunded
    Expired { refund: Quote },
    Filled { price: Price },
    /// not liquidatable, a fresh check was issued
    LiquidationCheckIssued,
    SettlementStarted { cause: CloseCause },
    Settled { status: PositionStatus, payout: Quote },
}

impl Transition {
    /// True when the position moved or a new reveal was issued.
    pub fn is_progress(&self) -> bool {
        !matches!(self, Transition::Waiting | Transition::Idle)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub transitions: Vec<(PositionId, Transition)>,
}

impl SweepReport {
    pub fn get(&self, id: PositionId) -> Option<Transition> {
        self.transitions
            .iter()
            .find(|(pid, _)| *pid == id)
            .map(|(_, t)| *t)
    }

    pub fn progressed(&self) -> usize {
        self.transitions.iter().filter(|(_, t)| t.is_progress()).count()
    }

    pub fn waiting(&self) -> usize {
        self.transitions
            .iter()
            .filter(|(_, t)| matches!(t, Transition::Waiting))
            .count()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Collateral must be positive, got {0}")]
    InvalidCollateral(Quote),

    #[error("Position {0} not found")]
    PositionNotFound(PositionId),

    #[error("Position {position_id} is not owned by {caller}")]
    NotOwner { position_id: PositionId, caller: TraderId },

    #[error("Position {position_id} is {status}, operation needs an open position")]
    InvalidState { position_id: PositionId, status: PositionStatus },

    #[error("Close already requested for position {0}")]
    CloseAlreadyRequested(PositionId),

    #[error("Oracle price unusable: price {price}, valid {valid}")]
    InvalidOraclePrice { price: Decimal, valid: bool },

    #[error("Pool insolvent settling {position_id}: payout {payout}, available {available}")]
    PoolInsolvent {
        position_id: PositionId,
        payout: Quote,
        available: Quote,
    },

    #[error("Position {0} has a pending range check without a check price")]
    MissingRangeCheckPrice(PositionId),

    #[error("Custody error: {0}")]
    Custody(#[from] CustodyError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),
}
