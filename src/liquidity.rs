// 11.0 liquidity.rs: the LP pool as the exchange sees it. share minting and burning live
// outside the core; here is only the liquidity number and how settlements move it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::Quote;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("Insufficient pool liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: Quote, available: Quote },

    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Quote),
}

/// Net effect of one finalized settlement on the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolAdjustment {
    /// collateral released from escrow into the pool
    pub collateral_in: Quote,
    /// net payout sent to the trader
    pub payout_out: Quote,
    /// fee retained by the pool (already inside `collateral_in - payout_out`)
    pub fee: Quote,
}

impl PoolAdjustment {
    /// collateral_in - payout_out. negative when the trader won.
    pub fn net_change(&self) -> Decimal {
        self.collateral_in.value() - self.payout_out.value()
    }
}

// Trait the exchange uses for the LP vault.
pub trait LiquidityVault {
    fn pool_liquidity(&self) -> Quote;

    fn deposit(&mut self, amount: Quote) -> Result<(), VaultError>;

    /// Apply a settlement. Fails without change if the payout is not covered.
    fn apply(&mut self, adjustment: PoolAdjustment) -> Result<(), VaultError>;

    fn fees_collected(&self) -> Quote;
}

// A simple shared liquidity pool, GLP style: LPs deposit, traders settle against it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedPool {
    liquidity: Decimal,
    accumulated_fees: Decimal,
    total_paid_out: Decimal,
    total_collateral_in: Decimal,
}

impl SharedPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_liquidity(amount: Quote) -> Self {
        Self {
            liquidity: amount.value(),
            ..Self::default()
        }
    }

    pub fn total_paid_out(&self) -> Quote {
        Quote::new(self.total_paid_out)
    }

    pub fn total_collateral_in(&self) -> Quote {
        Quote::new(self.total_collateral_in)
    }
}

impl LiquidityVault for SharedPool {
    fn pool_liquidity(&self) -> Quote {
        Quote::new(self.liquidity)
    }

    fn deposit(&mut self, amount: Quote) -> Result<(), VaultError> {
        if amount.is_negative() || amount.is_zero() {
            return Err(VaultError::InvalidAmount(amount));
        }
        self.liquidity += amount.value();
        debug!(amount = %amount, liquidity = %self.liquidity, "Pool: deposit");
        Ok(())
    }

    fn apply(&mut self, adjustment: PoolAdjustment) -> Result<(), VaultError> {
        let after = self.liquidity + adjustment.net_change();
        if after < Decimal::ZERO {
            return Err(VaultError::InsufficientLiquidity {
                requested: adjustment.payout_out,
                available: Quote::new(self.liquidity + adjustment.collateral_in.value()),
            });
        }
        self.liquidity = after;
        self.accumulated_fees += adjustment.fee.value();
        self.total_paid_out += adjustment.payout_out.value();
        self.total_collateral_in += adjustment.collateral_in.value();
        Ok(())
    }

    fn fees_collected(&self) -> Quote {
        Quote::new(self.accumulated_fees)
    }
}
