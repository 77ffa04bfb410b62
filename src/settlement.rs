// 9.0 settlement.rs: closing a position. 9.1 computes and reveals net equity, 9.2 turns the
// revealed equity into a payout, 9.3 batches the resulting transfers so a sweep commits
// them all at once or not at all.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::config::FeeConfig;
use crate::confidential::{ConfidentialCompute, Euint, Reveal};
use crate::margin::{collateral_value, price_pnl};
use crate::position::{CloseCause, Position, PositionStatus};
use crate::signed::SignedValue;
use crate::types::{Bps, PositionId, Price, Quote, Timestamp, TraderId};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SettlementError {
    #[error("Position {0} is awaiting settlement without a close cause")]
    MissingCloseCause(PositionId),

    #[error("Revealed equity {0} does not fit a quote amount")]
    EquityOutOfRange(u128),
}

/// Plaintext result of a finalized settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub gross: Quote,
    pub fee: Quote,
    pub net: Quote,
}

#[derive(Debug, Clone)]
pub struct SettlementEngine {
    close_fee: Bps,
    liquidation_fee: Bps,
}

impl SettlementEngine {
    pub fn new(fees: &FeeConfig) -> Self {
        Self {
            close_fee: fees.close_fee_bps,
            liquidation_fee: fees.liquidation_fee_bps,
        }
    }

    pub fn fee_rate(&self, cause: CloseCause) -> Bps {
        match cause {
            CloseCause::Close => self.close_fee,
            CloseCause::Liquidation => self.liquidation_fee,
        }
    }

    // 9.1: collateral + pnl + funding + entry impact + exit impact, floored at zero
    pub fn settlement_equity(
        &self,
        cc: &mut dyn ConfidentialCompute,
        position: &Position,
        mark: Price,
        funding_pnl: SignedValue,
        exit_impact: SignedValue,
    ) -> Euint {
        let collateral = collateral_value(cc, position.collateral);
        let pnl = price_pnl(cc, position.direction, position.size, position.entry_price, mark);
        let equity = collateral.add(cc, pnl);
        let equity = equity.add(cc, funding_pnl);
        let equity = equity.add(cc, position.entry_impact);
        let equity = equity.add(cc, exit_impact);
        equity.clamp_to_zero(cc)
    }

    /// Stores the pending equity, requests its reveal and moves the position
    /// to AwaitingSettlement. The caller has already accrued funding.
    pub fn begin_settlement(
        &self,
        cc: &mut dyn ConfidentialCompute,
        position: &mut Position,
        equity: Euint,
        price: Price,
        cause: CloseCause,
    ) {
        position.pending_equity = equity;
        cc.request_reveal(equity);
        position.latches.equity = true;
        position.settlement_price = Some(price);
        position.close_cause = Some(cause);
        position.status = PositionStatus::AwaitingSettlement;
        debug!(position_id = %position.id, price = %price, cause = ?cause, "Settlement: equity reveal requested");
    }

    // 9.2: Pending until the equity reveal lands
    pub fn poll_payout(
        &self,
        cc: &dyn ConfidentialCompute,
        position: &Position,
    ) -> Result<Reveal<Payout>, SettlementError> {
        let cause = position
            .close_cause
            .ok_or(SettlementError::MissingCloseCause(position.id))?;
        match cc.poll_reveal(position.pending_equity) {
            Reveal::Pending => Ok(Reveal::Pending),
            Reveal::Ready(equity) => self.payout(equity, cause).map(Reveal::Ready),
        }
    }

    /// gross = equity / SCALE, fee = gross * bps / 10000, net = max(0, gross - fee)
    pub fn payout(&self, equity: u128, cause: CloseCause) -> Result<Payout, SettlementError> {
        let fee_fixed = self.fee_rate(cause).apply_fixed(equity);
        let net_fixed = equity.saturating_sub(fee_fixed);

        let gross = Quote::from_fixed(equity).ok_or(SettlementError::EquityOutOfRange(equity))?;
        let fee = Quote::from_fixed(fee_fixed).ok_or(SettlementError::EquityOutOfRange(equity))?;
        let net = Quote::from_fixed(net_fixed).ok_or(SettlementError::EquityOutOfRange(equity))?;
        Ok(Payout { gross, fee, net })
    }

    /// Terminal bookkeeping once the payout has been funded.
    pub fn complete(&self, position: &mut Position, payout: Payout, now: Timestamp) -> PositionStatus {
        let status = position
            .close_cause
            .map(|cause| cause.terminal_status())
            .unwrap_or(PositionStatus::Closed);
        position.latches.equity = false;
        position.payout = Some(payout.net);
        position.settled_at = Some(now);
        position.status = status;
        status
    }
}

// 9.3: where value sits in the settlement asset ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAccount {
    Trader(TraderId),
    /// collateral held for live positions
    Escrow,
    /// LP pool liquidity
    Pool,
}

pub type BatchId = u64;

// Why a transfer is happening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferReason {
    Refund,
    CollateralRelease,
    Payout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementInstruction {
    pub position_id: PositionId,
    pub from: LedgerAccount,
    pub to: LedgerAccount,
    pub amount: Quote,
    pub reason: TransferReason,
}

impl SettlementInstruction {
    pub fn refund(position_id: PositionId, trader: TraderId, amount: Quote) -> Self {
        Self {
            position_id,
            from: LedgerAccount::Escrow,
            to: LedgerAccount::Trader(trader),
            amount,
            reason: TransferReason::Refund,
        }
    }

    pub fn release_collateral(position_id: PositionId, amount: Quote) -> Self {
        Self {
            position_id,
            from: LedgerAccount::Escrow,
            to: LedgerAccount::Pool,
            amount,
            reason: TransferReason::CollateralRelease,
        }
    }

    pub fn payout(position_id: PositionId, trader: TraderId, amount: Quote) -> Self {
        Self {
            position_id,
            from: LedgerAccount::Pool,
            to: LedgerAccount::Trader(trader),
            amount,
            reason: TransferReason::Payout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Committed,
    Failed,
}

// A batch of transfers executed atomically
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementBatch {
    pub batch_id: BatchId,
    pub instructions: Vec<SettlementInstruction>,
    pub status: BatchStatus,
    pub created_at: Timestamp,
    pub processed_at: Option<Timestamp>,
}

impl SettlementBatch {
    pub fn new(batch_id: BatchId, created_at: Timestamp) -> Self {
        Self {
            batch_id,
            instructions: Vec::new(),
            status: BatchStatus::Pending,
            created_at,
            processed_at: None,
        }
    }

    pub fn add(&mut self, instruction: SettlementInstruction) {
        // zero transfers carry no information
        if instruction.amount.is_zero() {
            return;
        }
        self.instructions.push(instruction);
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    pub fn total(&self, reason: TransferReason) -> Quote {
        self.instructions
            .iter()
            .filter(|i| i.reason == reason)
            .map(|i| i.amount)
            .sum()
    }

    // Net flow per account, for validation before execution
    pub fn net_flows(&self) -> HashMap<LedgerAccount, Decimal> {
        let mut flows = HashMap::new();
        for instruction in &self.instructions {
            *flows.entry(instruction.from).or_insert(Decimal::ZERO) -= instruction.amount.value();
            *flows.entry(instruction.to).or_insert(Decimal::ZERO) += instruction.amount.value();
        }
        flows
    }

    pub fn mark_committed(&mut self, now: Timestamp) {
        self.status = BatchStatus::Committed;
        self.processed_at = Some(now);
    }

    pub fn mark_failed(&mut self) {
        self.status = BatchStatus::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidential::{ConfidentialExt, InMemoryCompute};
    use crate::position::{EntryRange, RevealLatches, Validity};
    use rust_decimal_macros::dec;

    fn engine() -> SettlementEngine {
        SettlementEngine::new(&FeeConfig::default())
    }

    fn open_long(cc: &mut InMemoryCompute, size: u128, collateral: Decimal) -> Position {
        let yes = cc.encrypt_bool(true);
        let no = cc.encrypt_bool(false);
        Position {
            id: PositionId(7),
            owner: TraderId(3),
            direction: yes,
            size: cc.encrypt(size),
            collateral: Quote::new(collateral),
            entry_range: EntryRange {
                low: cc.encrypt(1),
                high: cc.encrypt(u128::MAX),
            },
            entry_price: cc.encrypt(2_000_000_000),
            entry_funding: SignedValue::zero(cc),
            entry_impact: SignedValue::zero(cc),
            settlement_price: None,
            status: PositionStatus::Open,
            close_cause: None,
            validity: Validity {
                request_valid: yes,
                price_in_range: yes,
                to_be_liquidated: no,
                removed: false,
            },
            pending_equity: cc.encrypt(0),
            latches: RevealLatches::default(),
            range_check_price: Some(Price::new_unchecked(dec!(2000))),
            range_checks: 1,
            close_requested: false,
            payout: None,
            requested_at: Timestamp::from_secs(0),
            filled_at: Some(Timestamp::from_secs(0)),
            settled_at: None,
        }
    }

    #[test]
    fn equity_includes_both_impacts() {
        let mut cc = InMemoryCompute::new();
        let s = engine();
        let mut pos = open_long(&mut cc, 30_000_000_000, dec!(10_000));
        pos.entry_impact = SignedValue::from_plain(&mut cc, -4_500_000);
        let funding = SignedValue::from_plain(&mut cc, -30_000_000);
        let exit = SignedValue::from_plain(&mut cc, 4_500_000);

        // 10000 + 1500 - 30 - 4.5 + 4.5
        let equity = s.settlement_equity(&mut cc, &pos, Price::new_unchecked(dec!(2100)), funding, exit);
        assert_eq!(cc.peek(equity), 11_470_000_000);
    }

    #[test]
    fn equity_clamps_to_zero() {
        let mut cc = InMemoryCompute::new();
        let s = engine();
        let pos = open_long(&mut cc, 30_000_000_000, dec!(1_000));
        let zero = SignedValue::zero(&mut cc);
        let equity = s.settlement_equity(&mut cc, &pos, Price::new_unchecked(dec!(1500)), zero, zero);
        assert_eq!(cc.peek(equity), 0);
    }

    #[test]
    fn payout_waits_for_reveal() {
        let mut cc = InMemoryCompute::new();
        let s = engine();
        let mut pos = open_long(&mut cc, 30_000_000_000, dec!(10_000));
        let equity = cc.constant(10_000_000_000);
        s.begin_settlement(&mut cc, &mut pos, equity, Price::new_unchecked(dec!(2000)), CloseCause::Close);

        assert_eq!(pos.status, PositionStatus::AwaitingSettlement);
        assert!(pos.latches.equity);
        assert_eq!(s.poll_payout(&cc, &pos), Ok(Reveal::Pending));

        cc.deliver_reveals();
        let payout = s.poll_payout(&cc, &pos).unwrap().ready().unwrap();
        // 10 bps close fee
        assert_eq!(payout.gross.value(), dec!(10000));
        assert_eq!(payout.fee.value(), dec!(10));
        assert_eq!(payout.net.value(), dec!(9990));

        let status = s.complete(&mut pos, payout, Timestamp::from_secs(5));
        assert_eq!(status, PositionStatus::Closed);
        assert!(!pos.latches.equity);
        assert_eq!(pos.payout, Some(Quote::new(dec!(9990))));
    }

    #[test]
    fn liquidation_uses_liquidation_fee() {
        let s = engine();
        let payout = s.payout(1_000_000_000, CloseCause::Liquidation).unwrap();
        assert_eq!(payout.fee.value(), dec!(5)); // 50 bps
        assert_eq!(payout.net.value(), dec!(995));

        let nothing = s.payout(0, CloseCause::Liquidation).unwrap();
        assert!(nothing.net.is_zero());
    }

    #[test]
    fn missing_cause_is_an_error() {
        let mut cc = InMemoryCompute::new();
        let s = engine();
        let mut pos = open_long(&mut cc, 1_000_000, dec!(1));
        pos.status = PositionStatus::AwaitingSettlement;
        assert_eq!(
            s.poll_payout(&cc, &pos),
            Err(SettlementError::MissingCloseCause(PositionId(7)))
        );
    }

    #[test]
    fn batch_net_flows() {
        let mut batch = SettlementBatch::new(1, Timestamp::from_secs(0));
        batch.add(SettlementInstruction::release_collateral(PositionId(1), Quote::new(dec!(100))));
        batch.add(SettlementInstruction::payout(PositionId(1), TraderId(9), Quote::new(dec!(140))));
        batch.add(SettlementInstruction::refund(PositionId(2), TraderId(9), Quote::new(dec!(50))));
        batch.add(SettlementInstruction::payout(PositionId(3), TraderId(4), Quote::zero()));

        assert_eq!(batch.instruction_count(), 3);
        let flows = batch.net_flows();
        assert_eq!(flows.get(&LedgerAccount::Escrow), Some(&dec!(-150)));
        assert_eq!(flows.get(&LedgerAccount::Pool), Some(&dec!(-40)));
        assert_eq!(flows.get(&LedgerAccount::Trader(TraderId(9))), Some(&dec!(190)));
        assert_eq!(batch.total(TransferReason::Payout).value(), dec!(140));
    }
}
