// 10.0 custody.rs: MOCKED. settlement asset moves are balance changes, no real token transfers.
// 10.1 is the ledger trait the exchange talks to, 10.2 the in-memory backend.

use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::settlement::{BatchId, LedgerAccount, SettlementBatch};
use crate::types::{Quote, TraderId};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CustodyError {
    #[error("Insufficient funds in {account:?}: required {required}, available {available}")]
    InsufficientFunds {
        account: LedgerAccount,
        required: Quote,
        available: Quote,
    },

    #[error("Transfer amount must be positive, got {0}")]
    InvalidAmount(Quote),

    #[error("Batch {0} was already executed")]
    BatchAlreadyExecuted(BatchId),
}

// 10.1: the settlement asset ledger. every call is all-or-nothing.
pub trait AssetLedger {
    /// Pull `amount` from the trader's wallet into `to` (escrow or pool).
    fn transfer_in(&mut self, from: TraderId, to: LedgerAccount, amount: Quote) -> Result<(), CustodyError>;

    /// Apply every instruction of the batch, or none of them.
    fn execute(&mut self, batch: &SettlementBatch) -> Result<(), CustodyError>;

    fn balance(&self, account: LedgerAccount) -> Quote;
}

// 10.2: in-memory ledger for tests and simulation
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    balances: HashMap<LedgerAccount, Decimal>,
    executed: Vec<BatchId>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint into a wallet. Stands in for the outside world funding a trader.
    pub fn fund(&mut self, trader: TraderId, amount: Quote) {
        *self
            .balances
            .entry(LedgerAccount::Trader(trader))
            .or_insert(Decimal::ZERO) += amount.value();
    }

    pub fn executed_batches(&self) -> &[BatchId] {
        &self.executed
    }

    fn available(&self, account: LedgerAccount) -> Decimal {
        self.balances.get(&account).copied().unwrap_or(Decimal::ZERO)
    }
}

impl AssetLedger for InMemoryLedger {
    fn transfer_in(&mut self, from: TraderId, to: LedgerAccount, amount: Quote) -> Result<(), CustodyError> {
        if amount.is_negative() || amount.is_zero() {
            return Err(CustodyError::InvalidAmount(amount));
        }
        let source = LedgerAccount::Trader(from);
        let available = self.available(source);
        if available < amount.value() {
            warn!(trader = %from, amount = %amount, available = %available, "Custody: transfer in rejected");
            return Err(CustodyError::InsufficientFunds {
                account: source,
                required: amount,
                available: Quote::new(available),
            });
        }
        *self.balances.entry(source).or_insert(Decimal::ZERO) -= amount.value();
        *self.balances.entry(to).or_insert(Decimal::ZERO) += amount.value();
        Ok(())
    }

    fn execute(&mut self, batch: &SettlementBatch) -> Result<(), CustodyError> {
        if self.executed.contains(&batch.batch_id) {
            return Err(CustodyError::BatchAlreadyExecuted(batch.batch_id));
        }

        // validate all flows first
        let flows = batch.net_flows();
        for (account, flow) in &flows {
            let current = self.available(*account);
            if *flow < Decimal::ZERO && current + flow < Decimal::ZERO {
                return Err(CustodyError::InsufficientFunds {
                    account: *account,
                    required: Quote::new(flow.abs()),
                    available: Quote::new(current),
                });
            }
        }

        for (account, flow) in flows {
            *self.balances.entry(account).or_insert(Decimal::ZERO) += flow;
        }
        self.executed.push(batch.batch_id);
        debug!(batch_id = batch.batch_id, instructions = batch.instruction_count(), "Custody: batch executed");
        Ok(())
    }

    fn balance(&self, account: LedgerAccount) -> Quote {
        Quote::new(self.available(account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::SettlementInstruction;
    use crate::types::{PositionId, Timestamp};
    use rust_decimal_macros::dec;

    #[test]
    fn transfer_in_moves_wallet_to_escrow() {
        let mut ledger = InMemoryLedger::new();
        ledger.fund(TraderId(1), Quote::new(dec!(500)));

        ledger
            .transfer_in(TraderId(1), LedgerAccount::Escrow, Quote::new(dec!(200)))
            .unwrap();
        assert_eq!(ledger.balance(LedgerAccount::Trader(TraderId(1))).value(), dec!(300));
        assert_eq!(ledger.balance(LedgerAccount::Escrow).value(), dec!(200));
    }

    #[test]
    fn transfer_in_rejects_overdraft_and_zero() {
        let mut ledger = InMemoryLedger::new();
        ledger.fund(TraderId(1), Quote::new(dec!(50)));
        assert!(matches!(
            ledger.transfer_in(TraderId(1), LedgerAccount::Escrow, Quote::new(dec!(51))),
            Err(CustodyError::InsufficientFunds { .. })
        ));
        assert_eq!(
            ledger.transfer_in(TraderId(1), LedgerAccount::Escrow, Quote::zero()),
            Err(CustodyError::InvalidAmount(Quote::zero()))
        );
        assert_eq!(ledger.balance(LedgerAccount::Escrow), Quote::zero());
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let mut ledger = InMemoryLedger::new();
        ledger.fund(TraderId(1), Quote::new(dec!(100)));
        ledger
            .transfer_in(TraderId(1), LedgerAccount::Escrow, Quote::new(dec!(100)))
            .unwrap();

        let mut batch = SettlementBatch::new(1, Timestamp::from_secs(0));
        batch.add(SettlementInstruction::release_collateral(PositionId(1), Quote::new(dec!(100))));
        batch.add(SettlementInstruction::payout(PositionId(1), TraderId(1), Quote::new(dec!(150))));

        // pool only ends up with 100 and owes 150
        assert!(matches!(
            ledger.execute(&batch),
            Err(CustodyError::InsufficientFunds { account: LedgerAccount::Pool, .. })
        ));
        assert_eq!(ledger.balance(LedgerAccount::Escrow).value(), dec!(100));

        ledger.fund(TraderId(2), Quote::new(dec!(1000)));
        ledger
            .transfer_in(TraderId(2), LedgerAccount::Pool, Quote::new(dec!(1000)))
            .unwrap();
        ledger.execute(&batch).unwrap();
        assert_eq!(ledger.balance(LedgerAccount::Pool).value(), dec!(950));
        assert_eq!(ledger.balance(LedgerAccount::Trader(TraderId(1))).value(), dec!(150));
        assert_eq!(ledger.balance(LedgerAccount::Escrow), Quote::zero());

        assert_eq!(ledger.execute(&batch), Err(CustodyError::BatchAlreadyExecuted(1)));
    }
}
