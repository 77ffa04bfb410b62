//! Trader and LP entry points.

use super::core::Exchange;
use super::results::EngineError;
use crate::confidential::{ConfidentialCompute, ConfidentialExt, Ebool, Euint};
use crate::custody::AssetLedger;
use crate::events::{CloseRequestedEvent, EventPayload, LiquidityDepositedEvent, PositionRequestedEvent};
use crate::liquidity::LiquidityVault;
use crate::position::{EntryRange, Position, PositionStatus, RevealLatches, Validity};
use crate::price_feed::PriceOracle;
use crate::settlement::LedgerAccount;
use crate::signed::SignedValue;
use crate::types::{to_fixed, PositionId, Quote, Side, TraderId};
use rust_decimal::Decimal;
use tracing::{debug, info};

/// Client-side encryption of an open intent.
#[derive(Debug, Clone, Copy)]
pub struct EncryptedOrder {
    pub direction: Ebool,
    pub size: Euint,
    pub range: EntryRange,
}

impl<C, O, A, V> Exchange<C, O, A, V>
where
    C: ConfidentialCompute,
    O: PriceOracle,
    A: AssetLedger,
    V: LiquidityVault,
{
    /// Encrypts side, notional and entry band. Negative inputs encrypt as zero,
    /// which validation then rejects.
    pub fn encrypt_order(&mut self, side: Side, size: Decimal, low: Decimal, high: Decimal) -> EncryptedOrder {
        let cc = &mut self.compute;
        EncryptedOrder {
            direction: cc.encrypt_bool(side.is_long()),
            size: cc.encrypt(to_fixed(size).unwrap_or(0)),
            range: EntryRange {
                low: cc.encrypt(to_fixed(low).unwrap_or(0)),
                high: cc.encrypt(to_fixed(high).unwrap_or(0)),
            },
        }
    }

    /// Escrows collateral and records a Requested position whose validity
    /// flag is being revealed. Invalid requests are not errors: they come
    /// back refunded from a later sweep.
    pub fn request_open(
        &mut self,
        trader: TraderId,
        direction: Ebool,
        size: Euint,
        range: EntryRange,
        collateral: Quote,
    ) -> Result<PositionId, EngineError> {
        if collateral.is_negative() || collateral.is_zero() {
            return Err(EngineError::InvalidCollateral(collateral));
        }
        self.assets.transfer_in(trader, LedgerAccount::Escrow, collateral)?;

        let cc = &mut self.compute;
        let committed = self.store.side_commitment(cc, direction);
        let request_valid = self.margin.validate_request(cc, size, collateral, range, committed);
        cc.request_reveal_bool(request_valid);

        // held until fill or expiry; a rejected request reserves nothing
        let zero = cc.constant(0);
        let reservation = cc.select(request_valid, size, zero);
        self.store.reserve(cc, direction, reservation);

        let no = cc.encrypt_bool(false);
        let position = Position {
            id: self.store.allocate_id(),
            owner: trader,
            direction,
            size,
            collateral,
            entry_range: range,
            entry_price: cc.constant(0),
            entry_funding: SignedValue::zero(cc),
            entry_impact: SignedValue::zero(cc),
            settlement_price: None,
            status: PositionStatus::Requested,
            close_cause: None,
            validity: Validity {
                request_valid,
                price_in_range: no,
                to_be_liquidated: no,
                removed: false,
            },
            pending_equity: cc.constant(0),
            latches: RevealLatches {
                request_valid: true,
                ..RevealLatches::default()
            },
            range_check_price: None,
            range_checks: 0,
            close_requested: false,
            payout: None,
            requested_at: self.current_time,
            filled_at: None,
            settled_at: None,
        };
        let id = position.id;

        self.store.escrow_collateral(collateral);
        self.store.insert(position);

        info!(position_id = %id, trader = %trader, collateral = %collateral, "Request: position requested");
        self.emit_event(EventPayload::PositionRequested(PositionRequestedEvent {
            position_id: id,
            owner: trader,
            collateral,
        }));
        Ok(id)
    }

    /// Owner-only close of an Open position. Open positions always carry a
    /// liquidation reveal in flight, so the close is only marked here: the
    /// next sweep consumes that reveal first and settles as Liquidation or
    /// Close.
    pub fn request_close(&mut self, trader: TraderId, id: PositionId) -> Result<(), EngineError> {
        let position = self.position(id)?;
        if position.owner != trader {
            return Err(EngineError::NotOwner {
                position_id: id,
                caller: trader,
            });
        }
        if position.status != PositionStatus::Open || position.is_removed() {
            return Err(EngineError::InvalidState {
                position_id: id,
                status: position.status,
            });
        }
        if position.close_requested {
            return Err(EngineError::CloseAlreadyRequested(id));
        }

        if let Some(p) = self.store.get_mut(id) {
            p.close_requested = true;
        }
        debug!(position_id = %id, "Close: queued behind liquidation check");

        self.emit_event(EventPayload::CloseRequested(CloseRequestedEvent {
            position_id: id,
            owner: trader,
        }));
        Ok(())
    }

    /// LP deposit: funds move from the provider's wallet into the pool.
    pub fn provide_liquidity(&mut self, provider: TraderId, amount: Quote) -> Result<(), EngineError> {
        if amount.is_negative() || amount.is_zero() {
            return Err(EngineError::InvalidCollateral(amount));
        }
        self.assets.transfer_in(provider, LedgerAccount::Pool, amount)?;
        self.vault.deposit(amount)?;

        let pool_liquidity = self.vault.pool_liquidity();
        info!(provider = %provider, amount = %amount, pool = %pool_liquidity, "Pool: liquidity provided");
        self.emit_event(EventPayload::LiquidityDeposited(LiquidityDepositedEvent {
            provider,
            amount,
            pool_liquidity,
        }));
        Ok(())
    }
}
