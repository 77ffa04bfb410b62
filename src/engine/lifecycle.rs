//! Single lifecycle steps: issuing checks, filling, starting settlement.
//!
//! Each helper works on a copy of the position that the caller writes back.
//! Funding has already been accrued to `current_time` by the caller.

use super::core::Exchange;
use crate::confidential::{ConfidentialCompute, ConfidentialExt};
use crate::custody::AssetLedger;
use crate::events::{
    EventPayload, LiquidationCheckEvent, PositionFilledEvent, RangeCheckEvent, SettlementStartedEvent,
};
use crate::liquidity::LiquidityVault;
use crate::position::{CloseCause, Position, PositionStatus};
use crate::price_feed::PriceOracle;
use crate::types::Price;
use tracing::{debug, info};

impl<C, O, A, V> Exchange<C, O, A, V>
where
    C: ConfidentialCompute,
    O: PriceOracle,
    A: AssetLedger,
    V: LiquidityVault,
{
    /// Evaluate `low <= price <= high` and request its reveal.
    pub(super) fn issue_range_check(&mut self, position: &mut Position, price: Price) {
        let flag = self
            .margin
            .price_in_range(&mut self.compute, position.entry_range, price);
        self.compute.request_reveal_bool(flag);

        position.validity.price_in_range = flag;
        position.latches.price_in_range = true;
        position.range_check_price = Some(price);
        position.range_checks += 1;

        debug!(position_id = %position.id, price = %price, attempt = position.range_checks, "Lifecycle: range check issued");
        self.emit_event(EventPayload::RangeCheckIssued(RangeCheckEvent {
            position_id: position.id,
            price,
            attempt: position.range_checks,
        }));
    }

    /// Evaluate `toBeLiquidated` at `mark` and request its reveal.
    pub(super) fn issue_liquidation_check(&mut self, position: &mut Position, mark: Price) {
        let cc = &mut self.compute;
        let funding_pnl = self
            .funding
            .funding_pnl(cc, position.direction, position.size, position.entry_funding);
        let flag = self.margin.check_liquidation(cc, position, mark, funding_pnl);
        cc.request_reveal_bool(flag);

        position.validity.to_be_liquidated = flag;
        position.latches.to_be_liquidated = true;

        debug!(position_id = %position.id, mark = %mark, "Lifecycle: liquidation check issued");
        self.emit_event(EventPayload::LiquidationCheckIssued(LiquidationCheckEvent {
            position_id: position.id,
            mark_price: mark,
        }));
    }

    /// Entry impact against pre-trade skew, funding snapshot, the
    /// reservation turns into OI, then the rate is re-derived from the new skew.
    pub(super) fn fill(&mut self, position: &mut Position, price: Price) {
        let tvl = self.vault.pool_liquidity();
        let cc = &mut self.compute;

        let utilization = self.funding.utilization(cc);
        let coefficient = self.impact.coefficient(cc, price, tvl, utilization);
        let pre_trade = self.store.open_interest();
        position.entry_impact = self.impact.entry_impact(
            cc,
            position.direction,
            position.size,
            pre_trade,
            coefficient,
            price,
        );
        position.entry_funding = self.funding.index_for(cc, position.direction);
        position.entry_price = cc.constant(price.to_fixed().unwrap_or(0));

        self.store.release_reservation(cc, position.direction, position.size);
        self.store.increase_open_interest(cc, position.direction, position.size);
        self.funding.set_rate_from_skew(cc, self.store.open_interest());

        position.status = PositionStatus::Open;
        position.filled_at = Some(self.current_time);

        info!(position_id = %position.id, price = %price, "Lifecycle: position filled");
        self.emit_event(EventPayload::PositionFilled(PositionFilledEvent {
            position_id: position.id,
            owner: position.owner,
            fill_price: price,
        }));
    }

    /// Net equity with exit impact against the current skew, then the
    /// settlement engine stores it and requests the reveal.
    pub(super) fn start_settlement(&mut self, position: &mut Position, price: Price, cause: CloseCause) {
        let tvl = self.vault.pool_liquidity();
        let cc = &mut self.compute;

        let funding_pnl = self
            .funding
            .funding_pnl(cc, position.direction, position.size, position.entry_funding);
        let utilization = self.funding.utilization(cc);
        let coefficient = self.impact.coefficient(cc, price, tvl, utilization);
        let exit_impact = self.impact.exit_impact(
            cc,
            position.direction,
            position.size,
            self.store.open_interest(),
            coefficient,
            price,
        );
        let equity = self
            .settlement
            .settlement_equity(cc, position, price, funding_pnl, exit_impact);
        self.settlement.begin_settlement(cc, position, equity, price, cause);

        info!(position_id = %position.id, price = %price, cause = ?cause, "Lifecycle: settlement started");
        self.emit_event(EventPayload::SettlementStarted(SettlementStartedEvent {
            position_id: position.id,
            price,
            cause,
        }));
    }
}
