//! The batch sweep: one transition per position per call.
//!
//! Transition table, keyed by status:
//! - Requested: poll `requestValid`. true -> Pending + first range check,
//!   false -> refund and `removed`.
//! - Pending: poll `priceInRange`. true -> fill at the checked price, Open,
//!   first liquidation check. false -> retry at the latest price, or expire.
//! - Open: poll `toBeLiquidated`. true -> settle as Liquidation. false ->
//!   settle as Close if one was requested, else a fresh check.
//! - AwaitingSettlement: poll the equity reveal, pay out, release OI.
//! - terminal or removed: nothing.
//!
//! A pending poll leaves the position untouched. Any hard error restores the
//! ledger, funding state and event log to their pre-sweep values; transfers
//! and pool adjustments are only committed once every position succeeded.

use super::core::Exchange;
use super::results::{EngineError, SweepReport, Transition};
use crate::confidential::{ConfidentialCompute, Reveal};
use crate::custody::AssetLedger;
use crate::events::{Event, EventPayload, PositionSettledEvent, RefundEvent};
use crate::funding::FundingEngine;
use crate::ledger::PositionStore;
use crate::liquidity::{LiquidityVault, PoolAdjustment};
use crate::position::{CloseCause, Position, PositionStatus};
use crate::price_feed::PriceOracle;
use crate::settlement::{SettlementBatch, SettlementInstruction};
use crate::types::{PositionId, Price, Quote};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

// state restored when a sweep aborts
struct Snapshot {
    store: PositionStore,
    funding: FundingEngine,
    events: Vec<Event>,
    next_event_id: u64,
    next_batch_id: u64,
}

// staged effects of one sweep
pub(super) struct SweepContext {
    price: Option<Price>,
    batch: SettlementBatch,
    adjustment: PoolAdjustment,
    settled: usize,
    /// pool liquidity after the settlements already staged in this sweep
    available: Quote,
}

impl SweepContext {
    fn new(batch: SettlementBatch, available: Quote) -> Self {
        Self {
            price: None,
            batch,
            adjustment: PoolAdjustment {
                collateral_in: Quote::zero(),
                payout_out: Quote::zero(),
                fee: Quote::zero(),
            },
            settled: 0,
            available,
        }
    }
}

impl<C, O, A, V> Exchange<C, O, A, V>
where
    C: ConfidentialCompute,
    O: PriceOracle,
    A: AssetLedger,
    V: LiquidityVault,
{
    /// Advance each listed position by at most one transition. Duplicate
    /// ids are processed once.
    pub fn sweep(&mut self, ids: &[PositionId]) -> Result<SweepReport, EngineError> {
        let snapshot = self.snapshot();
        match self.sweep_inner(ids) {
            Ok(report) => Ok(report),
            Err(err) => {
                warn!(error = %err, "Sweep: aborted, state restored");
                self.restore(snapshot);
                Err(err)
            }
        }
    }

    /// Sweep every position that is not removed or terminal.
    pub fn sweep_all(&mut self) -> Result<SweepReport, EngineError> {
        let ids = self.store.live_ids();
        self.sweep(&ids)
    }

    fn sweep_inner(&mut self, ids: &[PositionId]) -> Result<SweepReport, EngineError> {
        // accrue before anything reads the indices
        self.funding.accrue(&mut self.compute, self.current_time);

        let batch = SettlementBatch::new(self.next_batch_id, self.current_time);
        self.next_batch_id += 1;
        let mut ctx = SweepContext::new(batch, self.vault.pool_liquidity());

        let mut seen = BTreeSet::new();
        let mut report = SweepReport::default();
        for &id in ids {
            if !seen.insert(id) {
                continue;
            }
            let transition = self.step(id, &mut ctx)?;
            if transition.is_progress() {
                debug!(position_id = %id, transition = ?transition, "Sweep: transition");
            }
            report.transitions.push((id, transition));
        }

        self.commit(ctx)?;
        Ok(report)
    }

    fn step(&mut self, id: PositionId, ctx: &mut SweepContext) -> Result<Transition, EngineError> {
        let mut position = self.position(id)?;
        if position.is_finished() {
            return Ok(Transition::Idle);
        }

        let transition = match position.status {
            PositionStatus::Requested => self.step_requested(&mut position, ctx)?,
            PositionStatus::Pending => self.step_pending(&mut position, ctx)?,
            PositionStatus::Open => self.step_open(&mut position, ctx)?,
            PositionStatus::AwaitingSettlement => self.step_awaiting_settlement(&mut position, ctx)?,
            PositionStatus::Liquidated | PositionStatus::Closed => Transition::Idle,
        };

        debug_assert!(position.latches.outstanding() <= 1, "two reveals in flight");
        self.store.update(position);
        Ok(transition)
    }

    fn step_requested(&mut self, position: &mut Position, ctx: &mut SweepContext) -> Result<Transition, EngineError> {
        match self.compute.poll_reveal_bool(position.validity.request_valid) {
            Reveal::Pending => Ok(Transition::Waiting),
            Reveal::Ready(true) => {
                let price = self.sweep_price(ctx)?;
                position.latches.request_valid = false;
                position.status = PositionStatus::Pending;
                self.emit_event(EventPayload::RequestAccepted {
                    position_id: position.id,
                });
                self.issue_range_check(position, price);
                Ok(Transition::Accepted)
            }
            Reveal::Ready(false) => {
                position.latches.request_valid = false;
                let refund = self.refund(position, ctx)?;
                warn!(position_id = %position.id, refund = %refund, "Sweep: request rejected");
                self.emit_event(EventPayload::RequestRejected(RefundEvent {
                    position_id: position.id,
                    owner: position.owner,
                    refund,
                    range_checks: position.range_checks,
                }));
                Ok(Transition::Rejected { refund })
            }
        }
    }

    fn step_pending(&mut self, position: &mut Position, ctx: &mut SweepContext) -> Result<Transition, EngineError> {
        if !position.latches.price_in_range {
            let price = self.sweep_price(ctx)?;
            self.issue_range_check(position, price);
            return Ok(Transition::RangeCheckRetried {
                attempt: position.range_checks,
            });
        }

        match self.compute.poll_reveal_bool(position.validity.price_in_range) {
            Reveal::Pending => Ok(Transition::Waiting),
            Reveal::Ready(true) => {
                let fill_price = position
                    .range_check_price
                    .ok_or(EngineError::MissingRangeCheckPrice(position.id))?;
                let mark = self.sweep_price(ctx)?;
                position.latches.price_in_range = false;
                self.fill(position, fill_price);
                self.issue_liquidation_check(position, mark);
                Ok(Transition::Filled { price: fill_price })
            }
            Reveal::Ready(false) => {
                position.latches.price_in_range = false;
                let exhausted = self
                    .config
                    .lifecycle
                    .max_range_checks
                    .is_some_and(|max| position.range_checks >= max);
                if exhausted {
                    self.store
                        .release_reservation(&mut self.compute, position.direction, position.size);
                    let refund = self.refund(position, ctx)?;
                    warn!(position_id = %position.id, checks = position.range_checks, "Sweep: entry range never reached, expired");
                    self.emit_event(EventPayload::RequestExpired(RefundEvent {
                        position_id: position.id,
                        owner: position.owner,
                        refund,
                        range_checks: position.range_checks,
                    }));
                    return Ok(Transition::Expired { refund });
                }
                let price = self.sweep_price(ctx)?;
                self.issue_range_check(position, price);
                Ok(Transition::RangeCheckRetried {
                    attempt: position.range_checks,
                })
            }
        }
    }

    fn step_open(&mut self, position: &mut Position, ctx: &mut SweepContext) -> Result<Transition, EngineError> {
        // issued at fill and re-issued below, so always in flight here
        let liquidatable = match self.compute.poll_reveal_bool(position.validity.to_be_liquidated) {
            Reveal::Pending => return Ok(Transition::Waiting),
            Reveal::Ready(flag) => flag,
        };

        let price = self.sweep_price(ctx)?;
        position.latches.to_be_liquidated = false;

        if liquidatable {
            warn!(position_id = %position.id, mark = %price, "Sweep: position liquidatable");
            self.start_settlement(position, price, CloseCause::Liquidation);
            return Ok(Transition::SettlementStarted {
                cause: CloseCause::Liquidation,
            });
        }
        if position.close_requested {
            self.start_settlement(position, price, CloseCause::Close);
            return Ok(Transition::SettlementStarted {
                cause: CloseCause::Close,
            });
        }

        self.issue_liquidation_check(position, price);
        Ok(Transition::LiquidationCheckIssued)
    }

    fn step_awaiting_settlement(
        &mut self,
        position: &mut Position,
        ctx: &mut SweepContext,
    ) -> Result<Transition, EngineError> {
        let payout = match self.settlement.poll_payout(&self.compute, position)? {
            Reveal::Pending => return Ok(Transition::Waiting),
            Reveal::Ready(payout) => payout,
        };

        // poolLiquidity here already counts this position's released
        // collateral: it is credited to the pool first, then the payout is
        // checked and debited
        let available = ctx.available.add(position.collateral);
        if payout.net > available {
            error!(position_id = %position.id, payout = %payout.net, available = %available, "Sweep: pool insolvent");
            return Err(EngineError::PoolInsolvent {
                position_id: position.id,
                payout: payout.net,
                available,
            });
        }
        ctx.available = available.sub(payout.net);

        self.store.release_collateral(position.collateral)?;
        ctx.batch
            .add(SettlementInstruction::release_collateral(position.id, position.collateral));
        ctx.batch
            .add(SettlementInstruction::payout(position.id, position.owner, payout.net));
        ctx.adjustment.collateral_in = ctx.adjustment.collateral_in.add(position.collateral);
        ctx.adjustment.payout_out = ctx.adjustment.payout_out.add(payout.net);
        ctx.adjustment.fee = ctx.adjustment.fee.add(payout.fee);
        ctx.settled += 1;

        let cc = &mut self.compute;
        self.store.decrease_open_interest(cc, position.direction, position.size);
        self.funding.set_rate_from_skew(cc, self.store.open_interest());

        let status = self.settlement.complete(position, payout, self.current_time);
        let cause = position.close_cause.unwrap_or(CloseCause::Close);

        info!(
            position_id = %position.id,
            status = %status,
            gross = %payout.gross,
            fee = %payout.fee,
            net = %payout.net,
            "Sweep: position settled"
        );
        self.emit_event(EventPayload::PositionSettled(PositionSettledEvent {
            position_id: position.id,
            owner: position.owner,
            cause,
            collateral: position.collateral,
            gross_payout: payout.gross,
            fee: payout.fee,
            net_payout: payout.net,
        }));

        Ok(Transition::Settled {
            status,
            payout: payout.net,
        })
    }

    /// Releases escrow back to the owner and marks the request removed.
    fn refund(&mut self, position: &mut Position, ctx: &mut SweepContext) -> Result<Quote, EngineError> {
        self.store.release_collateral(position.collateral)?;
        ctx.batch
            .add(SettlementInstruction::refund(position.id, position.owner, position.collateral));
        position.validity.removed = true;
        Ok(position.collateral)
    }

    // one oracle read per sweep, only if some transition needs it
    fn sweep_price(&self, ctx: &mut SweepContext) -> Result<Price, EngineError> {
        if let Some(price) = ctx.price {
            return Ok(price);
        }
        let price = self.oracle_price()?;
        ctx.price = Some(price);
        Ok(price)
    }

    fn commit(&mut self, mut ctx: SweepContext) -> Result<(), EngineError> {
        if !ctx.batch.is_empty() {
            if let Err(err) = self.assets.execute(&ctx.batch) {
                ctx.batch.mark_failed();
                return Err(err.into());
            }
            ctx.batch.mark_committed(self.current_time);
        }
        if ctx.settled > 0 {
            // pre-checked against the running liquidity above
            if let Err(err) = self.vault.apply(ctx.adjustment) {
                error!(error = %err, batch_id = ctx.batch.batch_id, "Sweep: vault rejected a committed batch");
                return Err(err.into());
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            store: self.store.clone(),
            funding: self.funding.clone(),
            events: self.events.clone(),
            next_event_id: self.next_event_id,
            next_batch_id: self.next_batch_id,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.store = snapshot.store;
        self.funding = snapshot.funding;
        self.events = snapshot.events;
        self.next_event_id = snapshot.next_event_id;
        self.next_batch_id = snapshot.next_batch_id;
    }
}
