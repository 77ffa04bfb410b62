// 8.0 engine/core.rs: the exchange. owns the ledger and the engines, talks to the four
// collaborators (compute backend, oracle, asset ledger, LP vault) through their traits.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::confidential::{ConfidentialCompute, InMemoryCompute};
use crate::config::ExchangeConfig;
use crate::custody::{AssetLedger, InMemoryLedger};
use crate::events::{Event, EventId, EventPayload};
use crate::funding::FundingEngine;
use crate::impact::ImpactEngine;
use crate::ledger::{OpenInterest, PositionStore};
use crate::liquidity::{LiquidityVault, SharedPool};
use crate::margin::MarginEngine;
use crate::position::Position;
use crate::price_feed::{PriceOracle, StaticOracle};
use crate::settlement::SettlementEngine;
use crate::signed::SignedValue;
use crate::types::{PositionId, Price, Quote, Timestamp};
use rust_decimal::Decimal;
use tracing::trace;

/// Everything in-memory. Tests and the simulator run on this.
pub type SimExchange = Exchange<InMemoryCompute, StaticOracle, InMemoryLedger, SharedPool>;

/** 8.1: main exchange struct. all core state lives here */
#[derive(Debug)]
pub struct Exchange<C, O, A, V> {
    pub(super) config: ExchangeConfig,
    pub(super) engine_config: EngineConfig,
    pub(super) compute: C,
    pub(super) oracle: O,
    pub(super) assets: A,
    pub(super) vault: V,
    pub(super) store: PositionStore,
    pub(super) funding: FundingEngine,
    pub(super) impact: ImpactEngine,
    pub(super) margin: MarginEngine,
    pub(super) settlement: SettlementEngine,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) next_batch_id: u64,
    pub(super) current_time: Timestamp,
}

impl<C, O, A, V> Exchange<C, O, A, V>
where
    C: ConfidentialCompute,
    O: PriceOracle,
    A: AssetLedger,
    V: LiquidityVault,
{
    pub fn new(
        config: ExchangeConfig,
        engine_config: EngineConfig,
        mut compute: C,
        oracle: O,
        assets: A,
        vault: V,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let start = Timestamp::from_millis(0);

        let store = PositionStore::new(&mut compute);
        let funding = FundingEngine::new(&mut compute, &config.funding, start);
        let impact = ImpactEngine::new(&config.impact);
        let margin = MarginEngine::new(&config.margin, &config.market);
        let settlement = SettlementEngine::new(&config.fees);

        Ok(Self {
            config,
            engine_config,
            compute,
            oracle,
            assets,
            vault,
            store,
            funding,
            impact,
            margin,
            settlement,
            events: Vec::new(),
            next_event_id: 1,
            next_batch_id: 1,
            current_time: start,
        })
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, millis: i64) {
        self.current_time = self.current_time.plus_millis(millis);
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Read-only snapshot of a position record.
    pub fn get_position(&self, id: PositionId) -> Option<&Position> {
        self.store.get(id)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.store.iter()
    }

    pub fn live_positions(&self) -> Vec<PositionId> {
        self.store.live_ids()
    }

    pub fn open_interest(&self) -> OpenInterest {
        self.store.open_interest()
    }

    /// Notional of accepted requests that have not filled yet, per side.
    pub fn reserved_interest(&self) -> OpenInterest {
        self.store.reserved_interest()
    }

    pub fn funding_rate(&self) -> SignedValue {
        self.funding.rate()
    }

    /// (long index, short index)
    pub fn cumulative_funding(&self) -> (SignedValue, SignedValue) {
        self.funding.cumulative()
    }

    pub fn last_funding_update(&self) -> Timestamp {
        self.funding.last_update()
    }

    pub fn pool_liquidity(&self) -> Quote {
        self.vault.pool_liquidity()
    }

    pub fn escrowed_collateral(&self) -> Quote {
        self.store.escrowed_collateral()
    }

    pub fn compute(&self) -> &C {
        &self.compute
    }

    pub fn compute_mut(&mut self) -> &mut C {
        &mut self.compute
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn assets(&self) -> &A {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut A {
        &mut self.assets
    }

    pub fn vault(&self) -> &V {
        &self.vault
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_for(&self, id: PositionId) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.position_id() == Some(id))
    }

    /// Latest oracle price. invalid or non-positive aborts the caller.
    pub(super) fn oracle_price(&self) -> Result<Price, EngineError> {
        let reading = self.oracle.latest_price();
        reading.usable_price().ok_or(EngineError::InvalidOraclePrice {
            price: reading.price,
            valid: reading.valid,
        })
    }

    pub(super) fn position(&self, id: PositionId) -> Result<Position, EngineError> {
        self.store
            .get(id)
            .cloned()
            .ok_or(EngineError::PositionNotFound(id))
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        if self.engine_config.verbose {
            trace!(event_id = event.id.0, payload = ?event.payload, "Event");
        }

        self.events.push(event);

        if self.events.len() > self.engine_config.max_events {
            let drain_count = self.events.len() - self.engine_config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}

impl SimExchange {
    /// In-memory exchange with the oracle at `price`. Reveals queue until
    /// `compute_mut().deliver_reveals()`.
    pub fn simulated(config: ExchangeConfig, price: Decimal) -> Result<Self, EngineError> {
        Self::new(
            config,
            EngineConfig::default(),
            InMemoryCompute::new(),
            StaticOracle::new(price),
            InMemoryLedger::new(),
            SharedPool::new(),
        )
    }

    /// Deliver every queued reveal, then sweep every live position.
    pub fn deliver_and_sweep(&mut self) -> Result<super::results::SweepReport, EngineError> {
        self.compute.deliver_reveals();
        self.sweep_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn invalid_config_is_refused() {
        let mut config = ExchangeConfig::default();
        config.margin.maintenance_margin_rate = dec!(2);
        assert!(matches!(
            SimExchange::simulated(config, dec!(2000)),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn oracle_price_validation() {
        let mut ex = SimExchange::simulated(ExchangeConfig::default(), dec!(2000)).unwrap();
        assert_eq!(ex.oracle_price().unwrap().value(), dec!(2000));

        ex.oracle_mut().set_price(dec!(0));
        assert!(matches!(ex.oracle_price(), Err(EngineError::InvalidOraclePrice { .. })));

        ex.oracle_mut().set_price(dec!(2000));
        ex.oracle_mut().set_valid(false);
        assert!(matches!(
            ex.oracle_price(),
            Err(EngineError::InvalidOraclePrice { valid: false, .. })
        ));
    }

    #[test]
    fn event_retention_is_bounded() {
        let engine_config = EngineConfig {
            max_events: 2,
            ..EngineConfig::verbose()
        };
        let mut ex = Exchange::new(
            ExchangeConfig::default(),
            engine_config,
            InMemoryCompute::new(),
            StaticOracle::new(dec!(2000)),
            InMemoryLedger::new(),
            SharedPool::new(),
        )
        .unwrap();
        for i in 0..5 {
            ex.emit_event(EventPayload::RequestAccepted {
                position_id: PositionId(i),
            });
        }
        assert_eq!(ex.events().len(), 2);
        assert_eq!(ex.events()[0].id, EventId(4));
        assert_eq!(ex.recent_events(1)[0].id, EventId(5));
    }

    #[test]
    fn clock() {
        let mut ex = SimExchange::simulated(ExchangeConfig::default(), dec!(2000)).unwrap();
        ex.advance_time(1_500);
        assert_eq!(ex.time(), Timestamp::from_millis(1_500));
        ex.set_time(Timestamp::from_secs(10));
        assert_eq!(ex.time().as_millis(), 10_000);
    }
}
