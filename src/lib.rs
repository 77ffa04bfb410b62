// confidential-perps: perpetual futures settlement over confidential values.
// direction, size, entry price and equity never exist in plaintext inside the core;
// every decision that depends on them goes through select and the reveal protocol.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: ids, Side, Price, Quote, Bps, Leverage, fixed-point scales
//   2.x  confidential.rs: compute capability, opaque handles, in-memory backend
//   2.1  signed.rs: sign + magnitude algebra over confidential values
//   3.x  margin.rs: maintenance margin, liquidation flag, request validation
//   4.x  position.rs: position record, lifecycle status, reveal latches
//   4.1x ledger.rs: position store, OI aggregates, escrowed collateral
//   5.x  funding.rs: skew-driven rate, cumulative indices
//   6.x  impact.rs: quadratic price impact with funding-utilization depth
//   7.x  config.rs: market limits, fees, risk params, env presets
//   8.x  engine/: orchestrator: requests, sweep, lifecycle steps
//   9.x  settlement.rs: net equity, payout, transfer batches
//   9.1  price_feed.rs: oracle collaborator
//   10.x custody.rs: settlement asset ledger (mocked)
//   11.x liquidity.rs: LP pool surface (mocked)
//   12.x events.rs: state transition events for audit

// confidential core
pub mod confidential;
pub mod funding;
pub mod impact;
pub mod ledger;
pub mod margin;
pub mod position;
pub mod signed;
pub mod types;

// orchestration
pub mod engine;
pub mod events;
pub mod settlement;

// integration modules
pub mod config;
pub mod custody;
pub mod liquidity;
pub mod price_feed;

// re exports for convenience
pub use confidential::{ConfidentialCompute, ConfidentialExt, Ebool, Euint, InMemoryCompute, Reveal};
pub use config::{ConfigError, Environment, ExchangeConfig, FeeConfig, LifecycleParams, MarketParams};
pub use custody::{AssetLedger, CustodyError, InMemoryLedger};
pub use engine::*;
pub use events::*;
pub use funding::{FundingEngine, FundingParams};
pub use impact::{ImpactEngine, ImpactParams};
pub use ledger::{LedgerError, OpenInterest, PositionStore};
pub use liquidity::{LiquidityVault, PoolAdjustment, SharedPool, VaultError};
pub use margin::{MarginEngine, MarginParams};
pub use position::*;
pub use price_feed::{OracleReading, PriceOracle, StaticOracle};
pub use settlement::{
    BatchId, BatchStatus, LedgerAccount, Payout, SettlementBatch, SettlementEngine, SettlementError,
    SettlementInstruction, TransferReason,
};
pub use signed::SignedValue;
pub use types::*;
