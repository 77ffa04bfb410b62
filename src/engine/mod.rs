// 8.0: the lifecycle orchestrator. owns the position ledger and the funding, impact,
// margin and settlement engines, and drives positions through reveal-gated transitions.
// deterministic: time comes from the caller, reveals from the compute backend.

mod config;
mod core;
mod lifecycle;
mod requests;
mod results;
mod sweep;

pub use config::EngineConfig;
pub use core::{Exchange, SimExchange};
pub use requests::EncryptedOrder;
pub use results::{EngineError, SweepReport, Transition};
