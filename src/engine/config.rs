// 8.0.1: runtime knobs of the orchestrator itself. market and risk parameters live in
// crate::config; nothing here changes settlement results.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Audit events kept in memory. the oldest are dropped first.
    pub max_events: usize,
    /// Trace every emitted event.
    pub verbose: bool,
}

impl EngineConfig {
    /// Keeper or debugging setup: every event is traced.
    pub fn verbose() -> Self {
        Self {
            verbose: true,
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            verbose: false,
        }
    }
}
