use std::time::Duration;

use crate::error::EngineError;

pub const DEFAULT_LEDGER_TTL: Duration = Duration::from_secs(30);

pub const ENV_MAX_HISTORY: &str = "MAPPLAN_MAX_HISTORY";
pub const ENV_LEDGER_TTL_MS: &str = "MAPPLAN_LEDGER_TTL_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Oldest history entries are evicted beyond this depth. `None` keeps all.
    pub max_history: Option<usize>,
    /// How long a sent action waits for its echo before its ledger entries
    /// are dropped.
    pub ledger_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_history: None,
            ledger_ttl: DEFAULT_LEDGER_TTL,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `MAPPLAN_MAX_HISTORY` and `MAPPLAN_LEDGER_TTL_MS`.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EngineError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MAX_HISTORY) {
            let depth: usize = raw
                .trim()
                .parse()
                .map_err(|_| EngineError::Config(format!("{ENV_MAX_HISTORY}={raw:?} is not a count")))?;
            if depth == 0 {
                return Err(EngineError::Config(format!("{ENV_MAX_HISTORY} must be at least 1")));
            }
            config.max_history = Some(depth);
        }

        if let Some(raw) = lookup(ENV_LEDGER_TTL_MS) {
            let ms: u64 = raw
                .trim()
                .parse()
                .map_err(|_| EngineError::Config(format!("{ENV_LEDGER_TTL_MS}={raw:?} is not milliseconds")))?;
            config.ledger_ttl = Duration::from_millis(ms);
        }

        Ok(config)
    }
}
