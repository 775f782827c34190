//! Engine tunables.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//! `CHAOSBED_*` environment variables override the file.

use std::{path::PathBuf, time::Duration};

use chaosbed_types::constants::{
    DEFAULT_GAS_PRICE_WEI, HEAL_TIMEOUT_SECS, LIVENESS_WINDOW_SECS, POLL_INTERVAL_MS,
    SAFETY_ROUNDS, TX_INTERVAL_MS,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long the cluster gets to reconverge after recovery.
    #[serde(default = "default_heal_timeout_secs")]
    pub heal_timeout_secs: u64,

    /// How long the liveness check watches for a new block.
    #[serde(default = "default_liveness_window_secs")]
    pub liveness_window_secs: u64,

    /// Number of block hash comparison rounds in the safety check.
    #[serde(default = "default_safety_rounds")]
    pub safety_rounds: u32,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause between two workload transactions.
    #[serde(default = "default_tx_interval_ms")]
    pub tx_interval_ms: u64,

    #[serde(default = "default_gas_price_wei")]
    pub gas_price_wei: u64,

    /// Upper bound on waiting for the scheduler task at the end of a case.
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,

    /// Where failure contexts are written.
    #[serde(default = "default_context_dir")]
    pub context_dir: PathBuf,
}

fn default_heal_timeout_secs() -> u64 {
    HEAL_TIMEOUT_SECS
}

fn default_liveness_window_secs() -> u64 {
    LIVENESS_WINDOW_SECS
}

fn default_safety_rounds() -> u32 {
    SAFETY_ROUNDS
}

fn default_poll_interval_ms() -> u64 {
    POLL_INTERVAL_MS
}

fn default_tx_interval_ms() -> u64 {
    TX_INTERVAL_MS
}

fn default_gas_price_wei() -> u64 {
    DEFAULT_GAS_PRICE_WEI
}

fn default_join_timeout_secs() -> u64 {
    120
}

fn default_context_dir() -> PathBuf {
    PathBuf::from("./system_log")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heal_timeout_secs: default_heal_timeout_secs(),
            liveness_window_secs: default_liveness_window_secs(),
            safety_rounds: default_safety_rounds(),
            poll_interval_ms: default_poll_interval_ms(),
            tx_interval_ms: default_tx_interval_ms(),
            gas_price_wei: default_gas_price_wei(),
            join_timeout_secs: default_join_timeout_secs(),
            context_dir: default_context_dir(),
        }
    }
}

impl EngineConfig {
    pub fn heal_timeout(&self) -> Duration {
        Duration::from_secs(self.heal_timeout_secs)
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn tx_interval(&self) -> Duration {
        Duration::from_millis(self.tx_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported variables:
    /// - CHAOSBED_HEAL_TIMEOUT_SECS
    /// - CHAOSBED_LIVENESS_WINDOW_SECS
    /// - CHAOSBED_SAFETY_ROUNDS
    /// - CHAOSBED_POLL_INTERVAL_MS
    /// - CHAOSBED_GAS_PRICE_WEI
    /// - CHAOSBED_CONTEXT_DIR
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Same as [`Self::apply_env_overrides`] with an explicit variable source.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("CHAOSBED_HEAL_TIMEOUT_SECS") {
            match v.parse::<u64>() {
                Ok(n) => self.heal_timeout_secs = n,
                Err(_) => warn!(value = %v, "Invalid CHAOSBED_HEAL_TIMEOUT_SECS, ignoring"),
            }
        }
        if let Some(v) = get("CHAOSBED_LIVENESS_WINDOW_SECS") {
            match v.parse::<u64>() {
                Ok(n) => self.liveness_window_secs = n,
                Err(_) => warn!(value = %v, "Invalid CHAOSBED_LIVENESS_WINDOW_SECS, ignoring"),
            }
        }
        if let Some(v) = get("CHAOSBED_SAFETY_ROUNDS") {
            match v.parse::<u32>() {
                Ok(n) => self.safety_rounds = n.max(1),
                Err(_) => warn!(value = %v, "Invalid CHAOSBED_SAFETY_ROUNDS, ignoring"),
            }
        }
        if let Some(v) = get("CHAOSBED_POLL_INTERVAL_MS") {
            match v.parse::<u64>() {
                Ok(n) => self.poll_interval_ms = n.max(1),
                Err(_) => warn!(value = %v, "Invalid CHAOSBED_POLL_INTERVAL_MS, ignoring"),
            }
        }
        if let Some(v) = get("CHAOSBED_GAS_PRICE_WEI") {
            match v.parse::<u64>() {
                Ok(n) => self.gas_price_wei = n,
                Err(_) => warn!(value = %v, "Invalid CHAOSBED_GAS_PRICE_WEI, ignoring"),
            }
        }
        if let Some(v) = get("CHAOSBED_CONTEXT_DIR") {
            self.context_dir = PathBuf::from(v);
        }
    }
}
