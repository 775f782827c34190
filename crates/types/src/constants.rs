//! Default timings and amounts shared across chaosbed crates.

/// How long the cluster gets to converge after recovery before a test case fails.
pub const HEAL_TIMEOUT_SECS: u64 = 5 * 60;

/// Observation window for the liveness check.
pub const LIVENESS_WINDOW_SECS: u64 = 60;

/// Number of sampling rounds of the block-hash agreement check.
pub const SAFETY_ROUNDS: u32 = 2;

/// Resolution of every polling loop in the engine.
pub const POLL_INTERVAL_MS: u64 = 1_000;

/// Gap between two workload transactions.
pub const TX_INTERVAL_MS: u64 = 1_000;

/// Gas price attached to workload transactions.
pub const DEFAULT_GAS_PRICE_WEI: u64 = 5_000;

