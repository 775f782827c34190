//! Shared helpers used by chaosbed's unit and integration tests.
//!
//! [`MockCluster`] simulates a replicated ledger in memory: blocks are
//! produced on the tokio clock while a quorum of members runs, so tests can
//! drive whole scenarios under `start_paused` time.

pub mod fixtures;
pub mod mock_cluster;

pub use mock_cluster::{MockCluster, MockNode};
