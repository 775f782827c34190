#![forbid(unsafe_code)]
#![deny(trivial_casts, trivial_numeric_casts)]
#![allow(missing_docs)]

//! Shared data model for chaosbed: scenarios and their disaster timelines,
//! the test bed description, and the records a test case produces.

pub mod constants;
pub mod latency;
pub mod ledger;
pub mod node_id;
pub mod playbook;
pub mod result;
pub mod scenario;
pub mod testbed;

pub use latency::LatencyMeta;
pub use ledger::{TxLedger, TxRecord};
pub use node_id::NodeId;
pub use playbook::Playbook;
pub use result::{FailureContext, TestCaseResult};
pub use scenario::{Condition, DisasterStep, Scenario, ScenarioError, Workload};
pub use testbed::{LifecycleCommands, NodeSpec, TestBed, TestBedError};
