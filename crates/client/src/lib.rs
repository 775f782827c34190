#![forbid(unsafe_code)]

//! Control and query surface of a single cluster member.
//!
//! The engine only talks to [`NodeHandle`]s. [`RemoteNode`] is the concrete
//! handle for a real test bed: chain queries go over JSON-RPC, link
//! impairments are rendered to `iptables`/`tc` commands and lifecycle
//! operations run operator-supplied argv vectors.

pub mod command;
pub mod error;
pub mod eth_rpc;
pub mod handle;
pub mod lifecycle;
pub mod link;
pub mod poll;
pub mod remote;
pub mod transport;

pub use error::ClientError;
pub use eth_rpc::EthRpcClient;
pub use handle::{Disruption, NodeHandle, TxReceipt};
pub use lifecycle::{CommandLifecycle, Lifecycle};
pub use link::{CommandLinkControl, LinkControl, LinkEffect};
pub use poll::poll_until;
pub use remote::RemoteNode;
