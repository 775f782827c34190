//! Network impairment of a node's links.

use std::time::Duration;

use async_trait::async_trait;
use chaosbed_types::LatencyMeta;
use color_eyre::eyre;

use crate::command;

/// A change to a node's network links.
#[derive(Clone, Debug, PartialEq)]
pub enum LinkEffect {
    /// Drop every packet arriving from `host`.
    Partition { host: String },
    /// Remove a drop rule installed by [`LinkEffect::Partition`].
    Reconnect { host: String },
    /// Impair outgoing traffic.
    Delay(LatencyMeta),
    ClearDelay,
}

#[async_trait]
pub trait LinkControl: Send + Sync {
    async fn apply(&self, effect: &LinkEffect) -> eyre::Result<()>;

    /// Whether traffic from `host` is currently dropped.
    async fn is_partitioned(&self, host: &str) -> eyre::Result<bool>;
}

/// Drives `iptables` and `tc netem` on the node's host.
#[derive(Clone, Debug)]
pub struct CommandLinkControl {
    exec: Vec<String>,
    interface: String,
    timeout: Duration,
}

impl CommandLinkControl {
    pub fn new(exec: Vec<String>, interface: impl Into<String>, timeout: Duration) -> Self {
        Self { exec, interface: interface.into(), timeout }
    }

    /// Full argv, exec prefix included, that realises `effect`.
    pub fn render(&self, effect: &LinkEffect) -> Vec<String> {
        let argv: Vec<String> = match effect {
            LinkEffect::Partition { host } => drop_rule("-A", host),
            LinkEffect::Reconnect { host } => drop_rule("-D", host),
            LinkEffect::Delay(meta) => {
                let mut argv =
                    strings(&["tc", "qdisc", "add", "dev", self.interface.as_str(), "root", "netem"]);
                argv.extend([
                    "delay".to_string(),
                    format!("{}ms", meta.delay_ms),
                    "loss".to_string(),
                    format!("{}%", meta.loss_pct),
                    "duplicate".to_string(),
                    format!("{}%", meta.duplicate_pct),
                    "reorder".to_string(),
                    format!("{}%", meta.reorder_pct),
                    "corrupt".to_string(),
                    format!("{}%", meta.corrupt_pct),
                ]);
                argv
            }
            LinkEffect::ClearDelay => {
                strings(&["tc", "qdisc", "del", "dev", self.interface.as_str(), "root", "netem"])
            }
        };
        command::on_host(&self.exec, argv)
    }
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn drop_rule(op: &str, host: &str) -> Vec<String> {
    strings(&["iptables", op, "INPUT", "-s", host, "-j", "DROP"])
}

#[async_trait]
impl LinkControl for CommandLinkControl {
    async fn apply(&self, effect: &LinkEffect) -> eyre::Result<()> {
        command::run_checked(&self.render(effect), self.timeout).await
    }

    async fn is_partitioned(&self, host: &str) -> eyre::Result<bool> {
        let argv = command::on_host(&self.exec, drop_rule("-C", host));
        let output = command::run(&argv, self.timeout).await?;
        Ok(output.status.success())
    }
}
