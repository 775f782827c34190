use std::time::Duration;

use async_trait::async_trait;
use chaosbed_types::LifecycleCommands;
use color_eyre::eyre;

use crate::{command, error::ClientError};

/// Process-level control of a node.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn stop(&self) -> eyre::Result<()>;
    async fn start(&self) -> eyre::Result<()>;
    /// Stop, wipe chain data, start from genesis.
    async fn redeploy(&self) -> eyre::Result<()>;
}

/// Runs the argv vectors configured in the test bed.
#[derive(Clone, Debug)]
pub struct CommandLifecycle {
    commands: LifecycleCommands,
    timeout: Duration,
}

impl CommandLifecycle {
    pub fn new(commands: LifecycleCommands, timeout: Duration) -> Self {
        Self { commands, timeout }
    }

    async fn run(&self, name: &'static str, argv: &[String]) -> eyre::Result<()> {
        if argv.is_empty() {
            return Err(ClientError::EmptyCommand(name).into());
        }
        command::run_checked(argv, self.timeout).await
    }
}

#[async_trait]
impl Lifecycle for CommandLifecycle {
    async fn stop(&self) -> eyre::Result<()> {
        self.run("stop", &self.commands.stop).await
    }

    async fn start(&self) -> eyre::Result<()> {
        self.run("start", &self.commands.start).await
    }

    async fn redeploy(&self) -> eyre::Result<()> {
        self.run("redeploy", &self.commands.redeploy).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_command_is_reported() {
        let lifecycle = CommandLifecycle::new(LifecycleCommands::default(), Duration::from_secs(1));
        let err = lifecycle.redeploy().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ClientError>(),
            Some(ClientError::EmptyCommand("redeploy"))
        ));
    }
}
