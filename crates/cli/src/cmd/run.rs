use std::{path::PathBuf, sync::Arc};

use chaosbed_client::{NodeHandle, RemoteNode};
use chaosbed_engine::{Cluster, EngineConfig, RunSummary, TestCase};
use chaosbed_types::{Scenario, TestBed};
use clap::Parser;
use color_eyre::eyre::{self, WrapErr};
use tracing::{error, info, warn};

use crate::file;

#[derive(Parser, Debug, Clone, Default, PartialEq)]
pub struct RunCmd {
    /// Test bed description (YAML)
    #[clap(long)]
    pub testbed: PathBuf,

    /// Playbook listing the scenarios to run (YAML)
    #[clap(long)]
    pub playbook: PathBuf,

    /// Engine configuration (TOML); defaults apply when omitted
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Run the long test cases instead of the regular ones
    #[clap(long)]
    pub long: bool,
}

impl RunCmd {
    pub fn load_config(&self) -> eyre::Result<EngineConfig> {
        file::load_config(self.config.as_deref()).wrap_err("Failed to load engine configuration")
    }

    /// Runs every scenario of the playbook in order and returns the tally.
    pub async fn run(&self, config: EngineConfig) -> eyre::Result<RunSummary> {
        let testbed = file::load_testbed(&self.testbed)?;
        let playbook = file::load_playbook(&self.playbook)?;
        let cluster = connect(&testbed)?;

        info!(
            nodes = cluster.len(),
            cases = playbook.cases(self.long).len(),
            long = self.long,
            "Loaded playbook"
        );

        let summary = run_cases(&cluster, &config, playbook.cases(self.long), || {
            // The operator may flip the flag while a long run is in progress.
            match file::load_playbook(&self.playbook) {
                Ok(playbook) => playbook.stop,
                Err(e) => {
                    warn!(error = %e, "Cannot re-read the playbook, continuing");
                    false
                }
            }
        })
        .await;

        for line in summary.to_string().lines() {
            info!("{line}");
        }
        Ok(summary)
    }
}

/// Builds a node handle for every test bed member.
pub fn connect(testbed: &TestBed) -> eyre::Result<Cluster> {
    let nodes = testbed
        .nodes
        .iter()
        .map(|spec| {
            RemoteNode::from_spec(spec)
                .map(|node| Arc::new(node) as Arc<dyn NodeHandle>)
                .wrap_err_with(|| format!("Failed to set up node {}", spec.index))
        })
        .collect::<eyre::Result<Vec<_>>>()?;
    Ok(Cluster::new(nodes))
}

/// Runs `cases` one after another until they are exhausted or `stop_requested` says so.
pub async fn run_cases(
    cluster: &Cluster,
    config: &EngineConfig,
    cases: &[Scenario],
    stop_requested: impl Fn() -> bool,
) -> RunSummary {
    let mut summary = RunSummary::default();

    for scenario in cases {
        if stop_requested() {
            warn!(remaining = cases.len() - summary.total(), "Playbook stop flag set, halting the run");
            break;
        }

        let outcome = TestCase::new(scenario.clone(), cluster.clone(), config.clone()).run().await;

        if let Some(report) = &outcome.report {
            report.log();
        }
        if let Some(context) = &outcome.context {
            match file::save_failure_context(&config.context_dir, scenario.id(), context) {
                Ok(path) => info!(path = %path.display(), "Saved failure context"),
                Err(e) => error!(error = %e, "Failed to save failure context"),
            }
        }
        summary.record(&scenario.name, outcome.passed());
    }

    summary
}
