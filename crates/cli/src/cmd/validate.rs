use std::path::PathBuf;

use chaosbed_types::{Playbook, ScenarioError, TestBed};
use clap::Parser;
use color_eyre::eyre::{self, eyre};
use tracing::{error, info};

use crate::file;

#[derive(Parser, Debug, Clone, Default, PartialEq)]
pub struct ValidateCmd {
    /// Test bed description (YAML)
    #[clap(long)]
    pub testbed: PathBuf,

    /// Playbook to check (YAML)
    #[clap(long)]
    pub playbook: PathBuf,
}

impl ValidateCmd {
    /// Checks the regular and the long suite. Fails if any scenario is invalid.
    pub fn run(&self) -> eyre::Result<()> {
        let testbed = file::load_testbed(&self.testbed)?;
        let playbook = file::load_playbook(&self.playbook)?;

        let problems = check(&testbed, &playbook);
        for (name, e) in &problems {
            error!(scenario = %name, error = %e, "Invalid scenario");
        }

        let total = playbook.testcases.len() + playbook.long_testcases.len();
        if problems.is_empty() {
            info!(total, nodes = testbed.nodes.len(), "Every scenario is valid");
            Ok(())
        } else {
            Err(eyre!("{} of {total} scenarios are invalid", problems.len()))
        }
    }
}

/// Names and validation errors of every invalid scenario.
pub fn check(testbed: &TestBed, playbook: &Playbook) -> Vec<(String, ScenarioError)> {
    let members = testbed.members();
    playbook
        .testcases
        .iter()
        .chain(&playbook.long_testcases)
        .filter_map(|scenario| scenario.validate(&members).err().map(|e| (scenario.name.clone(), e)))
        .collect()
}
