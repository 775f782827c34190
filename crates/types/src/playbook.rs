use serde::{Deserialize, Serialize};

use crate::scenario::Scenario;

/// Ordered list of scenarios run against one test bed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playbook {
    /// Operator kill switch, re-read between cases.
    #[serde(default)]
    pub stop: bool,
    #[serde(default)]
    pub testcases: Vec<Scenario>,
    #[serde(default)]
    pub long_testcases: Vec<Scenario>,
}

impl Playbook {
    /// Scenarios to run: the long suite when `long` is set, the regular one otherwise.
    pub fn cases(&self, long: bool) -> &[Scenario] {
        if long { &self.long_testcases } else { &self.testcases }
    }
}
