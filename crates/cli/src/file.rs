#![allow(missing_docs)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use chaosbed_engine::EngineConfig;
use chaosbed_types::{FailureContext, Playbook, TestBed};
use serde::de::DeserializeOwned;

use crate::error::Error;

/// Name of the snapshot written into each failed case's directory.
pub const CONTEXT_FILE: &str = "test_case_context.yaml";

/// Load the engine configuration, or its defaults when no file is given.
///
/// Environment overrides are applied in both cases.
pub fn load_config(config_file: Option<&Path>) -> Result<EngineConfig, Error> {
    let mut config = match config_file {
        Some(path) => {
            let content = read(path)?;
            toml::from_str(&content)
                .map_err(|e| Error::Parse { path: path.to_path_buf(), reason: e.to_string() })?
        }
        None => EngineConfig::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

/// Load and validate a test bed description.
pub fn load_testbed(testbed_file: &Path) -> Result<TestBed, Error> {
    let testbed: TestBed = load_yaml(testbed_file)?;
    testbed
        .validate()
        .map_err(|source| Error::TestBed { path: testbed_file.to_path_buf(), source })?;
    Ok(testbed)
}

pub fn load_playbook(playbook_file: &Path) -> Result<Playbook, Error> {
    load_yaml(playbook_file)
}

/// Persist a failure snapshot to `<dir>/failed_<id>_context/test_case_context.yaml`.
///
/// Characters of `id` that could leave `dir` (separators and the like) are
/// replaced with `_`.
pub fn save_failure_context(
    dir: &Path,
    id: &str,
    context: &FailureContext,
) -> Result<PathBuf, Error> {
    let path = dir.join(format!("failed_{}_context", path_safe(id))).join(CONTEXT_FILE);
    let yaml = serde_yaml::to_string(context).map_err(|e| Error::ToYaml(e.to_string()))?;
    save(&path, &yaml)?;
    Ok(path)
}

fn path_safe(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let content = read(path)?;
    serde_yaml::from_str(&content)
        .map_err(|e| Error::Parse { path: path.to_path_buf(), reason: e.to_string() })
}

fn read(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|_| Error::OpenFile(path.to_path_buf()))
}

fn save(path: &Path, data: &str) -> Result<(), Error> {
    use std::io::Write;

    if let Some(parent_dir) = path.parent() {
        fs::create_dir_all(parent_dir).map_err(|_| Error::ParentDir(parent_dir.to_path_buf()))?;
    }

    let mut f = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|_| Error::OpenFile(path.to_path_buf()))?;

    f.write_all(data.as_bytes()).map_err(|_| Error::WriteFile(path.to_path_buf()))?;

    Ok(())
}
