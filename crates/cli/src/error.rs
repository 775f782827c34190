use std::path::PathBuf;

use chaosbed_types::TestBedError;
use thiserror::Error;

/// Error type for the command-line front end.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Error opening file: {}", .0.display())]
    OpenFile(PathBuf),

    #[error("Error writing file: {}", .0.display())]
    WriteFile(PathBuf),

    #[error("Error creating parent directory: {}", .0.display())]
    ParentDir(PathBuf),

    #[error("Error parsing {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Error serializing to YAML: {0}")]
    ToYaml(String),

    #[error("Invalid test bed {}: {source}", .path.display())]
    TestBed { path: PathBuf, source: TestBedError },
}
