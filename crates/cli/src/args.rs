//! Command-line arguments.

use core::fmt;

use clap::{Parser, Subcommand, ValueEnum};

use crate::cmd::{run::RunCmd, validate::ValidateCmd};

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "chaosbed", version, about = "Fault-injection test runner for replicated ledger clusters")]
pub struct Args {
    /// Log level
    #[arg(long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Log format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Tokio worker threads, 1 for a single-threaded runtime
    #[arg(long, global = true, env = "CHAOSBED_WORKER_THREADS")]
    pub worker_threads: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run every scenario of a playbook against a test bed
    Run(RunCmd),

    /// Check a playbook against a test bed without touching the cluster
    Validate(ValidateCmd),
}

impl Args {
    pub fn new() -> Self {
        Self::parse()
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(level)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plaintext,
    Json,
}
