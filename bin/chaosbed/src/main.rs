#![allow(missing_docs)]
//! Fault-injection test runner

use std::process::ExitCode;

use chaosbed_cli::{
    args::{Args, Commands},
    cmd::{run::RunCmd, validate::ValidateCmd},
    logging, runtime,
};
use color_eyre::eyre::{Result, eyre};
use tracing::{info, trace};

/// Main entry point.
///
/// Parses the command line, initializes logging and dispatches to the
/// requested command. `run` exits with status 1 when any test case fails.
fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    // Also forward panics to tracing so they show up alongside the run logs.
    install_tracing_panic_hook();

    let args = Args::new();

    // This is a drop guard responsible for flushing any remaining logs when the program terminates.
    // It must be assigned to a binding that is not _, as _ will result in the guard being dropped
    // immediately.
    let _guard =
        logging::init(args.log_level.unwrap_or_default(), args.log_format.unwrap_or_default());

    trace!("Command-line parameters: {args:?}");

    match &args.command {
        Commands::Run(cmd) => run(&args, cmd),
        Commands::Validate(cmd) => validate(cmd),
    }
}

fn install_tracing_panic_hook() {
    use std::panic;

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let msg: &str = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "panic"
        };

        let bt = std::backtrace::Backtrace::force_capture();
        tracing::error!(target = "panic", %location, message = %msg, backtrace = %format!("{bt}"), "panic occurred");

        default_hook(info);
    }));
}

fn run(args: &Args, cmd: &RunCmd) -> Result<ExitCode> {
    let config = cmd.load_config()?;
    let rt = runtime::build_runtime(runtime::RuntimeConfig::from_worker_threads(
        args.worker_threads,
    ))?;

    info!(
        testbed = %cmd.testbed.display(),
        playbook = %cmd.playbook.display(),
        "Loaded configuration",
    );
    trace!(?config, "Configuration");

    let summary = rt
        .block_on(cmd.run(config))
        .map_err(|error| eyre!("Failed to run the playbook: {error:?}"))?;

    Ok(if summary.all_passed() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn validate(cmd: &ValidateCmd) -> Result<ExitCode> {
    cmd.run()?;
    Ok(ExitCode::SUCCESS)
}
