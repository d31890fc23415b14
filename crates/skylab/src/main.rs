mod app;
mod cli;
mod env;
mod lease;
mod release;

use std::process::ExitCode;

use clap::Parser;
use skylab_model::ModelError;
use skylab_observe::{LoggerConfig, LoggerTimeZone, init_local_offset, init_logger};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cli::{Cli, Command, normalize_args};

const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 2;

fn main() -> ExitCode {
    let args = std::env::args_os().map(|a| a.to_string_lossy().into_owned());
    let cli = match Cli::try_parse_from(normalize_args(args)) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(EXIT_USAGE));
        }
    };

    // The local offset can only be read while the process is single-threaded.
    if cli.global.log_tz == LoggerTimeZone::Local {
        init_local_offset();
    }
    let cfg = LoggerConfig {
        format: cli.global.log_format,
        level: cli.global.log_level.clone(),
        tz: cli.global.log_tz,
        ..Default::default()
    };
    if let Err(e) = init_logger(&cfg) {
        eprintln!("skylab: {e}");
        return ExitCode::from(EXIT_FAILURE);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("skylab: start runtime: {e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    match runtime.block_on(run(&cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("skylab: {e}");
            let code = exit_code(&e);
            if code == EXIT_USAGE {
                eprintln!("run 'skylab {} --help' for usage", command_name(&cli.command));
            }
            ExitCode::from(code)
        }
    }
}

/// Invalid input detected before any remote call is a usage error.
///
/// Only a bare `ModelError` counts; one wrapped by the core surfaced from a
/// remote answer and is an ordinary failure.
fn exit_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ModelError>().is_some() {
        EXIT_USAGE
    } else {
        EXIT_FAILURE
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling");
            on_signal.cancel();
        }
    });

    match &cli.command {
        Command::LeaseDut(args) => lease::run(&cli.global, args, &cancel).await,
        Command::ReleaseDuts(args) => release::run(&cli.global, args, &cancel).await,
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::LeaseDut(_) => "lease-dut",
        Command::ReleaseDuts(_) => "release-duts",
    }
}
