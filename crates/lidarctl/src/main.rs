mod cli;
mod commands;
mod config;
mod error;
mod interactive;
mod output;
mod prompt;

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::error::{CliError, exit_code};

const LOG_FILE_NAME: &str = "lidarctl.log";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Interactive sessions log to a file; held until exit so it flushes.
    let log_guard = init_tracing(&cli);

    let code = match run(cli).await {
        Ok(()) => exit_code::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    drop(log_guard);
    std::process::exit(code);
}

/// `RUST_LOG` wins; otherwise `-v` raises the level from `warn`.
///
/// The menu owns the terminal during `setup` and `client`, so those log to
/// a file; everything else logs to stderr.
fn init_tracing(cli: &Cli) -> Option<WorkerGuard> {
    let level = match cli.global.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if !matches!(cli.command, Command::Setup | Command::Client(_)) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
        return None;
    }

    let path = cli
        .global
        .log_file
        .clone()
        .unwrap_or_else(|| config::paths(&cli.global).state_dir().join(LOG_FILE_NAME));
    let appender = match file_appender(&path) {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!("warning: cannot log to {}: {e}", path.display());
            return None;
        }
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true),
        )
        .init();

    Some(guard)
}

fn file_appender(path: &Path) -> Result<RollingFileAppender, String> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(LOG_FILE_NAME);
    std::fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .map_err(|e| e.to_string())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    tracing::debug!(command = ?cli.command, "dispatching command");
    match cli.command {
        Command::Setup => commands::setup::handle(&cli.global).await,
        Command::Client(args) => commands::client::handle(args, &cli.global).await,
        Command::Status(args) => commands::status::handle(&args, &cli.global),
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "lidarctl", &mut std::io::stdout());
            Ok(())
        }
    }
}
