//! Command handlers.
//!
//! `setup` and `client` run the interactive loop inside a [`Session`];
//! `status` and `config` are one-shot.

pub mod client;
pub mod config_cmd;
pub mod setup;
pub mod status;

use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use lidarctl_config::ConfigStore;
use lidarctl_core::{Orchestrator, OrchestratorConfig, Session, ShutdownHandle, ShutdownReport};

use crate::cli::GlobalOpts;
use crate::error::{CliError, exit_code};
use crate::interactive::{Interactive, Mode};
use crate::output;
use crate::prompt::DialoguerPrompter;

// ── Interactive session ─────────────────────────────────────────────

/// Run the menu loop on a blocking thread while a task waits for
/// termination signals. Whichever finishes first owns the shutdown
/// cascade; the session guarantees it runs once.
pub(crate) async fn run_session(
    mode: Mode,
    config: OrchestratorConfig,
    store: ConfigStore,
    profile_name: String,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let session = Session::new(Orchestrator::new(config));
    let signals = tokio::spawn(watch_signals(session.shutdown_handle()));
    let color = output::should_color(&global.color);

    info!(?mode, profile = %profile_name, "session started");
    let joined = tokio::task::spawn_blocking(move || {
        let mut prompter = DialoguerPrompter::new(color);
        let outcome = Interactive::new(&session, &mut prompter, &store, mode, profile_name).run();
        (outcome, session.close())
    })
    .await;
    signals.abort();

    let (outcome, report) = joined.map_err(|e| CliError::Prompt {
        reason: format!("interactive loop panicked: {e}"),
    })?;
    report_shutdown(report.as_ref(), global.quiet);
    outcome
}

async fn watch_signals(handle: ShutdownHandle) {
    let reason = wait_for_signal().await;
    warn!(signal = reason, "termination requested");
    let report = tokio::task::spawn_blocking(move || handle.shutdown(reason))
        .await
        .ok()
        .flatten();
    report_shutdown(report.as_ref(), false);
    std::process::exit(exit_code::INTERRUPTED);
}

async fn wait_for_signal() -> &'static str {
    let (Ok(mut term), Ok(mut hangup)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::hangup()),
    ) else {
        warn!("could not install SIGTERM/SIGHUP handlers, only Ctrl+C is watched");
        let _ = tokio::signal::ctrl_c().await;
        return "SIGINT";
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = term.recv() => "SIGTERM",
        _ = hangup.recv() => "SIGHUP",
    }
}

/// Log the teardown outcome and, unless quiet, summarise it on stderr.
fn report_shutdown(report: Option<&ShutdownReport>, quiet: bool) {
    let Some(report) = report else {
        return;
    };
    for (subsystem, error) in &report.failures {
        warn!(subsystem = %subsystem, error = %error, "subsystem did not stop cleanly");
    }
    if quiet || (report.stopped.is_empty() && report.is_clean()) {
        return;
    }
    let stopped: Vec<String> = report.stopped.iter().map(ToString::to_string).collect();
    if !stopped.is_empty() {
        eprintln!("Stopped {}", stopped.join(", "));
    }
    for (subsystem, error) in &report.failures {
        eprintln!("{subsystem} did not stop cleanly: {error}");
    }
}
