//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a stable exit code.

use miette::Diagnostic;
use thiserror::Error;

use lidarctl_config::ConfigError;
use lidarctl_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const PROCESS: i32 = 7;
    pub const INTERRUPTED: i32 = 130;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Processes ────────────────────────────────────────────────────
    #[error("Could not launch '{program}': {reason}")]
    #[diagnostic(
        code(lidarctl::spawn),
        help(
            "Check that '{program}' is installed and on PATH, or point the\n\
             matching *_program setting in config.toml at it."
        )
    )]
    Spawn { program: String, reason: String },

    #[error("'{command}' exited with code {exit_code}")]
    #[diagnostic(code(lidarctl::command_failed), help("{stderr}"))]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("{message}")]
    #[diagnostic(
        code(lidarctl::cascade_aborted),
        help("Subsystems started before the failure are still running. Cause: {cause}")
    )]
    CascadeAborted { message: String, cause: String },

    #[error("Could not signal process {pid}: {reason}")]
    #[diagnostic(code(lidarctl::signal))]
    Signal { pid: u32, reason: String },

    // ── Orchestration ────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(lidarctl::conflict),
        help("Run: lidarctl status to see what is running")
    )]
    Conflict { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found")]
    #[diagnostic(
        code(lidarctl::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: lidarctl config save <name>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(lidarctl::validation))]
    Validation { field: String, reason: String },

    #[error("Could not read {what}: {reason}")]
    #[diagnostic(
        code(lidarctl::config),
        help("Fix or remove the file, then retry.")
    )]
    Config { what: String, reason: String },

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Interrupted")]
    #[diagnostic(code(lidarctl::interrupted))]
    Interrupted,

    #[error("Prompt failed: {reason}")]
    #[diagnostic(
        code(lidarctl::prompt),
        help("Interactive commands need a terminal on stdin and stderr.")
    )]
    Prompt { reason: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render JSON: {0}")]
    #[diagnostic(code(lidarctl::json))]
    Json(#[from] serde_json::Error),

    #[error("Could not render YAML: {0}")]
    #[diagnostic(code(lidarctl::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Spawn { .. } | Self::CommandFailed { .. } | Self::CascadeAborted { .. } => {
                exit_code::PROCESS
            }
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } => exit_code::USAGE,
            Self::Interrupted => exit_code::INTERRUPTED,
            _ => exit_code::GENERAL,
        }
    }

    /// Map a dialoguer failure; Ctrl+C in raw mode surfaces as an
    /// interrupted read.
    pub fn from_prompt(err: dialoguer::Error) -> Self {
        match err {
            dialoguer::Error::IO(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                Self::Interrupted
            }
            dialoguer::Error::IO(e) => Self::Prompt {
                reason: e.to_string(),
            },
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Spawn { program, source } => CliError::Spawn {
                program,
                reason: source.to_string(),
            },

            CoreError::CommandFailed {
                command,
                exit_code,
                stderr,
            } => CliError::CommandFailed {
                command,
                exit_code,
                stderr: if stderr.is_empty() {
                    "The command printed nothing on stderr.".into()
                } else {
                    stderr
                },
            },

            CoreError::Signal { pid, reason } => CliError::Signal { pid, reason },

            err @ CoreError::CascadeAborted { .. } => CliError::CascadeAborted {
                message: err.to_string(),
                cause: err.root_cause().to_string(),
            },

            err @ (CoreError::InvariantViolation { .. } | CoreError::IllegalTransition { .. }) => {
                CliError::Conflict {
                    message: err.to_string(),
                }
            }

            CoreError::Validation { field, reason } => CliError::Validation { field, reason },

            CoreError::Io(e) => CliError::Io(e),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProfileNotFound { name, available } => CliError::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            },

            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },

            ConfigError::Serialization(e) => CliError::Config {
                what: "profile".into(),
                reason: e.to_string(),
            },

            ConfigError::Deserialization { path, source } => CliError::Config {
                what: path.display().to_string(),
                reason: source.to_string(),
            },

            ConfigError::Figment(e) => CliError::Config {
                what: "config.toml".into(),
                reason: e.to_string(),
            },

            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        let spawn: CliError = CoreError::Spawn {
            program: "voyant_foxglove_bridge".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
        .into();
        assert_eq!(spawn.exit_code(), exit_code::PROCESS);

        let conflict: CliError = CoreError::InvariantViolation {
            message: "Power is Starting".into(),
        }
        .into();
        assert_eq!(conflict.exit_code(), exit_code::CONFLICT);

        let missing: CliError = ConfigError::ProfileNotFound {
            name: "lab".into(),
            available: Vec::new(),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::NOT_FOUND);

        assert_eq!(CliError::Interrupted.exit_code(), exit_code::INTERRUPTED);
    }

    #[test]
    fn cascade_failure_keeps_its_root_cause() {
        let err: CliError = CoreError::CascadeAborted {
            failed: lidarctl_core::Subsystem::Streaming,
            verb: "start",
            source: Box::new(CoreError::CommandFailed {
                command: "voyant_lidar_client --endpoint start".into(),
                exit_code: 2,
                stderr: "no device".into(),
            }),
        }
        .into();
        match err {
            CliError::CascadeAborted { message, cause } => {
                assert!(message.starts_with("Streaming failed to start"));
                assert!(cause.contains("no device"));
            }
            other => panic!("unexpected mapping: {other}"),
        }
    }
}
