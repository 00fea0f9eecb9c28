// ── Core error types ──
//
// Errors surfaced by the orchestrator. Reachability is deliberately not
// here: a device that does not answer is a status flag, not a failure.

use thiserror::Error;

use crate::model::{Subsystem, SubsystemState};

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Process errors ───────────────────────────────────────────────
    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Failed to signal process {pid}: {reason}")]
    Signal { pid: u32, reason: String },

    // ── Orchestration errors ─────────────────────────────────────────
    #[error("{subsystem} cannot go from {from} to {to}")]
    IllegalTransition {
        subsystem: Subsystem,
        from: SubsystemState,
        to: SubsystemState,
    },

    #[error("Invariant violation: {message}")]
    InvariantViolation { message: String },

    #[error("{failed} failed to {verb}; remaining cascade steps were skipped")]
    CascadeAborted {
        failed: Subsystem,
        verb: &'static str,
        #[source]
        source: Box<CoreError>,
    },

    // ── Input errors ─────────────────────────────────────────────────
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// The innermost error of a cascade abort, or `self` for anything else.
    pub fn root_cause(&self) -> &CoreError {
        match self {
            Self::CascadeAborted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether this error was raised before any process was touched.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvariantViolation { .. } | Self::IllegalTransition { .. } | Self::Validation { .. }
        )
    }
}
