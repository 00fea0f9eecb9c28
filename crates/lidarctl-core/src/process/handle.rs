// ── Process handle ──
//
// One spawned external process. The handle owns the `Child`, so dropping
// the handle without stopping it would orphan the process; the supervisor
// is the only code that consumes handles.

use std::process::{Child, ExitStatus};

use chrono::{DateTime, Utc};

/// A long-running external process backing a subsystem.
#[derive(Debug)]
pub struct ProcessHandle {
    command_line: Vec<String>,
    pid: u32,
    launched_at: DateTime<Utc>,
    child: Child,
    exit: Option<ExitStatus>,
}

impl ProcessHandle {
    pub(crate) fn new(command_line: Vec<String>, child: Child) -> Self {
        Self {
            command_line,
            pid: child.id(),
            launched_at: Utc::now(),
            child,
            exit: None,
        }
    }

    pub fn command_line(&self) -> &[String] {
        &self.command_line
    }

    pub fn program(&self) -> &str {
        self.command_line.first().map_or("", String::as_str)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn launched_at(&self) -> DateTime<Utc> {
        self.launched_at
    }

    /// Exit status, once the process has been observed to exit.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    /// Non-blocking liveness probe. Reaps the child if it has exited.
    pub fn poll_alive(&mut self) -> bool {
        if self.exit.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.exit = Some(status);
                false
            }
            Err(e) => {
                tracing::warn!(pid = self.pid, error = %e, "liveness probe failed");
                false
            }
        }
    }

    /// Block until the process exits, recording the status.
    pub(crate) fn wait(&mut self) -> std::io::Result<ExitStatus> {
        if let Some(status) = self.exit {
            return Ok(status);
        }
        let status = self.child.wait()?;
        self.exit = Some(status);
        Ok(status)
    }

    /// Forceful kill of the direct child.
    pub(crate) fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill()
    }
}
