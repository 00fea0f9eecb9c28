// ── Process supervisor ──
//
// Spawns, probes and terminates the external processes behind each
// subsystem, and runs the short one-shot commands (power endpoint, `ip`,
// `docker`). Long-running children get their own process group so that
// termination reaches anything they fork, and so that a terminal interrupt
// aimed at the menu does not reach them behind the orchestrator's back.

use std::fs::{self, File, OpenOptions};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use super::handle::ProcessHandle;
use crate::error::CoreError;
use crate::model::Subsystem;

/// Default time a process gets to exit after `SIGTERM` before `SIGKILL`.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How a `stop` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process was already gone; nothing was sent.
    AlreadyExited,
    /// Exited within the grace period after `SIGTERM`.
    Terminated,
    /// Outlived the grace period and was killed.
    Killed,
}

/// Captured result of a one-shot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    grace_period: Duration,
    log_dir: Option<PathBuf>,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

impl ProcessSupervisor {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            grace_period,
            log_dir: None,
        }
    }

    /// Send subsystem stdout/stderr to `<dir>/<subsystem>.log` instead of
    /// discarding it.
    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    // ── Long-running processes ───────────────────────────────────────

    /// Spawn the process backing `subsystem` without waiting on it.
    pub fn start(
        &self,
        subsystem: Subsystem,
        command_line: &[String],
    ) -> Result<ProcessHandle, CoreError> {
        let (program, args) = split_command(command_line)?;

        let (stdout, stderr) = self.output_sinks(subsystem)?;
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0)
            .spawn()
            .map_err(|source| CoreError::Spawn {
                program: program.clone(),
                source,
            })?;

        let handle = ProcessHandle::new(command_line.to_vec(), child);
        info!(
            subsystem = %subsystem,
            pid = handle.pid(),
            command = %command_line.join(" "),
            "process launched"
        );
        Ok(handle)
    }

    /// Terminate the process and everything in its group, escalating to
    /// `SIGKILL` after the grace period. When the leader has already
    /// exited, whatever it left behind in the group is killed outright.
    pub fn stop(&self, handle: &mut ProcessHandle) -> Result<StopOutcome, CoreError> {
        let pid = handle.pid();
        if !handle.poll_alive() {
            debug!(pid, "stop requested for exited process");
            kill_leftover_group(pid);
            return Ok(StopOutcome::AlreadyExited);
        }

        send_group_signal(pid, Signal::SIGTERM)?;

        let deadline = Instant::now() + self.grace_period;
        let mut leader_exited = false;
        while Instant::now() < deadline {
            leader_exited = leader_exited || !handle.poll_alive();
            if leader_exited && !group_alive(pid) {
                info!(pid, "process terminated");
                return Ok(StopOutcome::Terminated);
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        if leader_exited {
            // The leader is reaped, so only the group is signalled: its pid
            // may already belong to an unrelated process.
            warn!(pid, grace = ?self.grace_period, "group outlived its leader, killing");
            kill_leftover_group(pid);
            return Ok(StopOutcome::Killed);
        }

        warn!(pid, grace = ?self.grace_period, "grace period elapsed, killing");
        if let Err(e) = send_group_signal(pid, Signal::SIGKILL) {
            debug!(pid, error = %e, "group kill failed, killing child directly");
        }
        match handle.kill() {
            Ok(()) => {}
            // Already reaped between the group kill and here.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e.into()),
        }
        handle.wait()?;
        Ok(StopOutcome::Killed)
    }

    /// Non-blocking liveness probe.
    pub fn is_alive(&self, handle: &mut ProcessHandle) -> bool {
        handle.poll_alive()
    }

    // ── One-shot commands ────────────────────────────────────────────

    /// Run a short-lived command to completion, capturing its output.
    pub fn run_once(&self, command_line: &[String]) -> Result<CommandOutput, CoreError> {
        let (program, args) = split_command(command_line)?;
        debug!(command = %command_line.join(" "), "running one-shot command");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| CoreError::Spawn {
                program: program.clone(),
                source,
            })?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        };

        if output.status.success() {
            Ok(result)
        } else {
            warn!(
                command = %command_line.join(" "),
                exit_code = result.exit_code,
                stderr = %result.stderr,
                "one-shot command failed"
            );
            Err(CoreError::CommandFailed {
                command: command_line.join(" "),
                exit_code: result.exit_code,
                stderr: result.stderr,
            })
        }
    }

    /// Run a command attached to the caller's terminal (image builds,
    /// container shells) and wait for it.
    pub fn run_attached(&self, command_line: &[String]) -> Result<(), CoreError> {
        let (program, args) = split_command(command_line)?;
        info!(command = %command_line.join(" "), "running attached command");

        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|source| CoreError::Spawn {
                program: program.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(CoreError::CommandFailed {
                command: command_line.join(" "),
                exit_code: status.code().unwrap_or(-1),
                stderr: String::new(),
            })
        }
    }

    fn output_sinks(&self, subsystem: Subsystem) -> Result<(Stdio, Stdio), CoreError> {
        let Some(dir) = &self.log_dir else {
            return Ok((Stdio::null(), Stdio::null()));
        };
        fs::create_dir_all(dir)?;
        let file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("{}.log", subsystem.slug())))?;
        let err = file.try_clone()?;
        Ok((Stdio::from(file), Stdio::from(err)))
    }
}

fn split_command(command_line: &[String]) -> Result<(&String, &[String]), CoreError> {
    command_line
        .split_first()
        .filter(|(program, _)| !program.trim().is_empty())
        .ok_or_else(|| CoreError::Validation {
            field: "command line".into(),
            reason: "no program given".into(),
        })
}

/// Signal the process group led by `pid`, falling back to the process
/// itself when the group is already gone.
fn send_group_signal(pid: u32, sig: Signal) -> Result<(), CoreError> {
    let raw = i32::try_from(pid).map_err(|_| CoreError::Signal {
        pid,
        reason: "pid out of range".into(),
    })?;
    let target = Pid::from_raw(raw);
    let sent = match signal::killpg(target, sig) {
        Err(Errno::ESRCH) => signal::kill(target, sig),
        other => other,
    };
    match sent {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(CoreError::Signal {
            pid,
            reason: e.to_string(),
        }),
    }
}

/// Whether any process is left in the group led by `pid`.
fn group_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    matches!(
        signal::killpg(Pid::from_raw(raw), None),
        Ok(()) | Err(Errno::EPERM)
    )
}

/// `SIGKILL` whatever remains of a group whose leader is gone.
fn kill_leftover_group(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match signal::killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => info!(pid, "killed processes left in the group"),
        Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid, error = %e, "could not kill leftover group"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Gone, or a zombie nobody has reaped yet.
    fn is_dead(pid: &str) -> bool {
        match fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            Err(_) => true,
        }
    }

    fn eventually(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        done()
    }

    fn read_pid(path: &Path) -> String {
        let written = || fs::read_to_string(path).is_ok_and(|s| s.ends_with('\n'));
        assert!(eventually(written));
        fs::read_to_string(path).unwrap().trim().to_owned()
    }

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_string()).collect()
    }

    fn quick() -> ProcessSupervisor {
        ProcessSupervisor::new(Duration::from_millis(500))
    }

    #[test]
    fn start_and_stop_long_running_process() {
        let sup = quick();
        let mut handle = sup
            .start(Subsystem::Streaming, &argv(&["sleep", "30"]))
            .unwrap();
        assert!(sup.is_alive(&mut handle));
        assert_eq!(handle.program(), "sleep");

        let outcome = sup.stop(&mut handle).unwrap();
        assert_eq!(outcome, StopOutcome::Terminated);
        assert!(!sup.is_alive(&mut handle));
    }

    #[test]
    fn stop_is_idempotent() {
        let sup = quick();
        let mut handle = sup
            .start(Subsystem::Recording, &argv(&["sleep", "30"]))
            .unwrap();
        sup.stop(&mut handle).unwrap();
        assert_eq!(sup.stop(&mut handle).unwrap(), StopOutcome::AlreadyExited);
    }

    #[test]
    fn stop_escalates_when_term_is_ignored() {
        let sup = ProcessSupervisor::new(Duration::from_millis(200));
        let mut handle = sup
            .start(
                Subsystem::Playback,
                &argv(&["sh", "-c", "trap '' TERM; while :; do sleep 0.05; done"]),
            )
            .unwrap();
        // Give the shell time to install the trap.
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(sup.stop(&mut handle).unwrap(), StopOutcome::Killed);
        assert!(!sup.is_alive(&mut handle));
    }

    #[test]
    fn stop_after_leader_exit_kills_its_background_children() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("child.pid");
        let sup = quick();
        let mut handle = sup
            .start(
                Subsystem::Streaming,
                &argv(&[
                    "sh",
                    "-c",
                    r#"sleep 30 & echo $! > "$0"; exit 1"#,
                    pidfile.to_str().unwrap(),
                ]),
            )
            .unwrap();
        let child = read_pid(&pidfile);
        assert!(eventually(|| !sup.is_alive(&mut handle)));
        assert!(!is_dead(&child));

        assert_eq!(sup.stop(&mut handle).unwrap(), StopOutcome::AlreadyExited);
        assert!(eventually(|| is_dead(&child)));
    }

    #[test]
    fn group_member_ignoring_term_is_killed_after_leader_exits() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("child.pid");
        let sup = quick();
        let mut handle = sup
            .start(
                Subsystem::Recording,
                &argv(&[
                    "sh",
                    "-c",
                    r#"trap '' TERM; sleep 30 & echo $! > "$0"; trap - TERM; wait"#,
                    pidfile.to_str().unwrap(),
                ]),
            )
            .unwrap();
        let child = read_pid(&pidfile);

        assert_eq!(sup.stop(&mut handle).unwrap(), StopOutcome::Killed);
        assert!(!sup.is_alive(&mut handle));
        assert!(eventually(|| is_dead(&child)));
    }

    #[test]
    fn crashed_process_is_detected() {
        let sup = quick();
        let mut handle = sup
            .start(Subsystem::Streaming, &argv(&["sh", "-c", "exit 4"]))
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while sup.is_alive(&mut handle) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(!sup.is_alive(&mut handle));
        assert_eq!(handle.exit_status().unwrap().code(), Some(4));
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let err = quick()
            .start(Subsystem::Streaming, &argv(&["/nonexistent/lidar-bridge"]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Spawn { .. }));
    }

    #[test]
    fn empty_command_line_is_rejected() {
        let err = quick().run_once(&[]).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[test]
    fn run_once_captures_output() {
        let out = quick()
            .run_once(&argv(&["sh", "-c", "echo hello"]))
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.exit_code, 0);
    }

    #[test]
    fn run_once_reports_nonzero_exit() {
        let err = quick()
            .run_once(&argv(&["sh", "-c", "echo nope >&2; exit 3"]))
            .unwrap_err();
        match err {
            CoreError::CommandFailed {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn subsystem_output_goes_to_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sup = quick().with_log_dir(dir.path());
        let mut handle = sup
            .start(
                Subsystem::Recording,
                &argv(&["sh", "-c", "echo frames; sleep 30"]),
            )
            .unwrap();
        let log = dir.path().join("recording.log");
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if fs::read_to_string(&log).is_ok_and(|s| s.contains("frames")) {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        sup.stop(&mut handle).unwrap();
        assert!(fs::read_to_string(&log).unwrap().contains("frames"));
    }
}
