// ── Session guard ──
//
// Owns the orchestrator for the lifetime of an interactive session and
// guarantees the shutdown cascade runs exactly once on every exit path:
// normal quit, an error unwinding out of the loop, or a termination
// signal handled on another thread via `ShutdownHandle`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::graph::ShutdownReport;
use crate::network::{IpCommand, LinkControl};
use crate::orchestrator::Orchestrator;

struct Shared<L> {
    orchestrator: Mutex<Orchestrator<L>>,
    finished: AtomicBool,
}

impl<L: LinkControl> Shared<L> {
    fn lock(&self) -> MutexGuard<'_, Orchestrator<L>> {
        // A panic mid-cascade must not stop cleanup from reaching the model.
        self.orchestrator
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Run the shutdown cascade unless it already ran.
    fn finish(&self, reason: &str) -> Option<ShutdownReport> {
        // Holding the lock first waits out any cascade in flight.
        let mut orchestrator = self.lock();
        if self.finished.swap(true, Ordering::SeqCst) {
            return None;
        }
        info!(reason, "session ending, stopping subsystems");
        let report = orchestrator.shutdown();
        orchestrator.close();
        for (subsystem, error) in &report.failures {
            warn!(subsystem = %subsystem, error = %error, "subsystem did not stop cleanly");
        }
        Some(report)
    }
}

pub struct Session<L: LinkControl = IpCommand> {
    shared: Arc<Shared<L>>,
}

impl<L: LinkControl> Session<L> {
    pub fn new(orchestrator: Orchestrator<L>) -> Self {
        Self {
            shared: Arc::new(Shared {
                orchestrator: Mutex::new(orchestrator),
                finished: AtomicBool::new(false),
            }),
        }
    }

    /// Exclusive access for one user action. At most one cascade runs at
    /// a time because every caller goes through this lock.
    pub fn lock(&self) -> MutexGuard<'_, Orchestrator<L>> {
        self.shared.lock()
    }

    /// A cloneable handle for signal handlers.
    pub fn shutdown_handle(&self) -> ShutdownHandle<L> {
        ShutdownHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }

    /// End the session explicitly. Returns `None` when a signal handler
    /// got there first.
    pub fn close(self) -> Option<ShutdownReport> {
        self.shared.finish("session closed")
    }
}

impl<L: LinkControl> Drop for Session<L> {
    fn drop(&mut self) {
        if !self.is_finished() {
            self.shared.finish("session dropped");
        }
    }
}

/// Triggers the session's shutdown cascade from another thread.
pub struct ShutdownHandle<L: LinkControl = IpCommand> {
    shared: Arc<Shared<L>>,
}

impl<L: LinkControl> Clone for ShutdownHandle<L> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<L: LinkControl> ShutdownHandle<L> {
    pub fn shutdown(&self, reason: &str) -> Option<ShutdownReport> {
        self.shared.finish(reason)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::commands::CommandSettings;
    use crate::error::CoreError;
    use crate::model::Subsystem::{Power, Recording, Streaming};
    use crate::orchestrator::OrchestratorConfig;

    struct NoLinks;

    impl LinkControl for NoLinks {
        fn interfaces(&self) -> Result<Vec<String>, CoreError> {
            Ok(Vec::new())
        }
        fn addresses(&self, _: &str) -> Result<Vec<String>, CoreError> {
            Ok(Vec::new())
        }
        fn add_address(&mut self, _: &str, _: &str) -> Result<(), CoreError> {
            Ok(())
        }
        fn set_up(&mut self, _: &str) -> Result<(), CoreError> {
            Ok(())
        }
    }

    fn session() -> Session<NoLinks> {
        let sleeper = vec![
            "sh".to_owned(),
            "-c".into(),
            "exec sleep 30".into(),
            "stand-in".into(),
        ];
        let config = OrchestratorConfig {
            commands: CommandSettings {
                power_program: vec!["true".into()],
                bridge_program: sleeper.clone(),
                logger_program: sleeper.clone(),
                playback_program: sleeper,
                ..CommandSettings::default()
            },
            grace_period: Duration::from_secs(2),
            ..OrchestratorConfig::default()
        };
        Session::new(Orchestrator::with_link_control(config, NoLinks))
    }

    #[test]
    fn close_stops_everything_once() {
        let session = session();
        session.lock().toggle(Recording).unwrap();
        let handle = session.shutdown_handle();

        let report = session.close().unwrap();
        assert_eq!(report.stopped, vec![Recording, Streaming, Power]);
        assert!(handle.shutdown("late signal").is_none());
    }

    #[test]
    fn signal_handle_runs_the_cascade_from_another_thread() {
        let session = session();
        session.lock().toggle(Streaming).unwrap();
        let handle = session.shutdown_handle();

        let report = thread::spawn(move || handle.shutdown("SIGTERM"))
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(report.stopped, vec![Streaming, Power]);
        assert!(session.is_finished());
        assert!(session.lock().model().active().is_empty());
        assert!(session.close().is_none());
    }

    #[test]
    fn toggle_after_signal_shutdown_is_refused() {
        let session = session();
        session.lock().toggle(Streaming).unwrap();
        session.shutdown_handle().shutdown("SIGTERM").unwrap();

        let err = session.lock().toggle(Recording).unwrap_err();
        assert!(matches!(err, CoreError::InvariantViolation { .. }));
        let orchestrator = session.lock();
        assert!(orchestrator.is_closed());
        assert!(orchestrator.model().active().is_empty());
        assert!(orchestrator.model().handle(Power).is_none());
        assert!(orchestrator.model().handle(Streaming).is_none());
    }

    #[test]
    fn dropping_the_session_cleans_up() {
        let session = session();
        session.lock().toggle(Recording).unwrap();
        let handle = session.shutdown_handle();
        let pid = session.lock().model().handle(Recording).unwrap().pid();

        drop(session);
        assert!(handle.shutdown("after drop").is_none());
        let pid = nix::unistd::Pid::from_raw(i32::try_from(pid).unwrap());
        assert!(nix::sys::signal::kill(pid, None).is_err());
    }

    #[test]
    fn unwinding_out_of_the_loop_still_cleans_up() {
        let session = session();
        session.lock().toggle(Streaming).unwrap();
        let handle = session.shutdown_handle();

        let result = panic::catch_unwind(AssertUnwindSafe(move || {
            let _session = session;
            panic!("unexpected fault in the action loop");
        }));
        assert!(result.is_err());
        assert!(handle.shutdown("after panic").is_none());
    }
}
