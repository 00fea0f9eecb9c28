// ── Subsystem dependency graph ──
//
// Static dependency and mutual-exclusion tables plus the cascade
// algorithm. Callers never re-derive ordering: they ask the graph for a
// `Cascade` (a plan computed from the current model) and hand it back to
// `execute`, which drives a `SubsystemDriver` step by step.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{StatusModel, Subsystem, SubsystemState};
use crate::process::ProcessHandle;

/// `(dependent, requirement)`: the dependent may only run while the
/// requirement runs.
pub const DEPENDENCIES: [(Subsystem, Subsystem); 2] = [
    (Subsystem::Streaming, Subsystem::Power),
    (Subsystem::Recording, Subsystem::Streaming),
];

/// Pairs that bind the same multicast transport and may never run together.
pub const EXCLUSIONS: [(Subsystem, Subsystem); 2] = [
    (Subsystem::Streaming, Subsystem::Playback),
    (Subsystem::Recording, Subsystem::Playback),
];

// ── Driver seam ─────────────────────────────────────────────────────

/// Performs the side effects of a single cascade step.
pub trait SubsystemDriver {
    /// Bring `subsystem` up. Process-backed subsystems return their handle.
    fn launch(&mut self, subsystem: Subsystem) -> Result<Option<ProcessHandle>, CoreError>;

    /// Bring `subsystem` down and confirm it is gone.
    fn halt(
        &mut self,
        subsystem: Subsystem,
        handle: Option<&mut ProcessHandle>,
    ) -> Result<(), CoreError>;
}

// ── Plans ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepAction {
    Start,
    Stop,
}

/// Why a step is part of a cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepReason {
    /// The subsystem the user toggled.
    Target,
    /// Required (directly or transitively) by a subsystem being started.
    Prerequisite,
    /// Depends on a subsystem being stopped.
    Dependent,
    /// Shares a transport with a subsystem being started.
    Exclusive { with: Subsystem },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Step {
    pub subsystem: Subsystem,
    pub action: StepAction,
    pub reason: StepReason,
}

impl Step {
    const fn new(subsystem: Subsystem, action: StepAction, reason: StepReason) -> Self {
        Self {
            subsystem,
            action,
            reason,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.action {
            StepAction::Start => "start",
            StepAction::Stop => "stop",
        };
        write!(f, "{verb} {}", self.subsystem)
    }
}

/// Ordered steps that take one subsystem to its toggled state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cascade {
    pub target: Subsystem,
    pub action: StepAction,
    pub steps: Vec<Step>,
}

impl Cascade {
    /// Steps other than the target itself.
    pub fn side_effects(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(|step| step.reason != StepReason::Target)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// What an executed cascade actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    pub cascade: Cascade,
    pub completed: Vec<Step>,
}

/// A state the dependency rules forbid, found in a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Violation {
    MissingRequirement {
        subsystem: Subsystem,
        requires: Subsystem,
    },
    Conflict {
        first: Subsystem,
        second: Subsystem,
    },
}

impl Violation {
    /// Subsystems named by this violation.
    pub fn involves(&self, subsystem: Subsystem) -> bool {
        match *self {
            Self::MissingRequirement {
                subsystem: s,
                requires,
            } => s == subsystem || requires == subsystem,
            Self::Conflict { first, second } => first == subsystem || second == subsystem,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRequirement {
                subsystem,
                requires,
            } => write!(
                f,
                "{} is active but {} is not running",
                subsystem.label(),
                requires.label()
            ),
            Self::Conflict { first, second } => write!(
                f,
                "{} and {} are both active on one transport",
                first.label(),
                second.label()
            ),
        }
    }
}

/// Report of the exit-time teardown.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub stopped: Vec<Subsystem>,
    pub failures: Vec<(Subsystem, CoreError)>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// ── Graph ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct SubsystemGraph {
    dependencies: &'static [(Subsystem, Subsystem)],
    exclusions: &'static [(Subsystem, Subsystem)],
}

impl Default for SubsystemGraph {
    fn default() -> Self {
        Self {
            dependencies: &DEPENDENCIES,
            exclusions: &EXCLUSIONS,
        }
    }
}

impl SubsystemGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Table queries ────────────────────────────────────────────────

    pub fn direct_requirements(&self, subsystem: Subsystem) -> Vec<Subsystem> {
        self.dependencies
            .iter()
            .filter(|(dependent, _)| *dependent == subsystem)
            .map(|(_, requirement)| *requirement)
            .collect()
    }

    pub fn direct_dependents(&self, subsystem: Subsystem) -> Vec<Subsystem> {
        self.dependencies
            .iter()
            .filter(|(_, requirement)| *requirement == subsystem)
            .map(|(dependent, _)| *dependent)
            .collect()
    }

    /// Transitive requirements, shallowest first (`Power` before
    /// `Streaming`).
    pub fn requirements(&self, subsystem: Subsystem) -> Vec<Subsystem> {
        let mut ordered = Vec::new();
        self.collect_requirements(subsystem, &mut ordered);
        ordered
    }

    fn collect_requirements(&self, subsystem: Subsystem, out: &mut Vec<Subsystem>) {
        for requirement in self.direct_requirements(subsystem) {
            self.collect_requirements(requirement, out);
            if !out.contains(&requirement) {
                out.push(requirement);
            }
        }
    }

    /// Transitive dependents, deepest first (`Recording` before
    /// `Streaming` when stopping `Power`).
    pub fn dependents(&self, subsystem: Subsystem) -> Vec<Subsystem> {
        let mut ordered = Vec::new();
        self.collect_dependents(subsystem, &mut ordered);
        ordered
    }

    fn collect_dependents(&self, subsystem: Subsystem, out: &mut Vec<Subsystem>) {
        for dependent in self.direct_dependents(subsystem) {
            self.collect_dependents(dependent, out);
            if !out.contains(&dependent) {
                out.push(dependent);
            }
        }
    }

    pub fn exclusive_peers(&self, subsystem: Subsystem) -> Vec<Subsystem> {
        self.exclusions
            .iter()
            .filter_map(|&(a, b)| {
                if a == subsystem {
                    Some(b)
                } else if b == subsystem {
                    Some(a)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Length of the longest requirement chain below `subsystem`.
    pub fn depth(&self, subsystem: Subsystem) -> usize {
        self.direct_requirements(subsystem)
            .into_iter()
            .map(|r| self.depth(r) + 1)
            .max()
            .unwrap_or(0)
    }

    // ── Planning ─────────────────────────────────────────────────────

    /// Plan what toggling `subsystem` would do in the current model.
    ///
    /// Rejected with `InvariantViolation` when any subsystem the plan
    /// touches is mid-transition; nothing is executed here.
    pub fn plan(&self, model: &StatusModel, subsystem: Subsystem) -> Result<Cascade, CoreError> {
        match model.state(subsystem) {
            SubsystemState::Running => Ok(self.plan_stop(model, subsystem)),
            SubsystemState::Stopped => self.plan_start(model, subsystem),
            state => Err(CoreError::InvariantViolation {
                message: format!("{subsystem} is {state}; wait for it to settle"),
            }),
        }
    }

    fn plan_stop(&self, model: &StatusModel, subsystem: Subsystem) -> Cascade {
        let mut steps = Vec::new();
        self.push_stop_chain(model, subsystem, StepReason::Target, &mut steps);
        Cascade {
            target: subsystem,
            action: StepAction::Stop,
            steps,
        }
    }

    /// Stop every active dependent (deepest first), then `subsystem`.
    fn push_stop_chain(
        &self,
        model: &StatusModel,
        subsystem: Subsystem,
        reason: StepReason,
        steps: &mut Vec<Step>,
    ) {
        for dependent in self.dependents(subsystem) {
            let planned = steps.iter().any(|s| s.subsystem == dependent);
            if model.state(dependent).is_active() && !planned {
                steps.push(Step::new(dependent, StepAction::Stop, StepReason::Dependent));
            }
        }
        if !steps.iter().any(|s| s.subsystem == subsystem) {
            steps.push(Step::new(subsystem, StepAction::Stop, reason));
        }
    }

    fn plan_start(&self, model: &StatusModel, subsystem: Subsystem) -> Result<Cascade, CoreError> {
        let mut to_start: Vec<Subsystem> = self
            .requirements(subsystem)
            .into_iter()
            .filter(|r| !model.is_running(*r))
            .collect();
        to_start.push(subsystem);

        for s in &to_start {
            let state = model.state(*s);
            if state.is_transitional() {
                return Err(CoreError::InvariantViolation {
                    message: format!("{subsystem} needs {s}, which is {state}"),
                });
            }
        }

        // Exclusions are settled before any dependency is started.
        let mut steps = Vec::new();
        for s in &to_start {
            for peer in self.exclusive_peers(*s) {
                let state = model.state(peer);
                if state.is_transitional() {
                    return Err(CoreError::InvariantViolation {
                        message: format!("{subsystem} conflicts with {peer}, which is {state}"),
                    });
                }
                if state.is_active() {
                    self.push_stop_chain(model, peer, StepReason::Exclusive { with: *s }, &mut steps);
                }
            }
        }

        for s in to_start {
            let reason = if s == subsystem {
                StepReason::Target
            } else {
                StepReason::Prerequisite
            };
            steps.push(Step::new(s, StepAction::Start, reason));
        }

        Ok(Cascade {
            target: subsystem,
            action: StepAction::Start,
            steps,
        })
    }

    /// Every dependency or exclusion rule the model currently breaks.
    pub fn violations(&self, model: &StatusModel) -> Vec<Violation> {
        let mut found = Vec::new();
        for &(dependent, requirement) in self.dependencies {
            if model.state(dependent).is_active() && !model.is_running(requirement) {
                found.push(Violation::MissingRequirement {
                    subsystem: dependent,
                    requires: requirement,
                });
            }
        }
        for &(first, second) in self.exclusions {
            if model.state(first).is_active() && model.state(second).is_active() {
                found.push(Violation::Conflict { first, second });
            }
        }
        found
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Toggle `subsystem`: plan against the model, then execute.
    pub fn toggle(
        &self,
        model: &mut StatusModel,
        driver: &mut dyn SubsystemDriver,
        subsystem: Subsystem,
    ) -> Result<CascadeReport, CoreError> {
        let cascade = self.plan(model, subsystem)?;
        self.execute(model, driver, cascade)
    }

    /// Run a planned cascade. The first failing step aborts the rest;
    /// steps already completed are kept.
    pub fn execute(
        &self,
        model: &mut StatusModel,
        driver: &mut dyn SubsystemDriver,
        cascade: Cascade,
    ) -> Result<CascadeReport, CoreError> {
        debug!(
            target_subsystem = %cascade.target,
            steps = %cascade.steps.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
            "executing cascade"
        );

        let mut completed = Vec::with_capacity(cascade.steps.len());
        for step in &cascade.steps {
            let outcome = match step.action {
                StepAction::Start => start_one(model, driver, step.subsystem),
                StepAction::Stop => stop_one(model, driver, step.subsystem),
            };
            if let Err(source) = outcome {
                warn!(step = %step, error = %source, "cascade step failed");
                return Err(CoreError::CascadeAborted {
                    failed: step.subsystem,
                    verb: match step.action {
                        StepAction::Start => "start",
                        StepAction::Stop => "stop",
                    },
                    source: Box::new(source),
                });
            }
            completed.push(*step);
        }

        Ok(CascadeReport { cascade, completed })
    }

    /// Tear down everything active, deepest dependents first. Best effort:
    /// a failing stop is recorded and the rest still run.
    pub fn shutdown(
        &self,
        model: &mut StatusModel,
        driver: &mut dyn SubsystemDriver,
    ) -> ShutdownReport {
        let mut order: Vec<Subsystem> = Subsystem::ALL
            .into_iter()
            .filter(|s| {
                let state = model.state(*s);
                state.is_active() || state == SubsystemState::Stopping
            })
            .collect();
        order.sort_by_key(|s| std::cmp::Reverse(self.depth(*s)));

        let mut report = ShutdownReport::default();
        for subsystem in order {
            let result = match model.state(subsystem) {
                SubsystemState::Running => stop_one(model, driver, subsystem),
                SubsystemState::Starting | SubsystemState::Stopping => {
                    abandon(model, driver, subsystem)
                }
                SubsystemState::Stopped => Ok(()),
            };
            match result {
                Ok(()) => report.stopped.push(subsystem),
                Err(e) => {
                    warn!(subsystem = %subsystem, error = %e, "shutdown stop failed");
                    report.failures.push((subsystem, e));
                }
            }
        }
        info!(
            stopped = report.stopped.len(),
            failed = report.failures.len(),
            "shutdown cascade finished"
        );
        report
    }

    /// Subsystems that must follow `subsystem` down after it died on its
    /// own, deepest first.
    pub fn orphaned_by(&self, model: &StatusModel, subsystem: Subsystem) -> Vec<Subsystem> {
        self.dependents(subsystem)
            .into_iter()
            .filter(|d| model.state(*d).is_active())
            .collect()
    }
}

// ── Single steps ────────────────────────────────────────────────────

fn start_one(
    model: &mut StatusModel,
    driver: &mut dyn SubsystemDriver,
    subsystem: Subsystem,
) -> Result<(), CoreError> {
    if model.is_running(subsystem) {
        return Ok(());
    }
    model.transition(subsystem, SubsystemState::Starting)?;
    match driver.launch(subsystem) {
        Ok(handle) => {
            if let Some(handle) = handle {
                model.attach_handle(subsystem, handle);
            }
            model.transition(subsystem, SubsystemState::Running)
        }
        Err(e) => {
            model.transition(subsystem, SubsystemState::Stopped)?;
            Err(e)
        }
    }
}

fn stop_one(
    model: &mut StatusModel,
    driver: &mut dyn SubsystemDriver,
    subsystem: Subsystem,
) -> Result<(), CoreError> {
    if model.state(subsystem) == SubsystemState::Stopped {
        return Ok(());
    }
    model.transition(subsystem, SubsystemState::Stopping)?;
    match driver.halt(subsystem, model.handle_mut(subsystem)) {
        Ok(()) => {
            drop(model.take_handle(subsystem));
            model.transition(subsystem, SubsystemState::Stopped)
        }
        Err(e) => {
            model.transition(subsystem, SubsystemState::Running)?;
            Err(e)
        }
    }
}

/// Settle a subsystem caught mid-transition. If the halt fails the
/// process is still there, so it is reported `Running` with its handle.
fn abandon(
    model: &mut StatusModel,
    driver: &mut dyn SubsystemDriver,
    subsystem: Subsystem,
) -> Result<(), CoreError> {
    match driver.halt(subsystem, model.handle_mut(subsystem)) {
        Ok(()) => {
            drop(model.take_handle(subsystem));
            model.transition(subsystem, SubsystemState::Stopped)
        }
        Err(e) => {
            model.transition(subsystem, SubsystemState::Running)?;
            Err(e)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use std::time::Duration;

    use super::*;
    use crate::model::{Device, StateChange};
    use crate::process::ProcessSupervisor;
    use crate::model::Subsystem::{Playback, Power, Recording, Streaming};
    use crate::model::SubsystemState::{Running, Starting, Stopped, Stopping};

    /// Driver that records calls and can be told to fail.
    #[derive(Default)]
    struct FakeDriver {
        calls: Vec<String>,
        fail_launch: Option<Subsystem>,
        fail_halt: Option<Subsystem>,
    }

    impl SubsystemDriver for FakeDriver {
        fn launch(&mut self, subsystem: Subsystem) -> Result<Option<ProcessHandle>, CoreError> {
            self.calls.push(format!("launch {subsystem}"));
            if self.fail_launch == Some(subsystem) {
                return Err(CoreError::Spawn {
                    program: subsystem.slug().into(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            Ok(None)
        }

        fn halt(
            &mut self,
            subsystem: Subsystem,
            _handle: Option<&mut ProcessHandle>,
        ) -> Result<(), CoreError> {
            self.calls.push(format!("halt {subsystem}"));
            if self.fail_halt == Some(subsystem) {
                return Err(CoreError::CommandFailed {
                    command: "power off".into(),
                    exit_code: 1,
                    stderr: "device busy".into(),
                });
            }
            Ok(())
        }
    }

    fn model() -> StatusModel {
        StatusModel::new(Device::default(), "voyant-sdk-container")
    }

    fn states(m: &StatusModel) -> [SubsystemState; 4] {
        Subsystem::ALL.map(|s| m.state(s))
    }

    /// Order in which subsystems reached `to`.
    fn reached(m: &StatusModel, to: SubsystemState) -> Vec<Subsystem> {
        m.history()
            .iter()
            .filter(|c| c.to == to)
            .map(|c| c.subsystem)
            .collect()
    }

    #[test]
    fn requirement_and_dependent_orders() {
        let g = SubsystemGraph::new();
        assert_eq!(g.requirements(Recording), vec![Power, Streaming]);
        assert_eq!(g.requirements(Playback), Vec::<Subsystem>::new());
        assert_eq!(g.dependents(Power), vec![Recording, Streaming]);
        assert_eq!(g.dependents(Streaming), vec![Recording]);
        assert_eq!(g.exclusive_peers(Playback), vec![Streaming, Recording]);
        assert_eq!(g.depth(Recording), 2);
        assert_eq!(g.depth(Playback), 0);
    }

    #[test]
    fn starting_recording_from_cold_starts_its_chain_in_order() {
        let g = SubsystemGraph::new();
        let mut m = model();
        let mut driver = FakeDriver::default();

        let report = g.toggle(&mut m, &mut driver, Recording).unwrap();

        assert_eq!(states(&m), [Running, Running, Running, Stopped]);
        assert_eq!(reached(&m, Running), vec![Power, Streaming, Recording]);
        assert_eq!(report.completed.len(), 3);
        assert_eq!(
            m.history()[..2],
            [
                StateChange::new(Power, Stopped, Starting),
                StateChange::new(Power, Starting, Running),
            ]
        );
        assert_eq!(
            driver.calls,
            vec!["launch Power", "launch Streaming", "launch Recording"]
        );
    }

    #[test]
    fn stopping_power_cascades_to_dependents_first() {
        let g = SubsystemGraph::new();
        let mut m = model();
        let mut driver = FakeDriver::default();
        g.toggle(&mut m, &mut driver, Recording).unwrap();
        driver.calls.clear();

        g.toggle(&mut m, &mut driver, Power).unwrap();

        assert_eq!(states(&m), [Stopped; 4]);
        assert_eq!(reached(&m, Stopped), vec![Recording, Streaming, Power]);
        assert_eq!(
            driver.calls,
            vec!["halt Recording", "halt Streaming", "halt Power"]
        );
        // Every stop passed through Stopping.
        assert_eq!(reached(&m, Stopping), vec![Recording, Streaming, Power]);
    }

    #[test]
    fn playback_and_streaming_exclude_each_other() {
        let g = SubsystemGraph::new();
        let mut m = model();
        let mut driver = FakeDriver::default();
        g.toggle(&mut m, &mut driver, Streaming).unwrap();

        g.toggle(&mut m, &mut driver, Playback).unwrap();
        assert_eq!(m.state(Streaming), Stopped);
        assert_eq!(m.state(Playback), Running);
        assert_eq!(m.state(Power), Running);

        g.toggle(&mut m, &mut driver, Streaming).unwrap();
        assert_eq!(m.state(Playback), Stopped);
        assert_eq!(m.state(Streaming), Running);
        assert!(g.violations(&m).is_empty());
    }

    #[test]
    fn recording_stops_playback_before_starting_anything() {
        let g = SubsystemGraph::new();
        let mut m = model();
        let mut driver = FakeDriver::default();
        g.toggle(&mut m, &mut driver, Playback).unwrap();
        driver.calls.clear();

        let cascade = g.plan(&m, Recording).unwrap();
        assert_eq!(
            cascade.steps.first(),
            Some(&Step::new(
                Playback,
                StepAction::Stop,
                StepReason::Exclusive { with: Streaming }
            ))
        );

        g.execute(&mut m, &mut driver, cascade).unwrap();
        assert_eq!(
            driver.calls,
            vec![
                "halt Playback",
                "launch Power",
                "launch Streaming",
                "launch Recording"
            ]
        );
    }

    #[test]
    fn stopping_streaming_leaves_power_alone() {
        let g = SubsystemGraph::new();
        let mut m = model();
        let mut driver = FakeDriver::default();
        g.toggle(&mut m, &mut driver, Recording).unwrap();

        let plan = g.plan(&m, Streaming).unwrap();
        let side: Vec<_> = plan.side_effects().map(|s| s.subsystem).collect();
        assert_eq!(side, vec![Recording]);

        g.execute(&mut m, &mut driver, plan).unwrap();
        assert_eq!(states(&m), [Running, Stopped, Stopped, Stopped]);
    }

    #[test]
    fn failed_start_keeps_prerequisites_and_names_the_culprit() {
        let g = SubsystemGraph::new();
        let mut m = model();
        let mut driver = FakeDriver {
            fail_launch: Some(Streaming),
            ..FakeDriver::default()
        };

        let err = g.toggle(&mut m, &mut driver, Recording).unwrap_err();
        match &err {
            CoreError::CascadeAborted { failed, .. } => assert_eq!(*failed, Streaming),
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(err.root_cause(), CoreError::Spawn { .. }));
        assert_eq!(states(&m), [Running, Stopped, Stopped, Stopped]);
        assert_eq!(driver.calls, vec!["launch Power", "launch Streaming"]);
        assert!(Subsystem::ALL.iter().all(|s| !m.state(*s).is_transitional()));
    }

    #[test]
    fn failed_halt_returns_to_running() {
        let g = SubsystemGraph::new();
        let mut m = model();
        let mut driver = FakeDriver {
            fail_halt: Some(Power),
            ..FakeDriver::default()
        };
        g.toggle(&mut m, &mut driver, Streaming).unwrap();

        let err = g.toggle(&mut m, &mut driver, Power).unwrap_err();
        assert!(matches!(err, CoreError::CascadeAborted { failed: Power, .. }));
        assert_eq!(m.state(Streaming), Stopped);
        assert_eq!(m.state(Power), Running);
    }

    #[test]
    fn transitional_states_are_rejected_before_any_call() {
        let g = SubsystemGraph::new();
        let mut m = model();
        m.force_state(Power, Starting);
        let mut driver = FakeDriver::default();

        let err = g.toggle(&mut m, &mut driver, Recording).unwrap_err();
        assert!(matches!(err, CoreError::InvariantViolation { .. }));
        assert!(driver.calls.is_empty());

        let err = g.plan(&m, Power).unwrap_err();
        assert!(err.is_rejection());
    }

    #[test]
    fn violations_name_broken_rules() {
        let g = SubsystemGraph::new();
        let mut m = model();
        m.force_state(Streaming, Running);
        m.force_state(Playback, Running);

        let found = g.violations(&m);
        assert_eq!(
            found,
            vec![
                Violation::MissingRequirement {
                    subsystem: Streaming,
                    requires: Power
                },
                Violation::Conflict {
                    first: Streaming,
                    second: Playback
                },
            ]
        );
        assert_eq!(
            found[0].to_string(),
            "Streaming is active but Lidar is not running"
        );
        assert_eq!(
            found[1].to_string(),
            "Streaming and Playback are both active on one transport"
        );
    }

    #[test]
    fn shutdown_stops_deepest_first_and_is_best_effort() {
        let g = SubsystemGraph::new();
        let mut m = model();
        let mut driver = FakeDriver::default();
        g.toggle(&mut m, &mut driver, Recording).unwrap();
        driver.calls.clear();
        driver.fail_halt = Some(Streaming);

        let report = g.shutdown(&mut m, &mut driver);
        assert_eq!(
            driver.calls,
            vec!["halt Recording", "halt Streaming", "halt Power"]
        );
        assert_eq!(report.stopped, vec![Recording, Power]);
        assert_eq!(report.failures.len(), 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn shutdown_clears_subsystems_caught_mid_transition() {
        let g = SubsystemGraph::new();
        let mut m = model();
        m.force_state(Power, Running);
        m.force_state(Streaming, Starting);
        let mut driver = FakeDriver::default();

        let report = g.shutdown(&mut m, &mut driver);
        assert!(report.is_clean());
        assert_eq!(states(&m), [Stopped; 4]);
        assert_eq!(report.stopped, vec![Streaming, Power]);
    }

    #[test]
    fn failed_halt_mid_transition_keeps_the_process() {
        let g = SubsystemGraph::new();
        let mut m = model();
        let sup = ProcessSupervisor::new(Duration::from_millis(500));
        let handle = sup
            .start(Streaming, &["sleep".to_owned(), "30".to_owned()])
            .unwrap();
        m.force_state(Power, Running);
        m.force_state(Streaming, Stopping);
        m.attach_handle(Streaming, handle);
        let mut driver = FakeDriver {
            fail_halt: Some(Streaming),
            ..FakeDriver::default()
        };

        let report = g.shutdown(&mut m, &mut driver);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, Streaming);
        assert_eq!(m.state(Streaming), Running);

        let mut handle = m.take_handle(Streaming).unwrap();
        assert!(sup.is_alive(&mut handle));
        sup.stop(&mut handle).unwrap();
    }

    #[test]
    fn orphans_are_active_dependents_only() {
        let g = SubsystemGraph::new();
        let mut m = model();
        m.force_state(Power, Running);
        m.force_state(Recording, Running);
        let orphans = g.orphaned_by(&m, Power);
        assert_eq!(orphans, vec![Recording]);
    }
}
