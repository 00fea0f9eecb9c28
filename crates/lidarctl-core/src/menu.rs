// ── Menu projection ──
//
// Pure functions from a `StatusModel` to the ordered list of selectable
// actions. Nothing here mutates state or touches a terminal; the prompt
// layer renders whatever `Menu` it is handed.

use std::fmt;

use serde::Serialize;
use strum::Display;

use crate::graph::{StepAction, StepReason, SubsystemGraph};
use crate::model::{StatusModel, Subsystem, SubsystemState};

/// What selecting an action asks the orchestrator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "subsystem", rename_all = "snake_case")]
pub enum Operation {
    Toggle(Subsystem),
    BuildImage,
    SelectInterface,
    LinkUp,
    RunClient,
    SaveProfile,
    LoadProfile,
    SetDefaultProfile,
    Refresh,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    /// Selecting the action has side effects worth knowing about.
    Advisory,
    /// The model is in a state the rules forbid.
    Warning,
    /// The action cannot run right now.
    Blocking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub severity: Severity,
    pub message: String,
}

impl Annotation {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub label: String,
    pub operation: Operation,
    pub annotations: Vec<Annotation>,
}

impl Action {
    fn new(label: impl Into<String>, operation: Operation) -> Self {
        Self {
            label: label.into(),
            operation,
            annotations: Vec::new(),
        }
    }

    fn note(mut self, severity: Severity, message: impl Into<String>) -> Self {
        self.annotations.push(Annotation::new(severity, message));
        self
    }

    pub fn is_blocked(&self) -> bool {
        self.annotations
            .iter()
            .any(|a| a.severity == Severity::Blocking)
    }

    /// Reasons the action is blocked, if any.
    pub fn blockers(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations
            .iter()
            .filter(|a| a.severity == Severity::Blocking)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)?;
        for annotation in &self.annotations {
            write!(f, " | {annotation}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Menu {
    pub title: &'static str,
    /// Model-wide notices shown above the actions.
    pub notices: Vec<Annotation>,
    pub actions: Vec<Action>,
}

impl Menu {
    pub fn labels(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.label.as_str()).collect()
    }

    pub fn find(&self, operation: Operation) -> Option<&Action> {
        self.actions.iter().find(|a| a.operation == operation)
    }
}

// ── Projector ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct MenuProjector {
    graph: SubsystemGraph,
}

impl MenuProjector {
    pub fn new(graph: SubsystemGraph) -> Self {
        Self { graph }
    }

    /// Device-side menu: one toggle per subsystem, then refresh and quit.
    ///
    /// Each toggle carries the side effects its cascade would have. A
    /// model that breaks the dependency rules still renders; the broken
    /// rules come back as warnings.
    pub fn project(&self, model: &StatusModel) -> Menu {
        let violations = self.graph.violations(model);

        let mut actions: Vec<Action> = Subsystem::ALL
            .into_iter()
            .map(|subsystem| {
                let mut action = self.toggle_action(model, subsystem);
                for violation in violations.iter().filter(|v| v.involves(subsystem)) {
                    action = action.note(Severity::Warning, violation.to_string());
                }
                action
            })
            .collect();
        actions.push(Action::new("Refresh status", Operation::Refresh));
        actions.push(Action::new("Quit", Operation::Quit));

        Menu {
            title: "Lidar client",
            notices: violations
                .iter()
                .map(|v| Annotation::new(Severity::Warning, v.to_string()))
                .collect(),
            actions,
        }
    }

    fn toggle_action(&self, model: &StatusModel, subsystem: Subsystem) -> Action {
        let verb = match model.state(subsystem) {
            SubsystemState::Running | SubsystemState::Stopping => "Stop",
            SubsystemState::Stopped | SubsystemState::Starting => "Start",
        };
        let mut action = Action::new(
            format!("{verb} {}", menu_noun(subsystem)),
            Operation::Toggle(subsystem),
        );

        match self.graph.plan(model, subsystem) {
            Ok(cascade) => {
                for step in cascade.side_effects() {
                    let message = match (step.action, step.reason) {
                        (StepAction::Start, _) => {
                            format!("will also start {}", step.subsystem.label())
                        }
                        (StepAction::Stop, StepReason::Exclusive { with }) => format!(
                            "will also stop {} (conflicts with {})",
                            step.subsystem.label(),
                            with.label()
                        ),
                        (StepAction::Stop, _) => {
                            format!("will also stop {}", step.subsystem.label())
                        }
                    };
                    action = action.note(Severity::Advisory, message);
                }
            }
            Err(e) => action = action.note(Severity::Blocking, e.to_string()),
        }
        action
    }

    /// Setup-side menu: prepare the host, then hand off to the container.
    pub fn project_setup(&self, model: &StatusModel) -> Menu {
        let env = model.environment();
        let device = model.device();

        let mut build = Action::new("Build container image", Operation::BuildImage);
        if env.docker_image_built {
            build = build.note(
                Severity::Advisory,
                format!(
                    "{} is already built; rebuilding replaces it",
                    model.container_name()
                ),
            );
        }

        let mut select = Action::new("Select network interface", Operation::SelectInterface);
        if device.has_interface() {
            select = select.note(
                Severity::Advisory,
                format!(
                    "already set to {}; selecting again overrides it",
                    device.interface_name()
                ),
            );
        }

        let mut link = Action::new("Link up", Operation::LinkUp);
        if !device.has_interface() {
            link = link.note(Severity::Blocking, "Required – select network interface");
        }

        let mut run = Action::new("Run device client", Operation::RunClient);
        if !env.docker_image_built {
            run = run.note(Severity::Blocking, "Required – build image");
        }
        if !env.linked_up {
            run = run.note(Severity::Blocking, "Required – link up");
        }

        Menu {
            title: "Lidar client setup",
            notices: Vec::new(),
            actions: vec![
                build,
                select,
                link,
                run,
                Action::new("Save profile", Operation::SaveProfile),
                Action::new("Load profile", Operation::LoadProfile),
                Action::new("Set default profile", Operation::SetDefaultProfile),
                Action::new("Quit", Operation::Quit),
            ],
        }
    }
}

/// Device-side menu over the default graph.
pub fn project(model: &StatusModel) -> Menu {
    MenuProjector::default().project(model)
}

/// Setup-side menu over the default graph.
pub fn project_setup(model: &StatusModel) -> Menu {
    MenuProjector::default().project_setup(model)
}

fn menu_noun(subsystem: Subsystem) -> &'static str {
    match subsystem {
        Subsystem::Power => "Lidar",
        Subsystem::Streaming => "Streaming to Foxglove",
        Subsystem::Recording => "Recording to Binary",
        Subsystem::Playback => "Playback",
    }
}
