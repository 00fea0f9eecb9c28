//! The interactive action loop.
//!
//! Each turn: reconcile the model with the live processes, project it
//! into a menu, ask for one choice, dispatch it to completion. The
//! orchestrator lock is only held while reconciling/projecting and while
//! dispatching, never while waiting on the user, so a termination signal
//! can always reach the shutdown cascade.

use tracing::{debug, info};

use lidarctl_config::{ConfigProfile, ConfigStore};
use lidarctl_core::{
    AddressChange, LinkControl, Menu, MenuProjector, Operation, Session, StatusSnapshot,
};

use crate::error::CliError;
use crate::prompt::Prompter;

/// Which menu the loop projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Host-side preparation.
    Setup,
    /// Subsystem control inside the container.
    Client,
}

pub struct Interactive<'a, P, L: LinkControl> {
    session: &'a Session<L>,
    prompter: &'a mut P,
    store: &'a ConfigStore,
    projector: MenuProjector,
    mode: Mode,
    profile_name: String,
}

impl<'a, P: Prompter, L: LinkControl> Interactive<'a, P, L> {
    pub fn new(
        session: &'a Session<L>,
        prompter: &'a mut P,
        store: &'a ConfigStore,
        mode: Mode,
        profile_name: impl Into<String>,
    ) -> Self {
        Self {
            session,
            prompter,
            store,
            projector: MenuProjector::default(),
            mode,
            profile_name: profile_name.into(),
        }
    }

    /// Run until the user quits. Only prompt failures (including an
    /// interrupt) end the loop with an error; failed actions are reported
    /// and the loop continues.
    pub fn run(mut self) -> Result<(), CliError> {
        loop {
            let (status, menu) = self.project();

            let Some(index) = self.prompter.choose(&status, &menu)? else {
                continue;
            };
            let Some(action) = menu.actions.get(index) else {
                continue;
            };
            if action.is_blocked() {
                for blocker in action.blockers() {
                    self.prompter.notify(&blocker.message);
                }
                continue;
            }

            debug!(operation = ?action.operation, "dispatching menu action");
            match action.operation {
                Operation::Quit => return Ok(()),
                Operation::Refresh => {}
                op => {
                    if let Err(e) = self.dispatch(op) {
                        match e {
                            CliError::Interrupted | CliError::Prompt { .. } => return Err(e),
                            other => self.prompter.notify(&other.to_string()),
                        }
                    }
                }
            }
        }
    }

    fn project(&mut self) -> (StatusSnapshot, Menu) {
        let mut orch = self.session.lock();
        for subsystem in orch.reconcile() {
            self.prompter
                .notify(&format!("{} stopped unexpectedly", subsystem.label()));
        }
        let menu = match self.mode {
            Mode::Client => self.projector.project(orch.model()),
            Mode::Setup => {
                orch.refresh_environment();
                self.projector.project_setup(orch.model())
            }
        };
        (orch.model().snapshot(), menu)
    }

    fn dispatch(&mut self, operation: Operation) -> Result<(), CliError> {
        match operation {
            Operation::Toggle(subsystem) => {
                let mut orch = self.session.lock();
                let verb = if orch.model().is_running(subsystem) {
                    "Stopping"
                } else {
                    "Starting"
                };
                self.prompter
                    .begin(&format!("{verb} {}", subsystem.label()));
                let result = orch.toggle(subsystem);
                drop(orch);
                self.prompter.finish();
                let report = result?;
                let done: Vec<String> = report.completed.iter().map(ToString::to_string).collect();
                self.prompter.notify(&format!("Done: {}", done.join(", ")));
            }
            Operation::BuildImage => {
                self.session.lock().build_image()?;
                self.prompter.notify("Container image built");
            }
            Operation::SelectInterface => self.select_interface()?,
            Operation::LinkUp => {
                self.prompter.begin("Bringing the link up");
                let result = {
                    let mut orch = self.session.lock();
                    orch.link_up()
                        .map(|change| (change, orch.model().environment().linked_up))
                };
                self.prompter.finish();
                let (change, reachable) = result?;
                self.prompter.notify(match change {
                    AddressChange::Assigned => "Subnet address assigned, link is up",
                    AddressChange::AlreadyPresent => "Subnet address already present, link is up",
                });
                if !reachable {
                    self.prompter
                        .notify("Device did not answer; check the cable and that it is powered on");
                }
            }
            Operation::RunClient => self.session.lock().run_client()?,
            Operation::SaveProfile => {
                let name = self.prompter.input("Profile name", &self.profile_name)?;
                let profile = ConfigProfile::from_model(name.trim(), self.session.lock().model());
                self.store.save(&profile)?;
                self.prompter
                    .notify(&format!("Saved profile '{}'", profile.profile_name));
                self.profile_name = profile.profile_name;
            }
            Operation::LoadProfile => {
                let Some(name) = self.pick_profile("Load profile")? else {
                    return Ok(());
                };
                let profile = self.store.load(&name)?;
                self.session
                    .lock()
                    .apply_profile(profile.device(), profile.container_name.clone())?;
                info!(profile = %name, "profile loaded");
                self.prompter.notify(&format!("Loaded profile '{name}'"));
                self.profile_name = name;
            }
            Operation::SetDefaultProfile => {
                let Some(name) = self.pick_profile("Default profile")? else {
                    return Ok(());
                };
                self.store.set_default(&name)?;
                self.prompter
                    .notify(&format!("'{name}' is now the default profile"));
            }
            Operation::Refresh | Operation::Quit => {}
        }
        Ok(())
    }

    fn select_interface(&mut self) -> Result<(), CliError> {
        loop {
            let interfaces = self.session.lock().list_interfaces()?;
            let mut items: Vec<String> = interfaces
                .iter()
                .map(|i| {
                    if i.likely_device {
                        format!("{} (likely device)", i.name)
                    } else {
                        i.name.clone()
                    }
                })
                .collect();
            items.push("Refresh".into());

            match self.prompter.pick("Network interface", &items)? {
                Some(i) if i < interfaces.len() => {
                    let name = &interfaces[i].name;
                    self.session.lock().select_interface(name)?;
                    self.prompter.notify(&format!("Interface set to {name}"));
                    return Ok(());
                }
                Some(_) => {}
                None => return Ok(()),
            }
        }
    }

    fn pick_profile(&mut self, title: &str) -> Result<Option<String>, CliError> {
        let names = self.store.list()?;
        if names.is_empty() {
            self.prompter.notify("No saved profiles");
            return Ok(None);
        }
        Ok(self
            .prompter
            .pick(title, &names)?
            .and_then(|i| names.get(i).cloned()))
    }
}
