// ── Orchestrator facade ──
//
// Owns the status model, the graph, the process driver and the link
// manager. Every user-facing operation goes through here, one at a time;
// callers that share an orchestrator across threads do so through
// `Session`, which serializes access.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::commands::{CommandSettings, CommandTemplates};
use crate::container::image_listed;
use crate::error::CoreError;
use crate::graph::{Cascade, CascadeReport, ShutdownReport, SubsystemDriver, SubsystemGraph};
use crate::model::{Device, Environment, StatusModel, Subsystem, SubsystemState};
use crate::network::{
    AddressChange, DEFAULT_ETHERNET_PREFIXES, DEFAULT_PROBE_PORT, DEFAULT_PROBE_TIMEOUT,
    InterfaceInfo, IpCommand, LinkControl, NetworkLinkManager,
};
use crate::process::{DEFAULT_GRACE_PERIOD, ProcessHandle, ProcessSupervisor};

/// Container name used when no profile names one.
pub const DEFAULT_CONTAINER_NAME: &str = "voyant-sdk-container";

/// Program invoked inside the container to run the device-side menu.
pub const DEFAULT_CLIENT_PROGRAM: &str = "lidarctl";

/// Everything needed to build an [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub device: Device,
    pub container_name: String,
    pub commands: CommandSettings,
    pub grace_period: Duration,
    pub probe_port: u16,
    pub probe_timeout: Duration,
    /// Where subsystem stdout/stderr go. `None` discards them.
    pub log_dir: Option<PathBuf>,
    pub ethernet_prefixes: Vec<String>,
    /// Host directory mounted into the container.
    pub workspace_dir: PathBuf,
    pub client_program: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            device: Device::default(),
            container_name: DEFAULT_CONTAINER_NAME.into(),
            commands: CommandSettings::default(),
            grace_period: DEFAULT_GRACE_PERIOD,
            probe_port: DEFAULT_PROBE_PORT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            log_dir: None,
            ethernet_prefixes: DEFAULT_ETHERNET_PREFIXES
                .iter()
                .map(|p| (*p).to_owned())
                .collect(),
            workspace_dir: PathBuf::from("."),
            client_program: DEFAULT_CLIENT_PROGRAM.into(),
        }
    }
}

// ── Process driver ──────────────────────────────────────────────────

/// `SubsystemDriver` that launches real processes. Power has no process:
/// it is switched with one-shot endpoint commands.
#[derive(Debug, Clone)]
pub struct ProcessDriver {
    supervisor: ProcessSupervisor,
    templates: CommandTemplates,
}

impl ProcessDriver {
    pub fn new(supervisor: ProcessSupervisor, templates: CommandTemplates) -> Self {
        Self {
            supervisor,
            templates,
        }
    }
}

impl SubsystemDriver for ProcessDriver {
    fn launch(&mut self, subsystem: Subsystem) -> Result<Option<ProcessHandle>, CoreError> {
        match self.templates.for_subsystem(subsystem) {
            Some(argv) => self.supervisor.start(subsystem, &argv).map(Some),
            None => {
                self.supervisor.run_once(&self.templates.power(true))?;
                Ok(None)
            }
        }
    }

    fn halt(
        &mut self,
        subsystem: Subsystem,
        handle: Option<&mut ProcessHandle>,
    ) -> Result<(), CoreError> {
        if let Some(handle) = handle {
            let outcome = self.supervisor.stop(handle)?;
            debug!(subsystem = %subsystem, ?outcome, "process stopped");
        } else if !subsystem.is_process_backed() {
            self.supervisor.run_once(&self.templates.power(false))?;
        }
        Ok(())
    }
}

// ── Orchestrator ────────────────────────────────────────────────────

pub struct Orchestrator<L = IpCommand> {
    config: OrchestratorConfig,
    model: StatusModel,
    graph: SubsystemGraph,
    supervisor: ProcessSupervisor,
    templates: CommandTemplates,
    driver: ProcessDriver,
    links: NetworkLinkManager<L>,
    closed: bool,
}

impl Orchestrator<IpCommand> {
    /// An orchestrator that manages links with the `ip` tool.
    pub fn new(config: OrchestratorConfig) -> Self {
        let supervisor = supervisor_for(&config);
        let templates = CommandTemplates::new(config.commands.clone());
        let control = IpCommand::new(supervisor.clone(), templates.clone());
        Self::with_link_control(config, control)
    }
}

impl<L: LinkControl> Orchestrator<L> {
    pub fn with_link_control(config: OrchestratorConfig, control: L) -> Self {
        let supervisor = supervisor_for(&config);
        let templates = CommandTemplates::new(config.commands.clone());
        let driver = ProcessDriver::new(supervisor.clone(), templates.clone());
        let links = NetworkLinkManager::new(control)
            .with_ethernet_prefixes(config.ethernet_prefixes.clone());
        let model = StatusModel::new(config.device.clone(), config.container_name.clone());

        Self {
            config,
            model,
            graph: SubsystemGraph::new(),
            supervisor,
            templates,
            driver,
            links,
            closed: false,
        }
    }

    pub fn model(&self) -> &StatusModel {
        &self.model
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn graph(&self) -> &SubsystemGraph {
        &self.graph
    }

    pub fn links(&self) -> &NetworkLinkManager<L> {
        &self.links
    }

    /// Refuse further launches. Set once the session has torn everything
    /// down, so nothing started afterwards can outlive it.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), CoreError> {
        if self.closed {
            return Err(CoreError::InvariantViolation {
                message: "session has shut down".into(),
            });
        }
        Ok(())
    }

    // ── Subsystems ───────────────────────────────────────────────────

    pub fn plan(&self, subsystem: Subsystem) -> Result<Cascade, CoreError> {
        self.graph.plan(&self.model, subsystem)
    }

    /// Flip `subsystem`, running the whole cascade before returning.
    pub fn toggle(&mut self, subsystem: Subsystem) -> Result<CascadeReport, CoreError> {
        self.ensure_open()?;
        self.graph
            .toggle(&mut self.model, &mut self.driver, subsystem)
    }

    /// Bring the model back in line with the processes that actually
    /// exist. A subsystem whose process has exited is walked down to
    /// `Stopped` together with everything that depends on it.
    ///
    /// Returns the subsystems found dead.
    pub fn reconcile(&mut self) -> Vec<Subsystem> {
        let mut crashed = Vec::new();
        for subsystem in Subsystem::ALL {
            if self.model.state(subsystem) != SubsystemState::Running {
                continue;
            }
            let Some(handle) = self.model.handle_mut(subsystem) else {
                continue;
            };
            if self.supervisor.is_alive(handle) {
                continue;
            }
            warn!(
                subsystem = %subsystem,
                pid = handle.pid(),
                status = ?handle.exit_status(),
                "process exited outside orchestrator control"
            );
            crashed.push(subsystem);

            let orphans = self.graph.orphaned_by(&self.model, subsystem);
            if !orphans.is_empty() {
                info!(subsystem = %subsystem, ?orphans, "stopping dependents of dead process");
            }
            let outcome = self
                .graph
                .plan(&self.model, subsystem)
                .and_then(|cascade| {
                    self.graph
                        .execute(&mut self.model, &mut self.driver, cascade)
                });
            if let Err(e) = outcome {
                warn!(subsystem = %subsystem, error = %e, "could not settle dead subsystem");
            }
        }
        crashed
    }

    /// Stop everything, deepest dependents first.
    pub fn shutdown(&mut self) -> ShutdownReport {
        self.graph.shutdown(&mut self.model, &mut self.driver)
    }

    // ── Host environment ─────────────────────────────────────────────

    /// Re-probe the image and link flags.
    pub fn refresh_environment(&mut self) -> Environment {
        let docker_image_built = self.image_exists().unwrap_or_else(|e| {
            debug!(error = %e, "image listing failed");
            false
        });
        let linked_up = self.device_reachable();
        let environment = Environment {
            docker_image_built,
            linked_up,
        };
        self.model.set_environment(environment);
        environment
    }

    pub fn image_exists(&self) -> Result<bool, CoreError> {
        let out = self.supervisor.run_once(&self.templates.docker_images())?;
        Ok(image_listed(&out.stdout, self.model.container_name()))
    }

    pub fn device_reachable(&self) -> bool {
        self.links.is_reachable(
            IpAddr::V4(self.model.device().ip_address),
            self.config.probe_port,
            self.config.probe_timeout,
        )
    }

    pub fn list_interfaces(&self) -> Result<Vec<InterfaceInfo>, CoreError> {
        self.links.list_interfaces()
    }

    pub fn select_interface(&mut self, name: &str) -> Result<(), CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation {
                field: "network interface".into(),
                reason: "name is empty".into(),
            });
        }
        info!(interface = name, "interface selected");
        self.model.set_interface(Some(name.to_owned()));
        Ok(())
    }

    /// Put the host subnet address on the selected interface and bring it
    /// up, then probe the device.
    pub fn link_up(&mut self) -> Result<AddressChange, CoreError> {
        self.ensure_open()?;
        let interface = self
            .model
            .device()
            .network_interface
            .clone()
            .ok_or_else(|| CoreError::InvariantViolation {
                message: "no network interface selected".into(),
            })?;
        let cidr = self.config.commands.subnet_cidr.clone();
        self.config
            .commands
            .validate_subnet()
            .map_err(|reason| CoreError::Validation {
                field: "subnet".into(),
                reason,
            })?;

        let change = self.links.ensure_address_assigned(&interface, &cidr)?;
        let mut environment = self.model.environment();
        environment.linked_up = self.device_reachable();
        self.model.set_environment(environment);
        if !environment.linked_up {
            warn!(device = %self.model.device(), "device did not answer after link up");
        }
        Ok(change)
    }

    pub fn build_image(&mut self) -> Result<(), CoreError> {
        self.ensure_open()?;
        let argv = self.templates.docker_build(self.model.container_name());
        self.supervisor.run_attached(&argv)?;
        let mut environment = self.model.environment();
        environment.docker_image_built = true;
        self.model.set_environment(environment);
        Ok(())
    }

    /// Hand the terminal to the device client inside the container. A
    /// failed run is retried once after clearing any stale container of
    /// the same name.
    pub fn run_client(&mut self) -> Result<(), CoreError> {
        self.ensure_open()?;
        let environment = self.model.environment();
        if !environment.docker_image_built || !environment.linked_up {
            return Err(CoreError::InvariantViolation {
                message: "build the image and link up before running the client".into(),
            });
        }

        let container = self.model.container_name().to_owned();
        let argv = self.templates.docker_run_client(
            &container,
            &self.config.workspace_dir,
            &self.config.client_program,
            self.model.device(),
        );

        match self.supervisor.run_attached(&argv) {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(container = %container, error = %first, "client run failed, clearing stale container");
                for cleanup in [
                    self.templates.docker_stop(&container),
                    self.templates.docker_rm(&container),
                ] {
                    if let Err(e) = self.supervisor.run_once(&cleanup) {
                        debug!(error = %e, "container cleanup step failed");
                    }
                }
                self.supervisor.run_attached(&argv)
            }
        }
    }

    // ── Profiles ─────────────────────────────────────────────────────

    /// Swap device identity and container name in one step. Refused while
    /// anything is active, so running processes never outlive the identity
    /// they were started with.
    pub fn apply_profile(
        &mut self,
        device: Device,
        container_name: impl Into<String>,
    ) -> Result<(), CoreError> {
        let active = self.model.active();
        if !active.is_empty() {
            return Err(CoreError::InvariantViolation {
                message: format!(
                    "stop {} before loading another profile",
                    active
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            });
        }
        let container_name = container_name.into();
        info!(device = %device, container = %container_name, "profile applied");
        self.model.replace_identity(device, container_name);
        Ok(())
    }
}

fn supervisor_for(config: &OrchestratorConfig) -> ProcessSupervisor {
    let supervisor = ProcessSupervisor::new(config.grace_period);
    match &config.log_dir {
        Some(dir) => supervisor.with_log_dir(dir),
        None => supervisor,
    }
}
