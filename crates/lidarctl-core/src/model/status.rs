// ── Status model ──
//
// The single source of truth for what the orchestrator believes is
// running. Readers get `&StatusModel`; only the graph executor and the
// orchestrator (crate-internal) can mutate it, and every state change is
// validated against the lifecycle and recorded.

use serde::Serialize;
use tracing::info;

use super::device::Device;
use super::subsystem::{StateChange, Subsystem, SubsystemState};
use crate::error::CoreError;
use crate::process::ProcessHandle;

/// Flags derived from probing the host, refreshed on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Environment {
    pub docker_image_built: bool,
    pub linked_up: bool,
}

#[derive(Debug, Default)]
struct SubsystemSlot {
    state: SubsystemState,
    handle: Option<ProcessHandle>,
}

#[derive(Debug)]
pub struct StatusModel {
    device: Device,
    container_name: String,
    slots: [SubsystemSlot; 4],
    environment: Environment,
    history: Vec<StateChange>,
}

impl StatusModel {
    /// A fresh model with every subsystem stopped.
    pub fn new(device: Device, container_name: impl Into<String>) -> Self {
        Self {
            device,
            container_name: container_name.into(),
            slots: Default::default(),
            environment: Environment::default(),
            history: Vec::new(),
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn state(&self, subsystem: Subsystem) -> SubsystemState {
        self.slot(subsystem).state
    }

    pub fn is_running(&self, subsystem: Subsystem) -> bool {
        self.state(subsystem).is_running()
    }

    pub fn handle(&self, subsystem: Subsystem) -> Option<&ProcessHandle> {
        self.slot(subsystem).handle.as_ref()
    }

    /// Every state change since the model was created, oldest first.
    pub fn history(&self) -> &[StateChange] {
        &self.history
    }

    /// Subsystems currently running or starting.
    pub fn active(&self) -> Vec<Subsystem> {
        Subsystem::ALL
            .into_iter()
            .filter(|s| self.state(*s).is_active())
            .collect()
    }

    /// Serializable view for status output.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            lidar_ip_address: self.device.ip_address.to_string(),
            network_interface: self.device.interface_name().to_owned(),
            container_name: self.container_name.clone(),
            environment: self.environment,
            subsystems: Subsystem::ALL
                .into_iter()
                .map(|s| SubsystemSnapshot {
                    subsystem: s,
                    state: self.state(s),
                    pid: self.handle(s).map(ProcessHandle::pid),
                })
                .collect(),
        }
    }

    // ── Writes (crate-internal) ──────────────────────────────────────

    /// Move `subsystem` to `to`, rejecting edges the lifecycle forbids.
    pub(crate) fn transition(
        &mut self,
        subsystem: Subsystem,
        to: SubsystemState,
    ) -> Result<(), CoreError> {
        let from = self.state(subsystem);
        if !from.can_transition_to(to) {
            return Err(CoreError::IllegalTransition {
                subsystem,
                from,
                to,
            });
        }
        self.slot_mut(subsystem).state = to;
        self.history.push(StateChange::new(subsystem, from, to));
        info!(subsystem = %subsystem, %from, %to, "state change");
        Ok(())
    }

    pub(crate) fn attach_handle(&mut self, subsystem: Subsystem, handle: ProcessHandle) {
        self.slot_mut(subsystem).handle = Some(handle);
    }

    pub(crate) fn handle_mut(&mut self, subsystem: Subsystem) -> Option<&mut ProcessHandle> {
        self.slot_mut(subsystem).handle.as_mut()
    }

    pub(crate) fn take_handle(&mut self, subsystem: Subsystem) -> Option<ProcessHandle> {
        self.slot_mut(subsystem).handle.take()
    }

    pub(crate) fn set_environment(&mut self, environment: Environment) {
        self.environment = environment;
    }

    pub(crate) fn set_interface(&mut self, interface: Option<String>) {
        self.device = Device::new(self.device.ip_address, interface);
    }

    /// Replace device identity and container name in one step.
    pub(crate) fn replace_identity(&mut self, device: Device, container_name: String) {
        self.device = device;
        self.container_name = container_name;
    }

    /// Put a subsystem straight into `state`, bypassing the lifecycle.
    /// Only for building fixtures that normal operation cannot reach.
    #[cfg(test)]
    pub(crate) fn force_state(&mut self, subsystem: Subsystem, state: SubsystemState) {
        self.slot_mut(subsystem).state = state;
    }

    fn slot(&self, subsystem: Subsystem) -> &SubsystemSlot {
        &self.slots[subsystem.index()]
    }

    fn slot_mut(&mut self, subsystem: Subsystem) -> &mut SubsystemSlot {
        &mut self.slots[subsystem.index()]
    }
}

/// Plain-data projection of [`StatusModel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub lidar_ip_address: String,
    pub network_interface: String,
    pub container_name: String,
    pub environment: Environment,
    pub subsystems: Vec<SubsystemSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsystemSnapshot {
    pub subsystem: Subsystem,
    pub state: SubsystemState,
    pub pid: Option<u32>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn model() -> StatusModel {
        StatusModel::new(Device::default(), "voyant-sdk-container")
    }

    #[test]
    fn starts_with_everything_stopped() {
        let m = model();
        for s in Subsystem::ALL {
            assert_eq!(m.state(s), SubsystemState::Stopped);
            assert!(m.handle(s).is_none());
        }
        assert!(m.active().is_empty());
        assert!(m.history().is_empty());
    }

    #[test]
    fn transitions_are_validated_and_recorded() {
        let mut m = model();
        m.transition(Subsystem::Power, SubsystemState::Starting)
            .unwrap();
        m.transition(Subsystem::Power, SubsystemState::Running).unwrap();

        let err = m
            .transition(Subsystem::Power, SubsystemState::Stopped)
            .unwrap_err();
        assert!(matches!(err, CoreError::IllegalTransition { .. }));
        assert_eq!(m.state(Subsystem::Power), SubsystemState::Running);

        assert_eq!(
            m.history(),
            &[
                StateChange::new(
                    Subsystem::Power,
                    SubsystemState::Stopped,
                    SubsystemState::Starting
                ),
                StateChange::new(
                    Subsystem::Power,
                    SubsystemState::Starting,
                    SubsystemState::Running
                ),
            ]
        );
    }

    #[test]
    fn snapshot_reflects_device_and_states() {
        let mut m = model();
        m.set_interface(Some("eth1".into()));
        m.force_state(Subsystem::Streaming, SubsystemState::Running);
        let snap = m.snapshot();
        assert_eq!(snap.network_interface, "eth1");
        assert_eq!(snap.lidar_ip_address, "192.168.20.20");
        assert_eq!(snap.subsystems[1].state, SubsystemState::Running);
        assert_eq!(snap.subsystems[1].pid, None);
    }
}
