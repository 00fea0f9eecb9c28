//! Dependency-aware lifecycle orchestration for a LiDAR appliance.
//!
//! The appliance exposes four subsystems (device power, telemetry
//! streaming, recording and playback), each backed by an external program.
//! This crate keeps an authoritative model of what runs and drives every
//! change through the dependency rules:
//!
//! - **[`Orchestrator`]**: facade owning the model, the graph, the process
//!   driver and the link manager. One operation at a time.
//!
//! - **[`SubsystemGraph`]**: static dependency (`Recording` needs
//!   `Streaming` needs `Power`) and exclusion (`Playback` versus
//!   `Streaming`/`Recording`) tables, and the cascade planner and executor
//!   behind [`Orchestrator::toggle`].
//!
//! - **[`StatusModel`]**: per-subsystem lifecycle state, process handles,
//!   device identity and host environment flags. Mutable only inside this
//!   crate; every transition is validated and recorded.
//!
//! - **[`ProcessSupervisor`]**: spawn, liveness probe, graceful stop with
//!   `SIGKILL` escalation, and one-shot command execution.
//!
//! - **[`NetworkLinkManager`]**: interface discovery, idempotent subnet
//!   assignment and the bounded reachability probe.
//!
//! - **[`menu`]**: pure projection of a model into annotated menu actions.
//!
//! - **[`Session`]**: guard that runs the shutdown cascade exactly once on
//!   any exit path.

pub mod commands;
pub mod container;
pub mod error;
pub mod graph;
pub mod menu;
pub mod model;
pub mod network;
pub mod orchestrator;
pub mod process;
pub mod session;

// ── Primary re-exports ──────────────────────────────────────────────
pub use commands::{CommandSettings, CommandTemplates};
pub use error::CoreError;
pub use graph::{Cascade, CascadeReport, ShutdownReport, SubsystemGraph, Violation};
pub use menu::{Action, Annotation, Menu, MenuProjector, Operation, Severity};
pub use network::{AddressChange, InterfaceInfo, IpCommand, LinkControl, NetworkLinkManager};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use process::{ProcessHandle, ProcessSupervisor};
pub use session::{Session, ShutdownHandle};

pub use model::{
    DEFAULT_LIDAR_IP, Device, Environment, StatusModel, StatusSnapshot, Subsystem,
    SubsystemSnapshot, SubsystemState,
};
