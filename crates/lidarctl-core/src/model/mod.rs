// ── Domain model ──

mod device;
mod status;
mod subsystem;

pub use device::{DEFAULT_LIDAR_IP, Device, UNSET_INTERFACE, is_unset};
pub use status::{Environment, StatusModel, StatusSnapshot, SubsystemSnapshot};
pub use subsystem::{StateChange, Subsystem, SubsystemState};
