//! External process lifecycle: handles and the supervisor that owns them.

mod handle;
mod supervisor;

pub use handle::ProcessHandle;
pub use supervisor::{CommandOutput, DEFAULT_GRACE_PERIOD, ProcessSupervisor, StopOutcome};
