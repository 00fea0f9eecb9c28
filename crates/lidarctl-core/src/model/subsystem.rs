// ── Subsystem domain types ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};

/// One of the four managed capabilities of the appliance.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    IntoStaticStr,
)]
pub enum Subsystem {
    /// Device power, driven by one-shot endpoint commands.
    Power,
    /// Live telemetry bridge.
    Streaming,
    /// Binary logger writing received frames to disk.
    Recording,
    /// Replay of a previous recording.
    Playback,
}

impl Subsystem {
    pub const ALL: [Subsystem; 4] = [
        Subsystem::Power,
        Subsystem::Streaming,
        Subsystem::Recording,
        Subsystem::Playback,
    ];

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Power => 0,
            Self::Streaming => 1,
            Self::Recording => 2,
            Self::Playback => 3,
        }
    }

    /// Human-facing name used in menu labels.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Power => "Lidar",
            Self::Streaming => "Streaming",
            Self::Recording => "Recording",
            Self::Playback => "Playback",
        }
    }

    /// Lowercase identifier for file names and log fields.
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::Streaming => "streaming",
            Self::Recording => "recording",
            Self::Playback => "playback",
        }
    }

    /// Whether this subsystem is backed by a long-running process.
    pub const fn is_process_backed(self) -> bool {
        !matches!(self, Self::Power)
    }
}

/// Lifecycle state of a subsystem.
///
/// The nominal half-cycles are `Stopped → Starting → Running` and
/// `Running → Stopping → Stopped`. Two abort edges exist so that a failed
/// step never leaves a subsystem in limbo: `Starting → Stopped` when the
/// launch fails and `Stopping → Running` when the halt fails.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr,
)]
pub enum SubsystemState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl SubsystemState {
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Running or on its way there; these must be torn down on exit.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Starting)
    }

    pub fn is_transitional(self) -> bool {
        matches!(self, Self::Starting | Self::Stopping)
    }

    pub fn can_transition_to(self, next: SubsystemState) -> bool {
        matches!(
            (self, next),
            (Self::Stopped, Self::Starting)
                | (Self::Starting, Self::Running | Self::Stopped)
                | (Self::Running, Self::Stopping)
                | (Self::Stopping, Self::Stopped | Self::Running)
        )
    }
}

/// One recorded state change, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub subsystem: Subsystem,
    pub from: SubsystemState,
    pub to: SubsystemState,
}

impl StateChange {
    pub const fn new(subsystem: Subsystem, from: SubsystemState, to: SubsystemState) -> Self {
        Self {
            subsystem,
            from,
            to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::SubsystemState::{Running, Starting, Stopped, Stopping};

    #[test]
    fn running_is_never_reached_directly_from_stopped() {
        assert!(!Stopped.can_transition_to(Running));
        assert!(!Running.can_transition_to(Stopped));
        assert!(Stopped.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));
    }

    #[test]
    fn abort_edges_return_to_the_previous_rest_state() {
        assert!(Starting.can_transition_to(Stopped));
        assert!(Stopping.can_transition_to(Running));
        assert!(!Stopping.can_transition_to(Starting));
    }

    #[test]
    fn indices_follow_declaration_order() {
        for (i, s) in Subsystem::ALL.iter().enumerate() {
            assert_eq!(s.index(), i);
        }
        assert!(!Subsystem::Power.is_process_backed());
        assert!(Subsystem::Playback.is_process_backed());
    }
}
