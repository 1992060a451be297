use crate::tasks::supervisor::message::Origin;

use super::actions::{FailsafeAction, FailsafeSource, ModeReason};
use super::mode::FlightMode;
use super::status::ArmingBlocker;

/// Audit record of a state change inside the supervisor. Events are
/// published on a best-effort broadcast channel, consumers that lag
/// simply miss entries.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SupervisorEvent {
    /// Motors were armed.
    Armed { origin: Origin, forced: bool },
    /// An arming request was refused with the given blockers raised.
    ArmingFailed { origin: Origin, blocker: ArmingBlocker },
    /// A single pre-arm check failed during a reporting pass.
    PreArmFail { message: &'static str },
    /// Motors were disarmed.
    Disarmed { origin: Origin, forced: bool },
    /// The active flight mode changed.
    ModeChanged {
        from: FlightMode,
        to: FlightMode,
        reason: ModeReason,
    },
    /// A mode change request was refused.
    ModeChangeFailed { to: FlightMode, reason: ModeReason },
    /// A failsafe source crossed into its triggered state.
    FailsafeTriggered { source: FailsafeSource },
    /// A failsafe source recovered.
    FailsafeCleared { source: FailsafeSource },
    /// A triggered source was left unhandled due to a mode exemption.
    FailsafeSuppressed {
        source: FailsafeSource,
        action: FailsafeAction,
    },
    /// The dispatcher carried out a failsafe action.
    ActionApplied {
        action: FailsafeAction,
        source: FailsafeSource,
    },
    /// Flight termination engaged, motor output is latched off.
    MotorsTerminated,
    /// Learned compass offsets were written to persistent storage.
    CompassOffsetsSaved,
}
