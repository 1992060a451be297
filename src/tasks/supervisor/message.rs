use crate::errors::SupervisorError;
use crate::types::actions::ModeReason;
use crate::types::mode::FlightMode;

/// The command to be sent to the supervisor task.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    ArmDisarm(ArmDisarm),
    SetFlightMode(SetFlightMode),

    /// Run the full pre-arm sequence with reporting enabled, without
    /// arming. Used by ground stations to surface the complete list of
    /// blockers on demand.
    RunPreArmChecks,
}

macro_rules! impl_command_from {
    ($command:ident) => {
        impl From<$command> for super::Command {
            fn from(value: $command) -> Self {
                super::Command::$command(value)
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ArmDisarm {
    pub arm: bool,
    pub force: bool,
}

impl_command_from!(ArmDisarm);

/// Request a flight mode change. The mode travels as its raw number,
/// the supervisor rejects numbers that do not map to a compiled mode.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetFlightMode {
    pub mode: u8,
}

impl SetFlightMode {
    pub const fn new(mode: FlightMode) -> Self {
        Self { mode: mode as u8 }
    }
}

impl_command_from!(SetFlightMode);

/// A request to the supervisor task.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Request {
    pub command: Command,
    pub origin: Origin,
}

impl<T: Into<Command>> From<(T, Origin)> for Request {
    fn from((command, origin): (T, Origin)) -> Self {
        Request {
            command: command.into(),
            origin,
        }
    }
}

/// The response to a command to the supervisor task.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response {
    /// The command requested an unsupported operation
    Unsupported,

    /// The command would have no effect on the system
    Unchanged,

    /// The command was accepted and processed appropriately
    Accepted,

    /// The command was rejected due to the current state of the system
    Rejected(SupervisorError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Origin {
    /// The command was sent by the pilot via the RC
    RemoteControl,

    /// The command was sent via a telemetry link
    GroundControl,

    /// The command is of unspecified origin
    Unspecified,

    /// The command was the result of a failsafe event
    Failsafe,

    /// The command was the result of a kill switch event
    KillSwitch,

    /// The command was issued by an automated event
    Automatic,

    /// The command was issued via a command line
    CommandLine,
}

impl Origin {
    /// Reason recorded when this origin commands a mode change.
    pub fn mode_reason(self) -> ModeReason {
        match self {
            Origin::RemoteControl => ModeReason::Pilot,
            Origin::GroundControl => ModeReason::GcsCommand,
            Origin::Failsafe => ModeReason::Failsafe,
            Origin::Automatic => ModeReason::Mission,
            Origin::KillSwitch | Origin::CommandLine | Origin::Unspecified => ModeReason::Unknown,
        }
    }
}
