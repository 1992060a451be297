use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sync::procedure::ProcedureError;
use crate::types::status::ArmingBlocker;

/// Top level error of the supervisor, every fallible operation folds
/// into this type.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SupervisorError {
    #[error("Arming error: {0}")]
    Arm(#[from] ArmError),
    #[error("Mode error: {0}")]
    Mode(#[from] ModeError),
    #[error("Procedure error: {0}")]
    Procedure(#[from] ProcedureError),
}

#[non_exhaustive]
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArmError {
    #[error("Pre-arm checks failed: {0:?}")]
    ChecksFailed(ArmingBlocker),
    #[error("An arming procedure is already running.")]
    InProgress,
    #[error("Arming is not possible after flight termination.")]
    Terminated,
    #[error("The active flight mode does not allow arming.")]
    ModeForbidsArming,
    #[error("Rudder disarming requires manual throttle or a landed vehicle.")]
    RudderDisarmNotAllowed,
    #[error("The vehicle must be landed to disarm.")]
    NotLanded,
}

#[non_exhaustive]
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModeError {
    #[error("Mode number {0} is not recognized.")]
    UnknownMode(u8),
    #[error("The mode change is blocked by operator configuration.")]
    BlockedByConfig,
    #[error("The mode requires a position estimate.")]
    NoPositionEstimate,
    #[error("The mode requires a home position.")]
    NoHomePosition,
    #[error("The mode requires a stored return path.")]
    NoReturnPath,
    #[error("The mode requires a loaded mission.")]
    NoMission,
    #[error("The loaded mission has no landing sequence.")]
    NoLandingSequence,
    #[error("Mode changes are suppressed after flight termination.")]
    Terminated,
}

/// Suppresses repeated identical values within a hold-off window. Used
/// to keep periodic tasks from logging the same degradation every tick.
pub struct Debounce<T> {
    duration: embassy_time::Duration,
    inner: Option<(embassy_time::Instant, T)>,
}

impl<T: PartialEq + Clone> Debounce<T> {
    pub fn new(duration: embassy_time::Duration) -> Self {
        Self {
            duration,
            inner: None,
        }
    }

    pub fn evaluate(&mut self, value: T) -> Option<T> {
        if self
            .inner
            .as_ref()
            .is_none_or(|(t, e)| t.elapsed() > self.duration || e != &value)
        {
            self.inner = Some((embassy_time::Instant::now(), value.clone()));
            Some(value)
        } else {
            None
        }
    }
}
