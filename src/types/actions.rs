use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

/// Corrective action a failsafe source can request. The numeric values
/// match the parameter encoding of the external configuration store.
///
/// The enumeration order carries no meaning, precedence between actions
/// is defined by [`ActionPriority`] alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FailsafeAction {
    None = 0,
    Land = 1,
    Rtl = 2,
    SmartRtl = 3,
    SmartRtlLand = 4,
    Terminate = 5,
    AutoDoLandStart = 6,
    BrakeLand = 7,
}

/// The failure source a triggered action traces back to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FailsafeSource {
    Radio,
    Gcs,
    Ekf,
    Terrain,
    Adsb,
    DeadReckon,
    Battery,
}

/// Outcome of a resolver pass over the triggered failsafe sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResolvedFailsafe {
    pub action: FailsafeAction,
    /// Highest precedence source demanding the action.
    pub source: FailsafeSource,
}

/// Reason a mode transition was requested, recorded with every transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModeReason {
    Unknown,
    Pilot,
    GcsCommand,
    Mission,
    Failsafe,
    FailsafeRecovery,
    Initialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FailsafeOption(u32);

bitflags::bitflags! {
    /// Mode exemptions for failsafe handling. Each bit suppresses one
    /// specific failsafe action while the named mode condition holds.
    impl FailsafeOption: u32 {

        /// **Bit 0** - Continue an autonomous mission when the radio link is lost.
        const RC_CONTINUE_IF_AUTO = 1 << 0;

        /// **Bit 1** - Continue an autonomous mission when the GCS link is lost.
        const GCS_CONTINUE_IF_AUTO = 1 << 1;

        /// **Bit 2** - Continue guided flight when the radio link is lost.
        const RC_CONTINUE_IF_GUIDED = 1 << 2;

        /// **Bit 3** - Never interrupt an in-progress landing.
        const CONTINUE_IF_LANDING = 1 << 3;

        /// **Bit 4** - Continue pilot-controlled flight when the GCS link is lost.
        const GCS_CONTINUE_IF_PILOT_CONTROL = 1 << 4;
    }
}

/// Explicit precedence over failsafe actions: earlier position wins when
/// several actions are simultaneously eligible. The table always contains
/// every action exactly once, with the `None` entry acting as the terminal
/// "nothing eligible" fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ActionPriority(pub [FailsafeAction; 8]);

impl ActionPriority {
    /// Position of an action in the table. `None` for an action that was
    /// left out of a (user-supplied) table.
    pub fn precedence(&self, action: FailsafeAction) -> Option<usize> {
        self.0.iter().position(|&a| a == action)
    }

    /// Scan the table in order and return the first action for which
    /// `eligible` holds. Falls back to [`FailsafeAction::None`] when no
    /// table entry is eligible.
    pub fn first_eligible(&self, mut eligible: impl FnMut(FailsafeAction) -> bool) -> FailsafeAction {
        for &action in self.0.iter() {
            if action == FailsafeAction::None {
                continue;
            }
            if eligible(action) {
                return action;
            }
        }
        FailsafeAction::None
    }
}

/// Default precedence: termination dominates, then the actions that put the
/// vehicle on the ground soonest, then the return family.
pub const DEFAULT_ACTION_PRIORITY: ActionPriority = ActionPriority([
    FailsafeAction::Terminate,
    FailsafeAction::Land,
    FailsafeAction::BrakeLand,
    FailsafeAction::AutoDoLandStart,
    FailsafeAction::Rtl,
    FailsafeAction::SmartRtlLand,
    FailsafeAction::SmartRtl,
    FailsafeAction::None,
]);

// The default table must keep Terminate first and end in the None sentinel.
static_assertions::const_assert!(
    DEFAULT_ACTION_PRIORITY.0[0] as u8 == FailsafeAction::Terminate as u8
);
static_assertions::const_assert!(
    DEFAULT_ACTION_PRIORITY.0[7] as u8 == FailsafeAction::None as u8
);
