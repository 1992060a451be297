use serde::{Deserialize, Serialize};

use crate::types::actions::{
    ActionPriority, FailsafeAction, FailsafeOption, DEFAULT_ACTION_PRIORITY,
};
use crate::types::mode::FlightMode;
use crate::types::status::ArmingBlocker;

/// Configuration used when no stored configuration is provided.
pub const DEFAULT_CONFIG: SupervisorConfig = SupervisorConfig::const_default();

/// Complete configuration of the supervisor. Distributed to the tasks
/// through the [`CFG_SUPERVISOR`](crate::signals::CFG_SUPERVISOR) signal
/// at boot and on any configuration change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SupervisorConfig {
    pub arming: ArmingConfig,
    pub failsafe: FailsafeConfig,
    pub mode: ModeConfig,
}

crate::const_default!(SupervisorConfig => {
    arming: ArmingConfig::const_default(),
    failsafe: FailsafeConfig::const_default(),
    mode: ModeConfig::const_default(),
});

impl SupervisorConfig {
    /// Serialize into `buf` in the compact wire format used for
    /// configuration transfer.
    pub fn to_slice<'b>(&self, buf: &'b mut [u8]) -> Result<&'b mut [u8], postcard::Error> {
        postcard::to_slice(self, buf)
    }

    /// Deserialize from the compact wire format.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ArmingConfig {
    /// Check bits consulted by the pre-arm sequence. An empty mask
    /// reduces the sequence to the mandatory checks only.
    pub enabled_checks: ArmingBlocker,
    /// Aux channel bound to the motor interlock switch, if any.
    pub interlock_channel: Option<u8>,
    /// Aux channel bound to the emergency stop switch, if any.
    pub estop_channel: Option<u8>,
    /// Spool-up grace period after arming [ms].
    pub arming_delay_ms: u32,
    /// Window after disarming in which re-arming skips the full
    /// check sequence [ms].
    pub rearm_grace_ms: u32,
    /// Maximum lean angle at which arming is accepted [deg].
    pub max_lean_angle_deg: f32,
    /// GNSS horizontal dilution of precision limit.
    pub hdop_limit: f32,
    /// Minimum GNSS satellite count.
    pub min_sats: u8,
    /// Minimum battery voltage, `0.0` disables the check [V].
    pub min_voltage: f32,
    /// Maximum tolerated spread between barometric and estimated
    /// altitude [m].
    pub max_alt_disparity_m: f32,
}

crate::const_default!(ArmingConfig => {
    enabled_checks: ArmingBlocker::all(),
    interlock_channel: None,
    estop_channel: None,
    arming_delay_ms: 2000,
    rearm_grace_ms: 5000,
    max_lean_angle_deg: 30.0,
    hdop_limit: 1.4,
    min_sats: 6,
    min_voltage: 0.0,
    max_alt_disparity_m: 1.0,
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FailsafeConfig {
    pub radio: RadioFailsafeConfig,
    pub gcs: GcsFailsafeConfig,
    pub ekf: EkfFailsafeConfig,
    pub terrain: TerrainFailsafeConfig,
    pub adsb: AdsbFailsafeConfig,
    pub deadreckon: DeadReckonFailsafeConfig,
    /// Mode exemptions applied before action resolution.
    pub options: FailsafeOption,
    /// Precedence over simultaneously requested actions.
    pub priority: ActionPriority,
}

crate::const_default!(FailsafeConfig => {
    radio: RadioFailsafeConfig::const_default(),
    gcs: GcsFailsafeConfig::const_default(),
    ekf: EkfFailsafeConfig::const_default(),
    terrain: TerrainFailsafeConfig::const_default(),
    adsb: AdsbFailsafeConfig::const_default(),
    deadreckon: DeadReckonFailsafeConfig::const_default(),
    options: FailsafeOption::empty(),
    priority: DEFAULT_ACTION_PRIORITY,
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RadioFailsafeConfig {
    pub enable: bool,
    pub action: FailsafeAction,
    /// Throttle below this value counts as a receiver-side failsafe [us].
    pub throttle_min_us: u16,
    /// Consecutive bad readings before the failsafe triggers.
    pub trigger_count: u8,
    /// Throttle must exceed the trigger level by this margin to clear [us].
    pub clear_margin_us: u16,
}

crate::const_default!(RadioFailsafeConfig => {
    enable: true,
    action: FailsafeAction::Rtl,
    throttle_min_us: 975,
    trigger_count: 3,
    clear_margin_us: 10,
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GcsFailsafeConfig {
    pub enable: bool,
    pub action: FailsafeAction,
    /// Heartbeat silence before the failsafe triggers [ms].
    pub timeout_ms: u32,
}

crate::const_default!(GcsFailsafeConfig => {
    enable: true,
    action: FailsafeAction::Rtl,
    timeout_ms: 5000,
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EkfFailsafeConfig {
    pub action: FailsafeAction,
    /// Filtered variance level at which a tick counts against the
    /// estimator.
    pub variance_threshold: f32,
    /// Cutoff of the low-pass filter applied to the raw variances [Hz].
    pub filter_hz: f32,
    /// Ticks over threshold before the failsafe triggers, and ticks
    /// under it before the failsafe clears.
    pub trigger_iterations: u8,
}

crate::const_default!(EkfFailsafeConfig => {
    action: FailsafeAction::Land,
    variance_threshold: 0.8,
    filter_hz: 5.0,
    trigger_iterations: 10,
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TerrainFailsafeConfig {
    pub enable: bool,
    pub action: FailsafeAction,
    /// Continuous terrain data outage before the failsafe triggers [ms].
    pub timeout_ms: u32,
}

crate::const_default!(TerrainFailsafeConfig => {
    enable: true,
    action: FailsafeAction::Rtl,
    timeout_ms: 5000,
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdsbFailsafeConfig {
    pub enable: bool,
    pub action: FailsafeAction,
}

crate::const_default!(AdsbFailsafeConfig => {
    enable: true,
    action: FailsafeAction::Rtl,
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeadReckonFailsafeConfig {
    pub enable: bool,
    pub action: FailsafeAction,
    /// Continuous dead-reckoning before the failsafe triggers [ms].
    pub timeout_ms: u32,
}

crate::const_default!(DeadReckonFailsafeConfig => {
    enable: true,
    action: FailsafeAction::Rtl,
    timeout_ms: 30_000,
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModeConfig {
    /// Mode entered when the supervisor comes up.
    pub initial_mode: FlightMode,
    /// Bitmask of mode numbers the ground station may not command.
    pub gcs_block_mask: u32,
}

crate::const_default!(ModeConfig => {
    initial_mode: FlightMode::Stabilize,
    gcs_block_mask: 0,
});
