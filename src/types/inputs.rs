use serde::{Deserialize, Serialize};

use super::actions::FailsafeAction;

/// Health summary of the state estimator, published by the estimation
/// backend at its own rate. Variances are normalized test ratios where
/// `1.0` marks the tuning threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EstimatorStatus {
    pub attitude_valid: bool,
    pub position_valid: bool,
    pub vert_pos_valid: bool,
    /// Estimator rejects GNSS input as implausible.
    pub gps_glitching: bool,
    /// Estimator navigates without absolute position aiding.
    pub dead_reckoning: bool,
    pub position_variance: f32,
    pub velocity_variance: f32,
    pub compass_variance: f32,
    /// Estimated altitude above the arming position [m].
    pub alt_m: f32,
}

impl EstimatorStatus {
    pub const fn nominal() -> Self {
        Self {
            attitude_valid: true,
            position_valid: true,
            vert_pos_valid: true,
            gps_glitching: false,
            dead_reckoning: false,
            position_variance: 0.1,
            velocity_variance: 0.1,
            compass_variance: 0.1,
            alt_m: 0.0,
        }
    }
}

/// Most recent pilot input as decoded from the radio link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RadioInput {
    /// A valid frame arrived within the receiver timeout.
    pub present: bool,
    /// Raw throttle channel value [us].
    pub throttle_us: u16,
}

impl RadioInput {
    pub const fn nominal() -> Self {
        Self {
            present: true,
            throttle_us: 1500,
        }
    }
}

/// GNSS receiver quality, published by the GNSS driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GnssStatus {
    pub fix_ok: bool,
    pub hdop: f32,
    pub num_sats: u8,
}

impl GnssStatus {
    pub const fn nominal() -> Self {
        Self {
            fix_ok: true,
            hdop: 0.8,
            num_sats: 14,
        }
    }
}

/// Battery monitor output. The monitor owns the per-severity action
/// selection and reports only the most severe pending action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryStatus {
    pub voltage: f32,
    /// Corrective action requested by the monitor, if any.
    pub failsafe_action: Option<FailsafeAction>,
}

impl BatteryStatus {
    pub const fn nominal() -> Self {
        Self {
            voltage: 16.4,
            failsafe_action: None,
        }
    }
}

/// Navigation readiness flags, published by the navigation stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NavStatus {
    pub home_set: bool,
    /// Home was set by the operator and must not be moved on arming.
    pub home_locked: bool,
    pub position_ok: bool,
    pub mission_loaded: bool,
    /// Loaded mission contains a landing sequence.
    pub mission_has_landing: bool,
    /// The return-path recorder has a usable path to home.
    pub smartrtl_available: bool,
    /// The active mode needs terrain data to navigate.
    pub terrain_needed: bool,
    pub terrain_data_ok: bool,
    /// The vehicle is outside a configured geofence.
    pub fence_breached: bool,
}

impl NavStatus {
    pub const fn nominal() -> Self {
        Self {
            home_set: true,
            home_locked: false,
            position_ok: true,
            mission_loaded: false,
            mission_has_landing: false,
            smartrtl_available: true,
            terrain_needed: false,
            terrain_data_ok: true,
            fence_breached: false,
        }
    }
}

/// Calibration and health state of the raw sensor suite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorHealth {
    pub gyr_calibrated: bool,
    pub acc_calibrated: bool,
    pub compass_calibrated: bool,
    /// All compasses agree within the consistency margin.
    pub compass_consistent: bool,
    pub rc_calibrated: bool,
    pub baro_healthy: bool,
    /// Barometric altitude above the arming position [m].
    pub baro_alt_m: f32,
}

impl SensorHealth {
    pub const fn nominal() -> Self {
        Self {
            gyr_calibrated: true,
            acc_calibrated: true,
            compass_calibrated: true,
            compass_consistent: true,
            rc_calibrated: true,
            baro_healthy: true,
            baro_alt_m: 0.0,
        }
    }
}

/// State of the motor output stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorStatus {
    pub initialised_ok: bool,
    /// Motor interlock switch currently permits motor output.
    pub interlock_active: bool,
    /// Emergency stop switch has latched the outputs off.
    pub emergency_stopped: bool,
}

impl MotorStatus {
    pub const fn nominal() -> Self {
        Self {
            initialised_ok: true,
            interlock_active: false,
            emergency_stopped: false,
        }
    }
}

/// Output of the traffic avoidance backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdsbThreat {
    /// An intruder aircraft requires evasive action.
    pub threat_detected: bool,
}

impl AdsbThreat {
    pub const fn nominal() -> Self {
        Self {
            threat_detected: false,
        }
    }
}
