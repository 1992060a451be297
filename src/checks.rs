use nalgebra::{UnitQuaternion, Vector3};
use num_traits::Float as _;

use crate::config::SupervisorConfig;
use crate::types::actions::{ActionPriority, FailsafeAction};
use crate::types::inputs::{
    BatteryStatus, EstimatorStatus, GnssStatus, MotorStatus, NavStatus, SensorHealth,
};
use crate::types::mode::{FlightMode, LandedState};
use crate::types::status::{ArmingBlocker, FailsafeStatus};

/// Everything the pre-arm checks and the arming gate need to know about
/// the vehicle, gathered from the signal mesh by the calling task. The
/// caller keeps its snapshot across ticks, so a source that goes silent
/// is judged by its last published value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleSnapshot {
    pub system_init: bool,
    /// Mirror of the global termination latch.
    pub terminated: bool,
    pub active_mode: FlightMode,
    pub landed: LandedState,
    pub failsafe: FailsafeStatus,
    pub estimator: EstimatorStatus,
    pub attitude: UnitQuaternion<f32>,
    pub gnss: GnssStatus,
    pub battery: BatteryStatus,
    pub nav: NavStatus,
    pub sensors: SensorHealth,
    pub motors: MotorStatus,
}

impl VehicleSnapshot {
    /// Fully healthy snapshot, the baseline for tests and simulation.
    pub fn nominal() -> Self {
        Self {
            system_init: true,
            terminated: false,
            active_mode: FlightMode::Stabilize,
            landed: LandedState::OnGround,
            failsafe: FailsafeStatus::empty(),
            estimator: EstimatorStatus::nominal(),
            attitude: UnitQuaternion::identity(),
            gnss: GnssStatus::nominal(),
            battery: BatteryStatus::nominal(),
            nav: NavStatus::nominal(),
            sensors: SensorHealth::nominal(),
            motors: MotorStatus::nominal(),
        }
    }
}

/// Run the full pre-arm sequence and return the accumulated blockers.
///
/// The sequence never returns early on a failed check. Every check runs
/// and every failure is both set as a blocker bit and pushed through
/// `report`, so the operator sees the complete list in one pass.
///
/// Three rules shape the sequence:
/// - an armed vehicle skips the checks entirely,
/// - the mandatory checks run regardless of the configured mask,
/// - an empty check mask reduces the sequence to the mandatory checks.
pub fn run_pre_arm_checks(
    armed: bool,
    snapshot: &VehicleSnapshot,
    config: &SupervisorConfig,
    report: &mut impl FnMut(&'static str),
) -> ArmingBlocker {
    if armed {
        return ArmingBlocker::empty();
    }

    let mut blocker = ArmingBlocker::empty();
    system_checks(&mut blocker, snapshot, config, report);
    mandatory_checks(&mut blocker, snapshot, report);

    let enabled = config.arming.enabled_checks;
    if enabled.is_empty() {
        return blocker;
    }

    parameter_checks(&mut blocker, enabled, config, report);
    sensor_checks(&mut blocker, enabled, snapshot, config, report);
    estimator_checks(&mut blocker, enabled, snapshot, config, report);
    gnss_checks(&mut blocker, enabled, snapshot, config, report);
    battery_checks(&mut blocker, enabled, snapshot, config, report);
    failsafe_checks(&mut blocker, enabled, snapshot, report);
    motor_checks(&mut blocker, enabled, snapshot, report);
    fence_checks(&mut blocker, enabled, snapshot, report);
    mode_checks(&mut blocker, enabled, snapshot, report);

    blocker
}

fn check(
    blocker: &mut ArmingBlocker,
    enabled: ArmingBlocker,
    bit: ArmingBlocker,
    failed: bool,
    msg: &'static str,
    report: &mut impl FnMut(&'static str),
) {
    if failed && enabled.contains(bit) {
        blocker.insert(bit);
        report(msg);
    }
}

/// Checks that can never be masked out.
fn system_checks(
    blocker: &mut ArmingBlocker,
    snapshot: &VehicleSnapshot,
    config: &SupervisorConfig,
    report: &mut impl FnMut(&'static str),
) {
    let always = ArmingBlocker::all();
    check(
        blocker,
        always,
        ArmingBlocker::SYSTEM_INIT,
        !snapshot.system_init,
        "System not initialised",
        report,
    );
    check(
        blocker,
        always,
        ArmingBlocker::AUX_CONFLICT,
        config.arming.interlock_channel.is_some() && config.arming.estop_channel.is_some(),
        "Interlock/E-Stop conflict",
        report,
    );
    check(
        blocker,
        always,
        ArmingBlocker::TERMINATED,
        snapshot.terminated,
        "Motors terminated, reboot required",
        report,
    );
}

/// Estimator validity checks that can never be masked out: attitude
/// always, position and glitch state for position modes, altitude for
/// modes without manual throttle.
fn mandatory_checks(
    blocker: &mut ArmingBlocker,
    snapshot: &VehicleSnapshot,
    report: &mut impl FnMut(&'static str),
) {
    let always = ArmingBlocker::all();
    let estimator = &snapshot.estimator;
    check(
        blocker,
        always,
        ArmingBlocker::INS_ATTITUDE,
        !estimator.attitude_valid,
        "Attitude estimate invalid",
        report,
    );
    check(
        blocker,
        always,
        ArmingBlocker::POSITION,
        snapshot.active_mode.requires_position()
            && !(snapshot.nav.position_ok && estimator.position_valid),
        "Mode requires position estimate",
        report,
    );
    check(
        blocker,
        always,
        ArmingBlocker::GPS_GLITCH,
        snapshot.active_mode.requires_position() && estimator.gps_glitching,
        "GPS glitching",
        report,
    );
    check(
        blocker,
        always,
        ArmingBlocker::ALTITUDE,
        !snapshot.active_mode.has_manual_throttle() && !estimator.vert_pos_valid,
        "No altitude estimate",
        report,
    );
}

fn parameter_checks(
    blocker: &mut ArmingBlocker,
    enabled: ArmingBlocker,
    config: &SupervisorConfig,
    report: &mut impl FnMut(&'static str),
) {
    check(
        blocker,
        enabled,
        ArmingBlocker::PARAMETERS,
        !priority_table_valid(&config.failsafe.priority),
        "Invalid failsafe priority table",
        report,
    );
    check(
        blocker,
        enabled,
        ArmingBlocker::PARAMETERS,
        config.failsafe.radio.trigger_count == 0,
        "Invalid radio failsafe count",
        report,
    );
}

/// The table must hold every action exactly once to act as a total
/// order over the actions.
fn priority_table_valid(priority: &ActionPriority) -> bool {
    for raw in 0..=7u8 {
        let Ok(action) = FailsafeAction::try_from(raw) else {
            return false;
        };
        if priority.precedence(action).is_none() {
            return false;
        }
    }
    true
}

fn sensor_checks(
    blocker: &mut ArmingBlocker,
    enabled: ArmingBlocker,
    snapshot: &VehicleSnapshot,
    config: &SupervisorConfig,
    report: &mut impl FnMut(&'static str),
) {
    let sensors = &snapshot.sensors;
    check(
        blocker,
        enabled,
        ArmingBlocker::INS_ATTITUDE,
        !sensors.gyr_calibrated,
        "Gyros not calibrated",
        report,
    );
    check(
        blocker,
        enabled,
        ArmingBlocker::INS_ATTITUDE,
        !sensors.acc_calibrated,
        "Accels not calibrated",
        report,
    );
    check(
        blocker,
        enabled,
        ArmingBlocker::COMPASS,
        !sensors.compass_calibrated,
        "Compass not calibrated",
        report,
    );
    check(
        blocker,
        enabled,
        ArmingBlocker::COMPASS,
        !sensors.compass_consistent,
        "Compasses inconsistent",
        report,
    );
    check(
        blocker,
        enabled,
        ArmingBlocker::RC_CALIB,
        !sensors.rc_calibrated,
        "RC not calibrated",
        report,
    );
    check(
        blocker,
        enabled,
        ArmingBlocker::BARO_DISPARITY,
        !sensors.baro_healthy,
        "Barometer unhealthy",
        report,
    );
    check(
        blocker,
        enabled,
        ArmingBlocker::BARO_DISPARITY,
        (sensors.baro_alt_m - snapshot.estimator.alt_m).abs() > config.arming.max_alt_disparity_m,
        "Altitude disparity",
        report,
    );
}

fn estimator_checks(
    blocker: &mut ArmingBlocker,
    enabled: ArmingBlocker,
    snapshot: &VehicleSnapshot,
    config: &SupervisorConfig,
    report: &mut impl FnMut(&'static str),
) {
    check(
        blocker,
        enabled,
        ArmingBlocker::INS_ATTITUDE,
        lean_angle_deg(&snapshot.attitude) > config.arming.max_lean_angle_deg,
        "Vehicle leaning too far",
        report,
    );
}

/// Tilt of the body z axis away from vertical.
fn lean_angle_deg(attitude: &UnitQuaternion<f32>) -> f32 {
    let body_up = attitude * Vector3::z();
    body_up.z.clamp(-1.0, 1.0).acos().to_degrees()
}

fn gnss_checks(
    blocker: &mut ArmingBlocker,
    enabled: ArmingBlocker,
    snapshot: &VehicleSnapshot,
    config: &SupervisorConfig,
    report: &mut impl FnMut(&'static str),
) {
    let gnss = &snapshot.gnss;
    check(
        blocker,
        enabled,
        ArmingBlocker::GPS_QUALITY,
        !gnss.fix_ok,
        "No GNSS fix",
        report,
    );
    check(
        blocker,
        enabled,
        ArmingBlocker::GPS_QUALITY,
        gnss.hdop > config.arming.hdop_limit,
        "GNSS HDOP too high",
        report,
    );
    check(
        blocker,
        enabled,
        ArmingBlocker::GPS_QUALITY,
        gnss.num_sats < config.arming.min_sats,
        "Too few GNSS satellites",
        report,
    );
}

fn battery_checks(
    blocker: &mut ArmingBlocker,
    enabled: ArmingBlocker,
    snapshot: &VehicleSnapshot,
    config: &SupervisorConfig,
    report: &mut impl FnMut(&'static str),
) {
    let battery = &snapshot.battery;
    check(
        blocker,
        enabled,
        ArmingBlocker::BATTERY,
        config.arming.min_voltage > 0.0 && battery.voltage < config.arming.min_voltage,
        "Battery voltage low",
        report,
    );
    check(
        blocker,
        enabled,
        ArmingBlocker::BATTERY,
        battery.failsafe_action.is_some(),
        "Battery failsafe active",
        report,
    );
}

fn failsafe_checks(
    blocker: &mut ArmingBlocker,
    enabled: ArmingBlocker,
    snapshot: &VehicleSnapshot,
    report: &mut impl FnMut(&'static str),
) {
    check(
        blocker,
        enabled,
        ArmingBlocker::RADIO_FAILSAFE,
        snapshot.failsafe.contains(FailsafeStatus::RADIO),
        "Radio failsafe on",
        report,
    );
    check(
        blocker,
        enabled,
        ArmingBlocker::GCS_FAILSAFE,
        snapshot.failsafe.contains(FailsafeStatus::GCS),
        "GCS failsafe on",
        report,
    );
}

fn motor_checks(
    blocker: &mut ArmingBlocker,
    enabled: ArmingBlocker,
    snapshot: &VehicleSnapshot,
    report: &mut impl FnMut(&'static str),
) {
    check(
        blocker,
        enabled,
        ArmingBlocker::MOTORS,
        !snapshot.motors.initialised_ok,
        "Motors not initialised",
        report,
    );
    check(
        blocker,
        enabled,
        ArmingBlocker::MOTORS,
        snapshot.motors.emergency_stopped,
        "Emergency stop engaged",
        report,
    );
}

fn fence_checks(
    blocker: &mut ArmingBlocker,
    enabled: ArmingBlocker,
    snapshot: &VehicleSnapshot,
    report: &mut impl FnMut(&'static str),
) {
    check(
        blocker,
        enabled,
        ArmingBlocker::FENCE,
        snapshot.nav.fence_breached,
        "Vehicle outside fence",
        report,
    );
}

fn mode_checks(
    blocker: &mut ArmingBlocker,
    enabled: ArmingBlocker,
    snapshot: &VehicleSnapshot,
    report: &mut impl FnMut(&'static str),
) {
    check(
        blocker,
        enabled,
        ArmingBlocker::MODE,
        !snapshot.active_mode.allows_arming(),
        "Mode not armable",
        report,
    );
}
