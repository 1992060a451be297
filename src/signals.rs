use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pubsub::{PubSubBehavior, PubSubChannel};
use embassy_time::Instant;
use nalgebra::UnitQuaternion;
use portable_atomic::AtomicBool;

use crate::config::SupervisorConfig;
use crate::types::actions::ResolvedFailsafe;
use crate::types::events::SupervisorEvent;
use crate::types::inputs::{
    AdsbThreat, BatteryStatus, EstimatorStatus, GnssStatus, MotorStatus, NavStatus, RadioInput,
    SensorHealth,
};
use crate::types::mode::{FlightMode, LandedState};
use crate::types::status::{ArmingBlocker, FailsafeStatus};

macro_rules! watch {
    ($name:ident, $datatype:ty, $num:literal) => {
        watch!($name, $datatype, $num, "Watch channel");
    };
    ($name:ident, $datatype:ty, $num:literal, $doc:expr) => {
        #[doc = $doc]
        pub static $name: embassy_sync::watch::Watch<CriticalSectionRawMutex, $datatype, $num> =
            embassy_sync::watch::Watch::new();
    };
}

/// Channel for all supervisor audit events. Consumers that lag are
/// overwritten, publishing never blocks.
pub static EVENTS: PubSubChannel<CriticalSectionRawMutex, SupervisorEvent, 8, 4, 2> =
    PubSubChannel::new();

/// Immediately publish an event to the global audit channel.
pub fn publish_event(event: SupervisorEvent) {
    EVENTS.publish_immediate(event);
}

/// Latched true by flight termination. Only a reboot clears it.
pub static MOTORS_TERMINATED: AtomicBool = AtomicBool::new(false);

// Data published by the sensing and estimation backends
watch!(ESTIMATOR_STATUS, EstimatorStatus, 4, "Health summary from the state estimator");
watch!(ATTITUDE_QUAT, UnitQuaternion<f32>, 3, "The current vehicle attitude represented as a quaternion");
watch!(RADIO_INPUT, RadioInput, 4, "Most recent decoded pilot input from the radio receiver");
watch!(GCS_HEARTBEAT, Instant, 3, "Arrival time of the most recent ground station heartbeat");
watch!(GNSS_STATUS, GnssStatus, 4, "Fix quality reported by the GNSS driver");
watch!(BATTERY_STATUS, BatteryStatus, 4, "Battery state, including any action requested by the monitor");
watch!(NAV_STATUS, NavStatus, 4, "Navigation readiness reported by the navigation stack");
watch!(SENSOR_HEALTH, SensorHealth, 4, "Calibration and health state of the raw sensor suite");
watch!(MOTOR_STATUS, MotorStatus, 4, "State of the motor output stage");
watch!(ADSB_THREAT, AdsbThreat, 3, "Threat summary from the traffic avoidance backend");
watch!(SYSTEM_INIT, bool, 4, "Set once by the boot sequence when all tasks are running");

// State owned and published by the supervisor tasks
watch!(ARMED_STATE, bool, 4, "True while the motors are armed, set by the supervisor");
watch!(ACTIVE_MODE, FlightMode, 4, "The active flight mode, set by the mode controller");
watch!(ARMING_BLOCKER, ArmingBlocker, 3, "Arming blocker flag, describes whether it is safe to arm the vehicle");
watch!(FAILSAFE_STATUS, FailsafeStatus, 3, "Currently triggered failsafe sources, set by the failsafe monitor");
watch!(RESOLVED_ACTION, Option<ResolvedFailsafe>, 2, "Action selected by the failsafe resolver, cleared when no source demands one");
watch!(LANDED_STATE, LandedState, 4, "Landed state, set by the flight detector");
watch!(MOTOR_ARM_CMD, (bool, bool), 2, "Arm command to the motor backend, second field bypasses the spool-up checks");

// CONFIGURATION SIGNALS //
watch!(CFG_SUPERVISOR, SupervisorConfig, 5, "Distributes the active supervisor configuration to all tasks");
