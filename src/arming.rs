//! The arming gate. Sole owner of the armed state, every arm and
//! disarm request passes through here regardless of its trigger path.

use embassy_time::Instant;

use crate::checks::{run_pre_arm_checks, VehicleSnapshot};
use crate::config::{ArmingConfig, SupervisorConfig};
use crate::errors::ArmError;
use crate::signals::publish_event;
use crate::tasks::supervisor::message::Origin;
use crate::types::events::SupervisorEvent;
use crate::types::status::ArmingBlocker;

/// Heading and altitude reference captured at the moment of arming.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmingDatum {
    pub bearing_deg: f32,
    pub altitude_m: f32,
}

impl ArmingDatum {
    fn capture(snapshot: &VehicleSnapshot) -> Self {
        let (_, _, yaw) = snapshot.attitude.euler_angles();
        let mut bearing_deg = yaw.to_degrees();
        if bearing_deg < 0.0 {
            bearing_deg += 360.0;
        }
        Self {
            bearing_deg,
            altitude_m: snapshot.sensors.baro_alt_m,
        }
    }
}

pub struct ArmingGate {
    armed: bool,
    armed_at: Option<Instant>,
    /// Serializes arm attempts from multiple trigger paths, the later
    /// caller is refused rather than double-arming.
    arming_in_progress: bool,
    last_disarm: Option<(Instant, Origin)>,
    datum: Option<ArmingDatum>,
}

impl ArmingGate {
    pub const fn new() -> Self {
        Self {
            armed: false,
            armed_at: None,
            arming_in_progress: false,
            last_disarm: None,
            datum: None,
        }
    }

    pub fn armed(&self) -> bool {
        self.armed
    }

    /// Reference captured at the most recent arming, kept through the
    /// following disarm.
    pub fn datum(&self) -> Option<ArmingDatum> {
        self.datum
    }

    /// Spool-up grace window right after arming, during which crash and
    /// landing detection must not disarm the vehicle.
    pub fn in_arming_delay(&self, now: Instant, config: &ArmingConfig) -> bool {
        match self.armed_at {
            Some(at) => self.armed && (now - at).as_millis() < config.arming_delay_ms as u64,
            None => false,
        }
    }

    /// Arm the motors. `Ok(false)` means the vehicle was already armed
    /// and nothing changed. A forced arm skips the check sequence but
    /// never overrides the terminate latch.
    pub fn arm(
        &mut self,
        origin: Origin,
        force: bool,
        snapshot: &VehicleSnapshot,
        config: &SupervisorConfig,
        now: Instant,
    ) -> Result<bool, ArmError> {
        if self.armed {
            return Ok(false);
        }
        if self.arming_in_progress {
            return Err(ArmError::InProgress);
        }
        self.arming_in_progress = true;
        let result = self.try_arm(origin, force, snapshot, config, now);
        self.arming_in_progress = false;

        match result {
            Ok(true) => {
                info!("Motors armed ({:?}, forced: {})", origin, force);
                publish_event(SupervisorEvent::Armed {
                    origin,
                    forced: force,
                });
            }
            Ok(false) => {}
            Err(error) => {
                warn!("Arming refused ({:?}): {:?}", origin, error);
                let blocker = match error {
                    ArmError::ChecksFailed(blocker) => blocker,
                    ArmError::Terminated => ArmingBlocker::TERMINATED,
                    ArmError::ModeForbidsArming => ArmingBlocker::MODE,
                    _ => ArmingBlocker::empty(),
                };
                publish_event(SupervisorEvent::ArmingFailed { origin, blocker });
            }
        }
        result
    }

    fn try_arm(
        &mut self,
        origin: Origin,
        force: bool,
        snapshot: &VehicleSnapshot,
        config: &SupervisorConfig,
        now: Instant,
    ) -> Result<bool, ArmError> {
        if snapshot.terminated {
            return Err(ArmError::Terminated);
        }

        if !force {
            // An active failsafe voids the quick path
            let relaxed = self.within_rearm_grace(origin, now, &config.arming)
                && !snapshot.failsafe.any_triggered()
                && snapshot.battery.failsafe_action.is_none();
            if relaxed {
                // The quick path skips the full sequence but keeps the
                // structural mode rule
                if !snapshot.active_mode.allows_arming() {
                    return Err(ArmError::ModeForbidsArming);
                }
            } else {
                let mut report = |message: &'static str| {
                    warn!("Pre-arm: {}", message);
                    publish_event(SupervisorEvent::PreArmFail { message });
                };
                let blocker = run_pre_arm_checks(self.armed, snapshot, config, &mut report);
                if !blocker.is_empty() {
                    return Err(ArmError::ChecksFailed(blocker));
                }
            }
        }

        self.datum = Some(ArmingDatum::capture(snapshot));
        if !snapshot.nav.home_set {
            info!("Arming without home position, altitude datum reset");
        }
        self.armed = true;
        self.armed_at = Some(now);
        Ok(true)
    }

    /// A stick-commanded disarm followed by an arm request from the same
    /// origin shortly after skips the full check sequence.
    fn within_rearm_grace(&self, origin: Origin, now: Instant, config: &ArmingConfig) -> bool {
        match self.last_disarm {
            Some((at, o)) => o == origin && (now - at).as_millis() <= config.rearm_grace_ms as u64,
            None => false,
        }
    }

    /// Disarm the motors. `Ok(false)` means the vehicle was already
    /// disarmed. A stick-commanded disarm is refused mid-air outside
    /// manual-throttle modes, other origins must land first or force.
    pub fn disarm(
        &mut self,
        origin: Origin,
        force: bool,
        snapshot: &VehicleSnapshot,
        now: Instant,
    ) -> Result<bool, ArmError> {
        if !self.armed {
            return Ok(false);
        }

        if !force {
            if origin == Origin::RemoteControl {
                if !snapshot.active_mode.has_manual_throttle() && !snapshot.landed.is_on_ground() {
                    return Err(ArmError::RudderDisarmNotAllowed);
                }
            } else if !snapshot.landed.is_on_ground() && !snapshot.active_mode.is_landing() {
                return Err(ArmError::NotLanded);
            }
        }

        self.armed = false;
        self.armed_at = None;
        self.last_disarm = Some((now, origin));

        // Offsets learned in flight go to the out-of-scope parameter
        // store collaborator
        if snapshot.sensors.compass_calibrated {
            publish_event(SupervisorEvent::CompassOffsetsSaved);
        }
        info!("Motors disarmed ({:?}, forced: {})", origin, force);
        publish_event(SupervisorEvent::Disarmed {
            origin,
            forced: force,
        });
        Ok(true)
    }

    /// Whether a triggered failsafe should disarm in place instead of
    /// commanding a mode change: still inside the arming delay, stick at
    /// zero in a manual-throttle mode without an interlock switch, or
    /// landed in any other mode.
    pub fn should_disarm_on_failsafe(
        &self,
        snapshot: &VehicleSnapshot,
        throttle_zero: bool,
        interlock_in_use: bool,
        config: &ArmingConfig,
        now: Instant,
    ) -> bool {
        if !self.armed {
            return false;
        }
        if self.in_arming_delay(now, config) {
            return true;
        }
        if snapshot.active_mode.has_manual_throttle() {
            throttle_zero && !interlock_in_use
        } else {
            snapshot.landed.is_on_ground()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CONFIG;
    use crate::types::mode::{FlightMode, LandedState};
    use crate::types::status::FailsafeStatus;
    use approx::assert_relative_eq;
    use embassy_time::Duration;
    use nalgebra::UnitQuaternion;

    fn at(ms: u64) -> Instant {
        Instant::from_ticks(0) + Duration::from_millis(ms)
    }

    #[test]
    fn arming_twice_is_a_no_op() {
        let mut gate = ArmingGate::new();
        let snapshot = VehicleSnapshot::nominal();

        assert_eq!(
            gate.arm(Origin::RemoteControl, false, &snapshot, &DEFAULT_CONFIG, at(0)),
            Ok(true)
        );
        assert_eq!(
            gate.arm(Origin::GroundControl, false, &snapshot, &DEFAULT_CONFIG, at(100)),
            Ok(false)
        );
        assert!(gate.armed());
    }

    #[test]
    fn aux_conflict_blocks_arming_regardless_of_other_state() {
        let mut config = DEFAULT_CONFIG;
        config.arming.interlock_channel = Some(7);
        config.arming.estop_channel = Some(8);

        // Even an otherwise degraded vehicle reports the conflict
        let mut snapshot = VehicleSnapshot::nominal();
        snapshot.gnss.fix_ok = false;

        let mut gate = ArmingGate::new();
        let Err(ArmError::ChecksFailed(blocker)) =
            gate.arm(Origin::RemoteControl, false, &snapshot, &config, at(0))
        else {
            panic!("expected failed checks");
        };
        assert!(blocker.contains(ArmingBlocker::AUX_CONFLICT));
        assert!(!gate.armed());
    }

    #[test]
    fn forced_arm_skips_the_checks_but_not_the_terminate_latch() {
        let mut snapshot = VehicleSnapshot::nominal();
        snapshot.gnss.fix_ok = false;

        let mut gate = ArmingGate::new();
        assert!(matches!(
            gate.arm(Origin::GroundControl, false, &snapshot, &DEFAULT_CONFIG, at(0)),
            Err(ArmError::ChecksFailed(_))
        ));
        assert_eq!(
            gate.arm(Origin::GroundControl, true, &snapshot, &DEFAULT_CONFIG, at(0)),
            Ok(true)
        );

        let mut gate = ArmingGate::new();
        snapshot.terminated = true;
        assert_eq!(
            gate.arm(Origin::GroundControl, true, &snapshot, &DEFAULT_CONFIG, at(0)),
            Err(ArmError::Terminated)
        );
    }

    #[test]
    fn rearm_grace_skips_checks_for_the_same_origin() {
        let mut gate = ArmingGate::new();
        let mut snapshot = VehicleSnapshot::nominal();

        gate.arm(Origin::RemoteControl, false, &snapshot, &DEFAULT_CONFIG, at(0))
            .unwrap();
        gate.disarm(Origin::RemoteControl, false, &snapshot, at(10_000))
            .unwrap();

        // GNSS degraded after the disarm, the grace window lets the
        // pilot re-arm anyway
        snapshot.gnss.fix_ok = false;
        assert_eq!(
            gate.arm(Origin::RemoteControl, false, &snapshot, &DEFAULT_CONFIG, at(13_000)),
            Ok(true)
        );
        gate.disarm(Origin::RemoteControl, false, &snapshot, at(14_000))
            .unwrap();

        // A different origin gets the full sequence
        assert!(matches!(
            gate.arm(Origin::GroundControl, false, &snapshot, &DEFAULT_CONFIG, at(15_000)),
            Err(ArmError::ChecksFailed(_))
        ));

        // So does the same origin outside the window
        assert!(matches!(
            gate.arm(Origin::RemoteControl, false, &snapshot, &DEFAULT_CONFIG, at(25_000)),
            Err(ArmError::ChecksFailed(_))
        ));
    }

    #[test]
    fn rearm_grace_is_voided_by_an_active_failsafe() {
        let mut gate = ArmingGate::new();
        let mut snapshot = VehicleSnapshot::nominal();

        gate.arm(Origin::RemoteControl, false, &snapshot, &DEFAULT_CONFIG, at(0))
            .unwrap();
        gate.disarm(Origin::RemoteControl, false, &snapshot, at(1000))
            .unwrap();

        // Inside the window, but the radio failsafe is up
        snapshot.failsafe = FailsafeStatus::RADIO;
        let Err(ArmError::ChecksFailed(blocker)) =
            gate.arm(Origin::RemoteControl, false, &snapshot, &DEFAULT_CONFIG, at(2000))
        else {
            panic!("expected failed checks");
        };
        assert!(blocker.contains(ArmingBlocker::RADIO_FAILSAFE));
    }

    #[test]
    fn rearm_grace_still_refuses_unarmable_modes() {
        let mut gate = ArmingGate::new();
        let mut snapshot = VehicleSnapshot::nominal();

        gate.arm(Origin::RemoteControl, false, &snapshot, &DEFAULT_CONFIG, at(0))
            .unwrap();
        gate.disarm(Origin::RemoteControl, false, &snapshot, at(1000))
            .unwrap();

        snapshot.active_mode = FlightMode::Rtl;
        assert_eq!(
            gate.arm(Origin::RemoteControl, false, &snapshot, &DEFAULT_CONFIG, at(2000)),
            Err(ArmError::ModeForbidsArming)
        );
    }

    #[test]
    fn rudder_disarm_is_refused_mid_air_without_manual_throttle() {
        let mut gate = ArmingGate::new();
        let mut snapshot = VehicleSnapshot::nominal();
        gate.arm(Origin::RemoteControl, false, &snapshot, &DEFAULT_CONFIG, at(0))
            .unwrap();

        snapshot.active_mode = FlightMode::Loiter;
        snapshot.landed = LandedState::InAir;
        assert_eq!(
            gate.disarm(Origin::RemoteControl, false, &snapshot, at(1000)),
            Err(ArmError::RudderDisarmNotAllowed)
        );
        assert!(gate.armed());

        // Manual throttle keeps the stick gesture available in the air
        snapshot.active_mode = FlightMode::Stabilize;
        assert_eq!(
            gate.disarm(Origin::RemoteControl, false, &snapshot, at(2000)),
            Ok(true)
        );
    }

    #[test]
    fn ground_station_disarm_mid_air_requires_force() {
        let mut gate = ArmingGate::new();
        let mut snapshot = VehicleSnapshot::nominal();
        gate.arm(Origin::GroundControl, false, &snapshot, &DEFAULT_CONFIG, at(0))
            .unwrap();

        snapshot.active_mode = FlightMode::Loiter;
        snapshot.landed = LandedState::InAir;
        assert_eq!(
            gate.disarm(Origin::GroundControl, false, &snapshot, at(1000)),
            Err(ArmError::NotLanded)
        );
        assert_eq!(
            gate.disarm(Origin::GroundControl, true, &snapshot, at(1000)),
            Ok(true)
        );
        assert!(!gate.armed());
    }

    #[test]
    fn failsafe_disarm_rules() {
        let mut gate = ArmingGate::new();
        let mut snapshot = VehicleSnapshot::nominal();
        let config = &DEFAULT_CONFIG.arming;
        gate.arm(Origin::RemoteControl, false, &snapshot, &DEFAULT_CONFIG, at(0))
            .unwrap();

        // Inside the arming delay any failsafe disarms
        assert!(gate.should_disarm_on_failsafe(&snapshot, false, false, config, at(500)));

        // Manual throttle at zero without an interlock switch
        snapshot.landed = LandedState::InAir;
        assert!(gate.should_disarm_on_failsafe(&snapshot, true, false, config, at(10_000)));
        assert!(!gate.should_disarm_on_failsafe(&snapshot, true, true, config, at(10_000)));
        assert!(!gate.should_disarm_on_failsafe(&snapshot, false, false, config, at(10_000)));

        // Autopilot modes disarm only on the ground
        snapshot.active_mode = FlightMode::Loiter;
        assert!(!gate.should_disarm_on_failsafe(&snapshot, true, false, config, at(10_000)));
        snapshot.landed = LandedState::OnGround;
        assert!(gate.should_disarm_on_failsafe(&snapshot, false, false, config, at(10_000)));
    }

    #[test]
    fn arming_captures_the_datum() {
        let mut gate = ArmingGate::new();
        let mut snapshot = VehicleSnapshot::nominal();
        snapshot.attitude = UnitQuaternion::from_euler_angles(0.0, 0.0, core::f32::consts::FRAC_PI_2);
        snapshot.sensors.baro_alt_m = 12.5;
        snapshot.estimator.alt_m = 12.5;

        gate.arm(Origin::RemoteControl, false, &snapshot, &DEFAULT_CONFIG, at(0))
            .unwrap();
        let datum = gate.datum().unwrap();
        assert_relative_eq!(datum.bearing_deg, 90.0, epsilon = 0.1);
        assert_relative_eq!(datum.altitude_m, 12.5);
    }
}
