//! Central authority over arming, flight modes and failsafe actions.
//!
//! All state transitions of the vehicle funnel through this task. Other
//! tasks and external links submit [`Request`]s through [`PROCEDURE`]
//! and receive a [`Response`], the failsafe resolver feeds it resolved
//! actions through the [`RESOLVED_ACTION`](s::RESOLVED_ACTION) signal.

use embassy_futures::select::{select3, Either3};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Instant, Ticker};
use portable_atomic::Ordering;

use crate::arming::ArmingGate;
use crate::checks::{run_pre_arm_checks, VehicleSnapshot};
use crate::config::SupervisorConfig;
use crate::errors::{ArmError, ModeError};
use crate::get_or_warn;
use crate::modes::{ModeContext, ModeController};
use crate::signals::{self as s, publish_event};
use crate::sync::procedure::Procedure;
use crate::types::actions::{FailsafeAction, ModeReason, ResolvedFailsafe};
use crate::types::events::SupervisorEvent;
use crate::types::inputs::RadioInput;
use crate::types::mode::{FlightMode, LandedState};

pub mod message;
pub use message::{Command, Origin, Request, Response};

const CHANNEL_LEN: usize = 4;

/// In order for sub-systems (like a GCS server) to get some feedback on
/// whether a command was accepted, requests go through a [`Procedure`]
/// rather than a plain channel. Use [`Procedure::request`] to wait for
/// the outcome, or [`Procedure::send`] when the caller does not care.
pub static PROCEDURE: Procedure<CriticalSectionRawMutex, Request, Response, CHANNEL_LEN> =
    Procedure::new();

/// Throttle at or below this raw value counts as a zeroed stick when
/// deciding between disarming in place and a failsafe mode change [us].
const THROTTLE_ZERO_US: u16 = 1100;

struct Supervisor {
    id: &'static str,
    config: SupervisorConfig,
    gate: ArmingGate,
    modes: ModeController,
    snapshot: VehicleSnapshot,
    /// Last valid radio frame. A receiver already in failsafe reports
    /// garbage values, so throttle gating must not read those.
    radio: RadioInput,
    /// Action currently dispatched, `None` once the resolver clears.
    applied: Option<ResolvedFailsafe>,
}

impl Supervisor {
    fn new(config: SupervisorConfig) -> Self {
        let mut snapshot = VehicleSnapshot::nominal();
        // Conservative until the boot sequence and the detector report in
        snapshot.system_init = false;
        snapshot.landed = LandedState::Undefined;
        snapshot.active_mode = config.mode.initial_mode;
        Self {
            id: "supervisor",
            gate: ArmingGate::new(),
            modes: ModeController::new(config.mode.initial_mode),
            config,
            snapshot,
            radio: RadioInput::nominal(),
            applied: None,
        }
    }

    /// Pull the latest published value of every input signal into the
    /// working snapshot. Sources that have not published yet keep their
    /// previous value.
    fn refresh_snapshot(&mut self) {
        self.snapshot.terminated = s::MOTORS_TERMINATED.load(Ordering::Relaxed);
        self.snapshot.active_mode = self.modes.active();
        if let Some(init) = s::SYSTEM_INIT.try_get() {
            self.snapshot.system_init = init;
        }
        if let Some(landed) = s::LANDED_STATE.try_get() {
            self.snapshot.landed = landed;
        }
        if let Some(failsafe) = s::FAILSAFE_STATUS.try_get() {
            self.snapshot.failsafe = failsafe;
        }
        if let Some(estimator) = s::ESTIMATOR_STATUS.try_get() {
            self.snapshot.estimator = estimator;
        }
        if let Some(attitude) = s::ATTITUDE_QUAT.try_get() {
            self.snapshot.attitude = attitude;
        }
        if let Some(gnss) = s::GNSS_STATUS.try_get() {
            self.snapshot.gnss = gnss;
        }
        if let Some(battery) = s::BATTERY_STATUS.try_get() {
            self.snapshot.battery = battery;
        }
        if let Some(nav) = s::NAV_STATUS.try_get() {
            self.snapshot.nav = nav;
        }
        if let Some(sensors) = s::SENSOR_HEALTH.try_get() {
            self.snapshot.sensors = sensors;
        }
        if let Some(motors) = s::MOTOR_STATUS.try_get() {
            self.snapshot.motors = motors;
        }
        if let Some(radio) = s::RADIO_INPUT.try_get() {
            if radio.present {
                self.radio = radio;
            }
        }
    }

    /// Work not driven by a request: configuration refresh and snapshot
    /// upkeep between commands.
    fn run_periodics(&mut self) {
        if let Some(config) = s::CFG_SUPERVISOR.try_get() {
            if config != self.config {
                info!("{}: Configuration updated", self.id);
                self.config = config;
            }
        }
        self.refresh_snapshot();
    }

    /// Handle a single request and produce the response for its sender.
    ///
    /// This is intentionally NOT async, to enforce that no request can
    /// hold up the supervisor. Anything that takes time belongs in a
    /// collaborator task, and a temporarily impossible action is simply
    /// reflected in the response.
    fn handle_command(&mut self, request: Request) -> Response {
        trace!("{}: Handling command: {:?}", self.id, request);
        match request.command {
            Command::ArmDisarm(cmd) if cmd.arm => self.arm_vehicle(request.origin, cmd.force),
            Command::ArmDisarm(cmd) => self.disarm_vehicle(request.origin, cmd.force),
            Command::SetFlightMode(cmd) => self.set_flight_mode(cmd.mode, request.origin),
            Command::RunPreArmChecks => self.report_pre_arm_checks(),
        }
    }

    fn arm_vehicle(&mut self, origin: Origin, force: bool) -> Response {
        let now = Instant::now();
        match self.gate.arm(origin, force, &self.snapshot, &self.config, now) {
            Ok(true) => {
                s::MOTOR_ARM_CMD.sender().send((true, force));
                Response::Accepted
            }
            Ok(false) => Response::Unchanged,
            Err(error) => Response::Rejected(error.into()),
        }
    }

    fn disarm_vehicle(&mut self, origin: Origin, force: bool) -> Response {
        let now = Instant::now();
        match self.gate.disarm(origin, force, &self.snapshot, now) {
            Ok(true) => {
                s::MOTOR_ARM_CMD.sender().send((false, false));
                Response::Accepted
            }
            Ok(false) => Response::Unchanged,
            Err(error) => Response::Rejected(error.into()),
        }
    }

    fn set_flight_mode(&mut self, mode: u8, origin: Origin) -> Response {
        let target = match FlightMode::try_from(mode) {
            Ok(target) => target,
            Err(_) => return Response::Rejected(ModeError::UnknownMode(mode).into()),
        };
        let ctx = mode_context(&self.snapshot, &self.config);
        match self.modes.set_mode(target, origin.mode_reason(), &ctx) {
            Ok(true) => {
                self.snapshot.active_mode = self.modes.active();
                Response::Accepted
            }
            Ok(false) => Response::Unchanged,
            Err(error) => Response::Rejected(error.into()),
        }
    }

    /// On-demand pre-arm report for the operator. Every failed check is
    /// published as an event, the response summarizes the outcome.
    fn report_pre_arm_checks(&mut self) -> Response {
        let mut report = |message: &'static str| {
            warn!("Pre-arm: {}", message);
            publish_event(SupervisorEvent::PreArmFail { message });
        };
        let blocker = run_pre_arm_checks(self.gate.armed(), &self.snapshot, &self.config, &mut report);
        if blocker.is_empty() {
            info!("{}: Pre-arm checks passed", self.id);
            Response::Accepted
        } else {
            Response::Rejected(ArmError::ChecksFailed(blocker).into())
        }
    }

    /// Apply a newly resolved failsafe action, or recover once the
    /// resolver reports all clear.
    ///
    /// An action is dispatched once, when it first becomes the resolved
    /// outcome. While it stays resolved the pilot keeps the authority
    /// to switch away from the commanded mode.
    fn dispatch_failsafe(&mut self, resolved: Option<ResolvedFailsafe>) {
        if self.snapshot.terminated {
            return;
        }
        let Some(resolved) = resolved else {
            self.applied = None;
            self.try_failsafe_recovery();
            return;
        };

        // A source change under an unchanged action does not re-dispatch
        if self.applied.map(|applied| applied.action) == Some(resolved.action) {
            self.applied = Some(resolved);
            return;
        }
        self.applied = Some(resolved);

        if resolved.action == FailsafeAction::Terminate {
            self.do_terminate(resolved);
            return;
        }
        if !self.gate.armed() {
            debug!("{}: Failsafe {:?} while disarmed, no action", self.id, resolved.action);
            return;
        }
        let now = Instant::now();
        let interlock_in_use = self.config.arming.interlock_channel.is_some();
        if self
            .gate
            .should_disarm_on_failsafe(&self.snapshot, self.throttle_zero(), interlock_in_use, &self.config.arming, now)
        {
            info!("{}: Failsafe while landed, disarming instead of {:?}", self.id, resolved.action);
            self.disarm_vehicle(Origin::Failsafe, true);
            return;
        }
        self.do_failsafe_action(resolved);
    }

    fn throttle_zero(&self) -> bool {
        self.radio.throttle_us <= THROTTLE_ZERO_US
    }

    /// Walk the fallback chain of the action and enter the first target
    /// the vehicle can actually fly. `Land` terminates every chain and
    /// has no admissibility requirements of its own.
    fn do_failsafe_action(&mut self, resolved: ResolvedFailsafe) {
        let nav = &self.snapshot.nav;
        let targets: &[FlightMode] = match resolved.action {
            FailsafeAction::None | FailsafeAction::Terminate => return,
            FailsafeAction::Land => &[FlightMode::Land],
            FailsafeAction::Rtl => &[FlightMode::Rtl, FlightMode::Land],
            FailsafeAction::SmartRtl => &[FlightMode::SmartRtl, FlightMode::Rtl, FlightMode::Land],
            FailsafeAction::SmartRtlLand => &[FlightMode::SmartRtl, FlightMode::Land],
            FailsafeAction::BrakeLand => &[FlightMode::Brake, FlightMode::Land],
            FailsafeAction::AutoDoLandStart => {
                if nav.mission_loaded && nav.mission_has_landing {
                    &[FlightMode::Auto, FlightMode::Rtl, FlightMode::Land]
                } else {
                    debug!("{}: Mission has no landing sequence, returning instead", self.id);
                    &[FlightMode::Rtl, FlightMode::Land]
                }
            }
        };

        for &target in targets {
            let ctx = mode_context(&self.snapshot, &self.config);
            if self.modes.set_mode(target, ModeReason::Failsafe, &ctx).is_ok() {
                self.snapshot.active_mode = self.modes.active();
                publish_event(SupervisorEvent::ActionApplied {
                    action: resolved.action,
                    source: resolved.source,
                });
                return;
            }
        }
        warn!("{}: No admissible mode for failsafe action {:?}", self.id, resolved.action);
    }

    /// Restore the mode a failsafe interrupted, once the air is clear.
    /// Only flown while airborne, a grounded vehicle stays put.
    fn try_failsafe_recovery(&mut self) {
        if !self.modes.in_failsafe_mode() || !self.snapshot.landed.is_airborne() {
            return;
        }
        let Some(target) = self.modes.recovery_mode() else {
            return;
        };
        let ctx = mode_context(&self.snapshot, &self.config);
        match self.modes.set_mode(target, ModeReason::FailsafeRecovery, &ctx) {
            Ok(_) => {
                self.snapshot.active_mode = self.modes.active();
                info!("{}: Failsafe cleared, resuming {:?}", self.id, target);
            }
            Err(error) => {
                warn!("{}: Cannot resume {:?}: {:?}", self.id, target, error);
                self.modes.clear_recovery();
            }
        }
    }

    /// Cut the motors, latch the termination flag and disarm. The latch
    /// survives until reboot, nothing downstream can undo it.
    fn do_terminate(&mut self, resolved: ResolvedFailsafe) {
        if self.snapshot.terminated {
            return;
        }
        error!("{}: Flight terminated by {:?} failsafe", self.id, resolved.source);
        s::MOTORS_TERMINATED.store(true, Ordering::Relaxed);
        self.snapshot.terminated = true;
        s::MOTOR_ARM_CMD.sender().send((false, true));
        self.gate
            .disarm(Origin::Failsafe, true, &self.snapshot, Instant::now())
            .ok();
        publish_event(SupervisorEvent::MotorsTerminated);
        publish_event(SupervisorEvent::ActionApplied {
            action: FailsafeAction::Terminate,
            source: resolved.source,
        });
    }
}

/// Context borrows individual fields, so the mode controller can be
/// borrowed mutably alongside it.
fn mode_context<'a>(snapshot: &'a VehicleSnapshot, config: &'a SupervisorConfig) -> ModeContext<'a> {
    ModeContext {
        nav: &snapshot.nav,
        estimator: &snapshot.estimator,
        config: &config.mode,
        terminated: snapshot.terminated,
    }
}

#[embassy_executor::task]
pub async fn main() -> ! {
    const ID: &str = "supervisor";
    info!("{}: Task started", ID);

    let mut rcv_config = s::CFG_SUPERVISOR.receiver().unwrap();
    let mut rcv_resolved = s::RESOLVED_ACTION.receiver().unwrap();

    let snd_armed = s::ARMED_STATE.sender();
    let snd_active_mode = s::ACTIVE_MODE.sender();
    let snd_motor_cmd = s::MOTOR_ARM_CMD.sender();

    let config = get_or_warn!(rcv_config).await;
    let mut supervisor = Supervisor::new(config);

    snd_armed.send(false);
    snd_active_mode.send(supervisor.modes.active());
    snd_motor_cmd.send((false, false));

    let mut ticker = Ticker::every(Duration::from_hz(2));
    loop {
        match select3(PROCEDURE.get_request(), rcv_resolved.changed(), ticker.next()).await {
            Either3::First((request, handle)) => {
                supervisor.refresh_snapshot();
                let response = supervisor.handle_command(request);
                handle.respond(response);
            }
            Either3::Second(resolved) => {
                supervisor.refresh_snapshot();
                supervisor.dispatch_failsafe(resolved);
            }
            Either3::Third(()) => supervisor.run_periodics(),
        }

        // Mirror supervisor state onto the mesh, transmit on change only
        let armed = supervisor.gate.armed();
        if s::ARMED_STATE.try_get() != Some(armed) {
            snd_armed.send(armed);
        }
        let active_mode = supervisor.modes.active();
        if s::ACTIVE_MODE.try_get() != Some(active_mode) {
            snd_active_mode.send(active_mode);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::message::{ArmDisarm, SetFlightMode};
    use super::*;
    use crate::config::DEFAULT_CONFIG;
    use crate::failsafe::{ActionResolver, FailsafeMonitor, MonitorSample};
    use crate::types::actions::FailsafeSource;
    use embassy_time::Duration;

    fn at(ms: u64) -> Instant {
        Instant::from_ticks(0) + Duration::from_millis(ms)
    }

    fn fixture() -> Supervisor {
        let mut config = DEFAULT_CONFIG;
        // Tests dispatch right after arming, keep the spool-up grace
        // window out of the way
        config.arming.arming_delay_ms = 0;
        let mut supervisor = Supervisor::new(config);
        supervisor.snapshot = VehicleSnapshot::nominal();
        supervisor
    }

    fn arm(supervisor: &mut Supervisor) {
        let request = (ArmDisarm { arm: true, force: false }, Origin::RemoteControl).into();
        assert_eq!(supervisor.handle_command(request), Response::Accepted);
    }

    #[test]
    fn command_arm_disarm_round_trip() {
        let mut supervisor = fixture();

        let arm = (ArmDisarm { arm: true, force: false }, Origin::RemoteControl).into();
        assert_eq!(supervisor.handle_command(arm), Response::Accepted);
        assert_eq!(supervisor.handle_command(arm), Response::Unchanged);

        let disarm = (ArmDisarm { arm: false, force: false }, Origin::RemoteControl).into();
        assert_eq!(supervisor.handle_command(disarm), Response::Accepted);
        assert_eq!(supervisor.handle_command(disarm), Response::Unchanged);
    }

    #[test]
    fn unknown_mode_number_is_rejected() {
        let mut supervisor = fixture();
        let request = (SetFlightMode { mode: 255 }, Origin::GroundControl).into();
        assert_eq!(
            supervisor.handle_command(request),
            Response::Rejected(ModeError::UnknownMode(255).into())
        );
        assert_eq!(supervisor.modes.active(), FlightMode::Stabilize);
    }

    #[test]
    fn pre_arm_report_reflects_the_blockers() {
        let mut supervisor = fixture();
        let request = (Command::RunPreArmChecks, Origin::GroundControl).into();
        assert_eq!(supervisor.handle_command(request), Response::Accepted);

        supervisor.snapshot.gnss.fix_ok = false;
        assert!(matches!(
            supervisor.handle_command(request),
            Response::Rejected(crate::errors::SupervisorError::Arm(ArmError::ChecksFailed(_)))
        ));
    }

    #[test]
    fn radio_loss_in_flight_runs_the_failsafe_chain() {
        let mut supervisor = fixture();
        supervisor.config.failsafe.radio.action = FailsafeAction::Land;
        arm(&mut supervisor);
        supervisor.snapshot.landed = LandedState::InAir;

        let config = supervisor.config.failsafe;
        let mut monitor = FailsafeMonitor::new(&config);
        let mut resolver = ActionResolver::new();
        let mut sample = MonitorSample::nominal();
        sample.radio.present = false;

        let mut resolved = None;
        for tick in 0..3u64 {
            monitor.update(&sample, at(tick * 100), &config);
            resolved = resolver.resolve(
                monitor.status(),
                monitor.battery_action(),
                &config,
                supervisor.modes.active(),
                |_, _| {},
            );
        }
        assert_eq!(
            resolved,
            Some(ResolvedFailsafe {
                action: FailsafeAction::Land,
                source: FailsafeSource::Radio,
            })
        );

        supervisor.dispatch_failsafe(resolved);
        assert_eq!(supervisor.modes.active(), FlightMode::Land);
        assert_eq!(supervisor.modes.reason(), ModeReason::Failsafe);
        assert!(supervisor.gate.armed());
    }

    #[test]
    fn return_without_home_falls_back_to_land() {
        let mut supervisor = fixture();
        arm(&mut supervisor);
        supervisor.snapshot.landed = LandedState::InAir;
        supervisor.snapshot.nav.home_set = false;

        supervisor.dispatch_failsafe(Some(ResolvedFailsafe {
            action: FailsafeAction::Rtl,
            source: FailsafeSource::Gcs,
        }));
        assert_eq!(supervisor.modes.active(), FlightMode::Land);
    }

    #[test]
    fn missing_landing_sequence_turns_mission_land_into_return() {
        let mut supervisor = fixture();
        arm(&mut supervisor);
        supervisor.snapshot.landed = LandedState::InAir;
        supervisor.snapshot.nav.mission_loaded = true;
        supervisor.snapshot.nav.mission_has_landing = false;

        supervisor.dispatch_failsafe(Some(ResolvedFailsafe {
            action: FailsafeAction::AutoDoLandStart,
            source: FailsafeSource::Battery,
        }));
        assert_eq!(supervisor.modes.active(), FlightMode::Rtl);
    }

    #[test]
    fn failsafe_disarms_a_landed_vehicle() {
        let mut supervisor = fixture();
        arm(&mut supervisor);
        // Sticks at idle on the ground
        supervisor.radio.throttle_us = 1000;

        supervisor.dispatch_failsafe(Some(ResolvedFailsafe {
            action: FailsafeAction::Rtl,
            source: FailsafeSource::Gcs,
        }));
        assert!(!supervisor.gate.armed());
        assert_eq!(supervisor.modes.active(), FlightMode::Stabilize);
    }

    #[test]
    fn failsafe_while_disarmed_takes_no_action() {
        let mut supervisor = fixture();
        supervisor.dispatch_failsafe(Some(ResolvedFailsafe {
            action: FailsafeAction::Land,
            source: FailsafeSource::Ekf,
        }));
        assert_eq!(supervisor.modes.active(), FlightMode::Stabilize);
        assert!(!supervisor.gate.armed());
    }

    #[test]
    fn resolved_action_is_dispatched_once() {
        let mut supervisor = fixture();
        arm(&mut supervisor);
        supervisor.snapshot.landed = LandedState::InAir;

        let resolved = Some(ResolvedFailsafe {
            action: FailsafeAction::Land,
            source: FailsafeSource::Ekf,
        });
        supervisor.dispatch_failsafe(resolved);
        assert_eq!(supervisor.modes.active(), FlightMode::Land);

        // The pilot overrides while the failure persists
        let request = (SetFlightMode::new(FlightMode::AltHold), Origin::RemoteControl).into();
        assert_eq!(supervisor.handle_command(request), Response::Accepted);

        // The unchanged resolution must not yank the mode back
        supervisor.dispatch_failsafe(resolved);
        assert_eq!(supervisor.modes.active(), FlightMode::AltHold);
    }

    #[test]
    fn recovery_restores_the_interrupted_mode() {
        let mut supervisor = fixture();
        arm(&mut supervisor);
        supervisor.snapshot.landed = LandedState::InAir;
        let request = (SetFlightMode::new(FlightMode::Loiter), Origin::RemoteControl).into();
        assert_eq!(supervisor.handle_command(request), Response::Accepted);

        supervisor.dispatch_failsafe(Some(ResolvedFailsafe {
            action: FailsafeAction::Land,
            source: FailsafeSource::Ekf,
        }));
        assert_eq!(supervisor.modes.active(), FlightMode::Land);

        supervisor.dispatch_failsafe(None);
        assert_eq!(supervisor.modes.active(), FlightMode::Loiter);
        assert_eq!(supervisor.modes.reason(), ModeReason::FailsafeRecovery);
        assert_eq!(supervisor.modes.recovery_mode(), None);
    }

    #[test]
    fn grounded_vehicle_does_not_fly_the_recovery() {
        let mut supervisor = fixture();
        arm(&mut supervisor);
        supervisor.snapshot.landed = LandedState::InAir;
        supervisor.dispatch_failsafe(Some(ResolvedFailsafe {
            action: FailsafeAction::Land,
            source: FailsafeSource::Ekf,
        }));

        // Touchdown happens before the failure clears
        supervisor.snapshot.landed = LandedState::OnGround;
        supervisor.dispatch_failsafe(None);
        assert_eq!(supervisor.modes.active(), FlightMode::Land);
    }

    #[test]
    fn termination_latches_and_blocks_later_actions() {
        let mut supervisor = fixture();
        arm(&mut supervisor);
        supervisor.snapshot.landed = LandedState::InAir;
        let request = (SetFlightMode::new(FlightMode::Loiter), Origin::RemoteControl).into();
        assert_eq!(supervisor.handle_command(request), Response::Accepted);

        supervisor.dispatch_failsafe(Some(ResolvedFailsafe {
            action: FailsafeAction::Terminate,
            source: FailsafeSource::Battery,
        }));
        assert!(supervisor.snapshot.terminated);
        assert!(!supervisor.gate.armed());
        // No mode juggling after termination
        assert_eq!(supervisor.modes.active(), FlightMode::Loiter);

        supervisor.dispatch_failsafe(Some(ResolvedFailsafe {
            action: FailsafeAction::Land,
            source: FailsafeSource::Ekf,
        }));
        assert_eq!(supervisor.modes.active(), FlightMode::Loiter);

        // Not even a forced arm gets past the latch
        let rearm = (ArmDisarm { arm: true, force: true }, Origin::GroundControl).into();
        assert_eq!(
            supervisor.handle_command(rearm),
            Response::Rejected(ArmError::Terminated.into())
        );
    }
}
