//! Flight mode transitions.
//!
//! Every mode change funnels through [`ModeController::set_mode`], which
//! admits or rejects the target against the current vehicle state before
//! anything swaps. A rejected request leaves the active mode untouched.

use crate::config::ModeConfig;
use crate::errors::ModeError;
use crate::signals::publish_event;
use crate::types::actions::ModeReason;
use crate::types::events::SupervisorEvent;
use crate::types::inputs::{EstimatorStatus, NavStatus};
use crate::types::mode::FlightMode;

/// Vehicle state a transition is admitted against.
pub struct ModeContext<'a> {
    pub nav: &'a NavStatus,
    pub estimator: &'a EstimatorStatus,
    pub config: &'a ModeConfig,
    /// Flight termination engaged, all transitions are refused.
    pub terminated: bool,
}

/// Owns the active flight mode and the reason it was entered.
///
/// When a failsafe interrupts pilot or mission control the interrupted
/// mode is remembered, so flight can resume where it left off once the
/// failure clears.
pub struct ModeController {
    active: FlightMode,
    reason: ModeReason,
    recovery: Option<FlightMode>,
}

impl ModeController {
    pub const fn new(initial: FlightMode) -> Self {
        Self {
            active: initial,
            reason: ModeReason::Initialized,
            recovery: None,
        }
    }

    pub fn active(&self) -> FlightMode {
        self.active
    }

    /// Reason the active mode was entered.
    pub fn reason(&self) -> ModeReason {
        self.reason
    }

    /// The active mode was commanded by the failsafe dispatcher.
    pub fn in_failsafe_mode(&self) -> bool {
        self.reason == ModeReason::Failsafe
    }

    /// Mode to restore once the failsafe clears, if one was interrupted.
    pub fn recovery_mode(&self) -> Option<FlightMode> {
        self.recovery
    }

    /// Drops the pending recovery target without restoring it.
    pub fn clear_recovery(&mut self) {
        self.recovery = None;
    }

    /// Switch to `target`. Returns `Ok(true)` when the mode changed,
    /// `Ok(false)` when the vehicle already flew the target mode, in
    /// which case only the recorded reason is refreshed.
    pub fn set_mode(
        &mut self,
        target: FlightMode,
        reason: ModeReason,
        ctx: &ModeContext,
    ) -> Result<bool, ModeError> {
        let result = self.try_set_mode(target, reason, ctx);
        match result {
            Ok(true) => info!("Flight mode changed to {:?} ({:?})", target, reason),
            Ok(false) => {}
            Err(error) => {
                warn!("Flight mode change to {:?} refused: {:?}", target, error);
                publish_event(SupervisorEvent::ModeChangeFailed { to: target, reason });
            }
        }
        result
    }

    fn try_set_mode(
        &mut self,
        target: FlightMode,
        reason: ModeReason,
        ctx: &ModeContext,
    ) -> Result<bool, ModeError> {
        if ctx.terminated {
            return Err(ModeError::Terminated);
        }
        if self.active == target {
            self.reason = reason;
            return Ok(false);
        }
        if reason == ModeReason::GcsCommand
            && ctx.config.gcs_block_mask & (1u32 << target as u8) != 0
        {
            return Err(ModeError::BlockedByConfig);
        }
        Self::admit(target, ctx)?;

        let from = self.active;
        self.exit_mode(reason);
        self.active = target;
        self.reason = reason;
        self.enter_mode(from, target, reason);
        Ok(true)
    }

    /// A target is admitted only when the vehicle can actually fly it.
    fn admit(target: FlightMode, ctx: &ModeContext) -> Result<(), ModeError> {
        if target.requires_position() && !(ctx.nav.position_ok && ctx.estimator.position_valid) {
            return Err(ModeError::NoPositionEstimate);
        }
        match target {
            FlightMode::Rtl => {
                if !ctx.nav.home_set {
                    return Err(ModeError::NoHomePosition);
                }
            }
            FlightMode::SmartRtl => {
                if !ctx.nav.home_set {
                    return Err(ModeError::NoHomePosition);
                }
                if !ctx.nav.smartrtl_available {
                    return Err(ModeError::NoReturnPath);
                }
            }
            FlightMode::Auto => {
                if !ctx.nav.mission_loaded {
                    return Err(ModeError::NoMission);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Runs before the swap, while the outgoing mode is still active.
    fn exit_mode(&mut self, reason: ModeReason) {
        // Pilot or mission authority taking over invalidates any
        // pending recovery target
        if !matches!(reason, ModeReason::Failsafe | ModeReason::FailsafeRecovery) {
            self.recovery = None;
        }
    }

    /// Runs after the swap, with the incoming mode active.
    fn enter_mode(&mut self, from: FlightMode, to: FlightMode, reason: ModeReason) {
        match reason {
            // An escalating failsafe keeps the originally interrupted
            // mode as the recovery target
            ModeReason::Failsafe => {
                if self.recovery.is_none() {
                    self.recovery = Some(from);
                }
            }
            ModeReason::FailsafeRecovery => self.recovery = None,
            _ => {}
        }
        publish_event(SupervisorEvent::ModeChanged { from, to, reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CONFIG;

    struct Fixture {
        nav: NavStatus,
        estimator: EstimatorStatus,
        config: ModeConfig,
        terminated: bool,
    }

    impl Fixture {
        fn nominal() -> Self {
            Self {
                nav: NavStatus::nominal(),
                estimator: EstimatorStatus::nominal(),
                config: DEFAULT_CONFIG.mode,
                terminated: false,
            }
        }

        fn ctx(&self) -> ModeContext<'_> {
            ModeContext {
                nav: &self.nav,
                estimator: &self.estimator,
                config: &self.config,
                terminated: self.terminated,
            }
        }
    }

    #[test]
    fn same_mode_refreshes_the_reason_without_a_transition() {
        let fixture = Fixture::nominal();
        let mut controller = ModeController::new(FlightMode::Stabilize);

        assert_eq!(
            controller.set_mode(FlightMode::Stabilize, ModeReason::Pilot, &fixture.ctx()),
            Ok(false)
        );
        assert_eq!(controller.active(), FlightMode::Stabilize);
        assert_eq!(controller.reason(), ModeReason::Pilot);
    }

    #[test]
    fn rejected_target_leaves_the_active_mode_untouched() {
        let mut fixture = Fixture::nominal();
        fixture.nav.home_set = false;
        let mut controller = ModeController::new(FlightMode::Loiter);

        assert_eq!(
            controller.set_mode(FlightMode::Rtl, ModeReason::Pilot, &fixture.ctx()),
            Err(ModeError::NoHomePosition)
        );
        assert_eq!(controller.active(), FlightMode::Loiter);
        assert_eq!(controller.reason(), ModeReason::Initialized);
    }

    #[test]
    fn position_modes_need_a_position_estimate() {
        let mut fixture = Fixture::nominal();
        fixture.estimator.position_valid = false;
        let mut controller = ModeController::new(FlightMode::Stabilize);

        assert_eq!(
            controller.set_mode(FlightMode::Loiter, ModeReason::Pilot, &fixture.ctx()),
            Err(ModeError::NoPositionEstimate)
        );

        // Attitude-only modes stay available
        assert_eq!(
            controller.set_mode(FlightMode::Acro, ModeReason::Pilot, &fixture.ctx()),
            Ok(true)
        );
    }

    #[test]
    fn auto_needs_a_loaded_mission() {
        let mut fixture = Fixture::nominal();
        fixture.nav.mission_loaded = false;
        let mut controller = ModeController::new(FlightMode::Loiter);

        assert_eq!(
            controller.set_mode(FlightMode::Auto, ModeReason::Pilot, &fixture.ctx()),
            Err(ModeError::NoMission)
        );
    }

    #[test]
    fn smart_rtl_needs_a_return_path() {
        let mut fixture = Fixture::nominal();
        fixture.nav.smartrtl_available = false;
        let mut controller = ModeController::new(FlightMode::Loiter);

        assert_eq!(
            controller.set_mode(FlightMode::SmartRtl, ModeReason::Pilot, &fixture.ctx()),
            Err(ModeError::NoReturnPath)
        );
    }

    #[test]
    fn block_mask_applies_to_ground_station_commands_only() {
        let mut fixture = Fixture::nominal();
        fixture.config.gcs_block_mask = 1 << FlightMode::Loiter as u8;
        let mut controller = ModeController::new(FlightMode::Stabilize);

        assert_eq!(
            controller.set_mode(FlightMode::Loiter, ModeReason::GcsCommand, &fixture.ctx()),
            Err(ModeError::BlockedByConfig)
        );
        assert_eq!(
            controller.set_mode(FlightMode::Loiter, ModeReason::Pilot, &fixture.ctx()),
            Ok(true)
        );
    }

    #[test]
    fn no_transitions_after_termination() {
        let mut fixture = Fixture::nominal();
        fixture.terminated = true;
        let mut controller = ModeController::new(FlightMode::Loiter);

        assert_eq!(
            controller.set_mode(FlightMode::Land, ModeReason::Failsafe, &fixture.ctx()),
            Err(ModeError::Terminated)
        );
    }

    #[test]
    fn failsafe_remembers_the_interrupted_mode() {
        let fixture = Fixture::nominal();
        let mut controller = ModeController::new(FlightMode::Loiter);

        assert_eq!(
            controller.set_mode(FlightMode::Rtl, ModeReason::Failsafe, &fixture.ctx()),
            Ok(true)
        );
        assert!(controller.in_failsafe_mode());
        assert_eq!(controller.recovery_mode(), Some(FlightMode::Loiter));

        // Escalation keeps the original target
        assert_eq!(
            controller.set_mode(FlightMode::Land, ModeReason::Failsafe, &fixture.ctx()),
            Ok(true)
        );
        assert_eq!(controller.recovery_mode(), Some(FlightMode::Loiter));

        assert_eq!(
            controller.set_mode(
                FlightMode::Loiter,
                ModeReason::FailsafeRecovery,
                &fixture.ctx()
            ),
            Ok(true)
        );
        assert_eq!(controller.active(), FlightMode::Loiter);
        assert_eq!(controller.recovery_mode(), None);
    }

    #[test]
    fn pilot_override_drops_the_recovery_target() {
        let fixture = Fixture::nominal();
        let mut controller = ModeController::new(FlightMode::Loiter);

        controller
            .set_mode(FlightMode::Rtl, ModeReason::Failsafe, &fixture.ctx())
            .unwrap();
        controller
            .set_mode(FlightMode::AltHold, ModeReason::Pilot, &fixture.ctx())
            .unwrap();
        assert_eq!(controller.recovery_mode(), None);
        assert!(!controller.in_failsafe_mode());
    }
}
