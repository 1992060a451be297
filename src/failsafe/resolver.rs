use heapless::Vec;

use crate::config::FailsafeConfig;
use crate::types::actions::{FailsafeAction, FailsafeOption, FailsafeSource, ResolvedFailsafe};
use crate::types::mode::FlightMode;
use crate::types::status::FailsafeStatus;

/// True when `source` is exempted from acting in the current mode.
/// Exemption filters a source out of resolution entirely, other
/// triggered sources keep acting as if the exempted one was clear. A
/// source requesting termination is never exempted.
pub fn source_exempt(source: FailsafeSource, mode: FlightMode, options: FailsafeOption) -> bool {
    let landing = options.contains(FailsafeOption::CONTINUE_IF_LANDING) && mode.is_landing();
    match source {
        FailsafeSource::Radio => {
            landing
                || (options.contains(FailsafeOption::RC_CONTINUE_IF_AUTO)
                    && mode == FlightMode::Auto)
                || (options.contains(FailsafeOption::RC_CONTINUE_IF_GUIDED)
                    && mode == FlightMode::Guided)
        }
        FailsafeSource::Gcs => {
            landing
                || (options.contains(FailsafeOption::GCS_CONTINUE_IF_AUTO)
                    && mode == FlightMode::Auto)
                || (options.contains(FailsafeOption::GCS_CONTINUE_IF_PILOT_CONTROL)
                    && mode.in_pilot_control())
        }
        FailsafeSource::Terrain => landing,
        FailsafeSource::Ekf
        | FailsafeSource::Adsb
        | FailsafeSource::DeadReckon
        | FailsafeSource::Battery => false,
    }
}

/// Maps the set of triggered failsafe sources to at most one corrective
/// action per pass. Selection follows the configured priority table with
/// first-eligible-wins semantics; termination outranks the table, and a
/// source whose configured action is `None` raises its flag without
/// ever demanding an action.
///
/// Termination is latched: once resolved, every later pass resolves to
/// termination again regardless of what the sources report.
pub struct ActionResolver {
    latched_terminate: Option<FailsafeSource>,
}

impl ActionResolver {
    pub const fn new() -> Self {
        Self {
            latched_terminate: None,
        }
    }

    /// A prior pass resolved to termination.
    pub fn terminated(&self) -> bool {
        self.latched_terminate.is_some()
    }

    pub fn resolve(
        &mut self,
        status: FailsafeStatus,
        battery_action: Option<FailsafeAction>,
        config: &FailsafeConfig,
        mode: FlightMode,
        mut suppressed: impl FnMut(FailsafeSource, FailsafeAction),
    ) -> Option<ResolvedFailsafe> {
        if let Some(source) = self.latched_terminate {
            return Some(ResolvedFailsafe {
                action: FailsafeAction::Terminate,
                source,
            });
        }

        let mut requests: Vec<(FailsafeSource, FailsafeAction), 8> = Vec::new();
        let mut request = |source: FailsafeSource, action: FailsafeAction| {
            if action != FailsafeAction::Terminate && source_exempt(source, mode, config.options) {
                suppressed(source, action);
            } else {
                // The table has more slots than sources, push cannot fail
                let _ = requests.push((source, action));
            }
        };

        if status.contains(FailsafeStatus::RADIO) {
            request(FailsafeSource::Radio, config.radio.action);
        }
        if status.contains(FailsafeStatus::GCS) {
            request(FailsafeSource::Gcs, config.gcs.action);
        }
        if status.contains(FailsafeStatus::EKF) {
            request(FailsafeSource::Ekf, config.ekf.action);
        }
        if status.contains(FailsafeStatus::TERRAIN) {
            request(FailsafeSource::Terrain, config.terrain.action);
        }
        if status.contains(FailsafeStatus::ADSB) {
            request(FailsafeSource::Adsb, config.adsb.action);
        }
        if status.contains(FailsafeStatus::DEADRECKON) {
            request(FailsafeSource::DeadReckon, config.deadreckon.action);
        }
        if let Some(action) = battery_action {
            request(FailsafeSource::Battery, action);
        }
        drop(request);

        // Termination outranks every table position
        if let Some(&(source, _)) = requests
            .iter()
            .find(|&&(_, a)| a == FailsafeAction::Terminate)
        {
            self.latched_terminate = Some(source);
            return Some(ResolvedFailsafe {
                action: FailsafeAction::Terminate,
                source,
            });
        }

        let action = config
            .priority
            .first_eligible(|action| requests.iter().any(|&(_, a)| a == action));
        if action == FailsafeAction::None {
            return None;
        }

        let source = requests
            .iter()
            .find(|&&(_, a)| a == action)
            .map(|&(s, _)| s)?;

        Some(ResolvedFailsafe { action, source })
    }
}
