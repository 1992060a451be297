//! Landed state estimation.
//!
//! Tracks the flight phase of the vehicle from armed state, throttle
//! and the altitude estimate. The result feeds the arming gate rules
//! and the failsafe landing exemptions, so the transitions err toward
//! staying in the airborne states.

use embassy_time::{Duration, Ticker};

use crate::signals as s;
use crate::types::mode::{FlightMode, LandedState};

/// Collective throttle above this marks the start of a takeoff [us].
const TAKEOFF_THROTTLE_US: u16 = 1250;
/// Climb above the arming altitude that marks an autonomous takeoff [m].
const TAKEOFF_ALT_M: f32 = 0.25;
/// Altitude at which the takeoff phase ends [m].
const INAIR_ALT_M: f32 = 1.0;

/// One evaluation of the landed state machine, `Some` when a
/// transition fires. Disarming grounds every phase, the detector never
/// declares a vehicle airborne while the motors are off.
fn advance(
    landed: LandedState,
    armed: bool,
    mode: FlightMode,
    throttle_us: u16,
    alt_m: f32,
) -> Option<LandedState> {
    match landed {
        LandedState::Undefined => (!armed).then_some(LandedState::OnGround),
        LandedState::OnGround => {
            (armed && (throttle_us > TAKEOFF_THROTTLE_US || alt_m > TAKEOFF_ALT_M))
                .then_some(LandedState::Takeoff)
        }
        LandedState::Takeoff => {
            if !armed {
                Some(LandedState::OnGround)
            } else if alt_m > INAIR_ALT_M {
                Some(LandedState::InAir)
            } else {
                None
            }
        }
        LandedState::InAir => {
            if !armed {
                Some(LandedState::OnGround)
            } else if mode.is_landing() {
                Some(LandedState::Landing)
            } else {
                None
            }
        }
        LandedState::Landing => {
            if !armed {
                Some(LandedState::OnGround)
            } else if !mode.is_landing() {
                // Climb-out, the landing was aborted
                Some(LandedState::InAir)
            } else {
                None
            }
        }
    }
}

#[embassy_executor::task]
pub async fn main() -> ! {
    const ID: &str = "flight_detector";
    info!("{}: Task started", ID);

    let snd_landed_state = s::LANDED_STATE.sender();
    snd_landed_state.send(LandedState::Undefined);

    let mut landed = LandedState::Undefined;
    let mut ticker = Ticker::every(Duration::from_hz(10));
    loop {
        ticker.next().await;

        let armed = s::ARMED_STATE.try_get().unwrap_or(false);
        let active_mode = s::ACTIVE_MODE.try_get().unwrap_or(FlightMode::Stabilize);
        // A receiver in failsafe reports garbage, treat it as stick down
        let throttle_us = match s::RADIO_INPUT.try_get() {
            Some(radio) if radio.present => radio.throttle_us,
            _ => 0,
        };
        let alt_m = s::ESTIMATOR_STATUS.try_get().map(|e| e.alt_m).unwrap_or(0.0);

        if let Some(next) = advance(landed, armed, active_mode, throttle_us, alt_m) {
            info!("{}: Landed state changed to {:?}", ID, next);
            landed = next;
            snd_landed_state.send(landed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boots_to_on_ground_once_disarmed() {
        assert_eq!(
            advance(LandedState::Undefined, false, FlightMode::Stabilize, 900, 0.0),
            Some(LandedState::OnGround)
        );
        // An armed boot keeps the state undefined
        assert_eq!(
            advance(LandedState::Undefined, true, FlightMode::Stabilize, 900, 0.0),
            None
        );
    }

    #[test]
    fn stick_raise_starts_the_takeoff() {
        assert_eq!(
            advance(LandedState::OnGround, true, FlightMode::Stabilize, 1400, 0.0),
            Some(LandedState::Takeoff)
        );
        assert_eq!(
            advance(LandedState::OnGround, false, FlightMode::Stabilize, 1400, 0.0),
            None
        );
        assert_eq!(
            advance(LandedState::OnGround, true, FlightMode::Stabilize, 1100, 0.0),
            None
        );
    }

    #[test]
    fn autonomous_takeoff_needs_no_stick() {
        assert_eq!(
            advance(LandedState::OnGround, true, FlightMode::Auto, 1000, 0.5),
            Some(LandedState::Takeoff)
        );
    }

    #[test]
    fn takeoff_completes_at_altitude() {
        assert_eq!(
            advance(LandedState::Takeoff, true, FlightMode::Stabilize, 1400, 0.5),
            None
        );
        assert_eq!(
            advance(LandedState::Takeoff, true, FlightMode::Stabilize, 1400, 1.5),
            Some(LandedState::InAir)
        );
    }

    #[test]
    fn disarm_grounds_every_phase() {
        for phase in [LandedState::Takeoff, LandedState::InAir, LandedState::Landing] {
            assert_eq!(
                advance(phase, false, FlightMode::Stabilize, 1500, 5.0),
                Some(LandedState::OnGround)
            );
        }
    }

    #[test]
    fn landing_mode_drives_the_landing_phase() {
        assert_eq!(
            advance(LandedState::InAir, true, FlightMode::Land, 1500, 5.0),
            Some(LandedState::Landing)
        );
        // Aborted landing climbs back out
        assert_eq!(
            advance(LandedState::Landing, true, FlightMode::Loiter, 1500, 5.0),
            Some(LandedState::InAir)
        );
    }
}
