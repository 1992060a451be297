use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

/// Flight mode of the vehicle. The numeric values match the external
/// command encoding, gaps are modes this vehicle does not implement.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FlightMode {
    Stabilize = 0,
    Acro = 1,
    AltHold = 2,
    Auto = 3,
    Guided = 4,
    Loiter = 5,
    Rtl = 6,
    Land = 9,
    Flip = 14,
    Brake = 17,
    Throw = 18,
    SmartRtl = 21,
}

impl FlightMode {
    /// Modes that cannot hold position without a position estimate.
    pub fn requires_position(&self) -> bool {
        matches!(
            self,
            FlightMode::Auto
                | FlightMode::Guided
                | FlightMode::Loiter
                | FlightMode::Rtl
                | FlightMode::SmartRtl
                | FlightMode::Brake
                | FlightMode::Throw
        )
    }

    /// Throttle is passed through from the pilot without altitude hold.
    pub fn has_manual_throttle(&self) -> bool {
        matches!(self, FlightMode::Stabilize | FlightMode::Acro)
    }

    /// The mode is actively descending to land at the current position.
    pub fn is_landing(&self) -> bool {
        matches!(self, FlightMode::Land)
    }

    /// The autopilot, not the pilot, commands the trajectory.
    pub fn is_autopilot(&self) -> bool {
        matches!(
            self,
            FlightMode::Auto
                | FlightMode::Guided
                | FlightMode::Rtl
                | FlightMode::SmartRtl
                | FlightMode::Land
        )
    }

    /// The pilot has direct stick authority over the trajectory.
    pub fn in_pilot_control(&self) -> bool {
        !self.is_autopilot()
    }

    /// Arming is refused while this mode is active.
    pub fn allows_arming(&self) -> bool {
        !matches!(
            self,
            FlightMode::Flip
                | FlightMode::Brake
                | FlightMode::Land
                | FlightMode::Rtl
                | FlightMode::SmartRtl
        )
    }
}

/// Ground contact state as estimated by the flight detector task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LandedState {
    /// Detector has not yet converged on a state.
    Undefined,
    /// Vehicle is at rest on the ground.
    OnGround,
    /// Vehicle is flying.
    InAir,
    /// Vehicle is in the takeoff phase.
    Takeoff,
    /// Vehicle is in the landing phase.
    Landing,
}

impl LandedState {
    pub fn is_on_ground(&self) -> bool {
        matches!(self, LandedState::OnGround)
    }

    pub fn is_airborne(&self) -> bool {
        matches!(self, LandedState::InAir | LandedState::Takeoff | LandedState::Landing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_throttle_modes_are_pilot_controlled() {
        assert!(FlightMode::Stabilize.in_pilot_control());
        assert!(FlightMode::Acro.in_pilot_control());
        assert!(!FlightMode::Rtl.in_pilot_control());
    }

    #[test]
    fn return_modes_do_not_allow_arming() {
        assert!(!FlightMode::Rtl.allows_arming());
        assert!(!FlightMode::SmartRtl.allows_arming());
        assert!(!FlightMode::Land.allows_arming());
        assert!(FlightMode::Stabilize.allows_arming());
        assert!(FlightMode::Loiter.allows_arming());
    }

    #[test]
    fn mode_numbers_round_trip() {
        assert_eq!(FlightMode::try_from(9u8).unwrap(), FlightMode::Land);
        assert_eq!(FlightMode::try_from(21u8).unwrap(), FlightMode::SmartRtl);
        assert!(FlightMode::try_from(7u8).is_err());
    }
}
