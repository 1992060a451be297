use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ArmingBlocker(u32);

bitflags::bitflags! {
    /// This bitflag represents the possible reasons why the vehicle cannot be
    /// armed. The bitflag is supposed to be `0x0000_0000` when the vehicle is
    /// ready to be armed, which can be checked with the `is_empty()` method.
    impl ArmingBlocker: u32 {

        /// **Bit 0** - The subsystem layer below has not finished initializing.
        const SYSTEM_INIT = 1 << 0;

        /// **Bit 1** - Motor interlock and emergency stop are bound at the same time.
        const AUX_CONFLICT = 1 << 1;

        /// **Bit 2** - A configuration parameter failed its sanity check.
        const PARAMETERS = 1 << 2;

        /// **Bit 3** - The geofence subsystem rejects arming.
        const FENCE = 1 << 3;

        /// **Bit 4** - The motor output stage reports it is not initialized.
        const MOTORS = 1 << 4;

        /// **Bit 5** - The ground-station failsafe is active.
        const GCS_FAILSAFE = 1 << 5;

        /// **Bit 6** - No valid altitude estimate.
        const ALTITUDE = 1 << 6;

        /// **Bit 7** - Battery voltage below the arming minimum, or the battery
        /// monitor reports a failsafe.
        const BATTERY = 1 << 7;

        /// **Bit 8** - GNSS quality (HDOP) is out of bounds.
        const GPS_QUALITY = 1 << 8;

        /// **Bit 9** - Estimator attitude invalid, or the lean angle is too large.
        const INS_ATTITUDE = 1 << 9;

        /// **Bit 10** - Barometer and inertial altitude estimates disagree.
        const BARO_DISPARITY = 1 << 10;

        /// **Bit 11** - The compass is not calibrated, or its readings are inconsistent.
        const COMPASS = 1 << 11;

        /// **Bit 12** - The RC transmitter is not calibrated.
        const RC_CALIB = 1 << 12;

        /// **Bit 13** - No global position estimate available.
        const POSITION = 1 << 13;

        /// **Bit 14** - The estimator flags the GNSS receiver as glitching.
        const GPS_GLITCH = 1 << 14;

        /// **Bit 15** - The active flight mode refuses arming.
        const MODE = 1 << 15;

        /// **Bit 16** - Motor output was terminated, a restart is required.
        const TERMINATED = 1 << 16;

        /// **Bit 17** - The radio failsafe is active.
        const RADIO_FAILSAFE = 1 << 17;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FailsafeStatus(u8);

bitflags::bitflags! {
    /// Aggregate failsafe record. Each bit is owned by exactly one watcher of
    /// the failsafe monitor, no other component may set it. The delegated
    /// battery failsafe is carried separately as an action, not a flag.
    impl FailsafeStatus: u8 {

        /// **Bit 0** - Radio (RC) failsafe, throttle persistently below the
        /// failsafe threshold.
        const RADIO = 1 << 0;

        /// **Bit 1** - Ground-station link failsafe, heartbeat silence
        /// exceeded the timeout.
        const GCS = 1 << 1;

        /// **Bit 2** - Estimator failsafe, filtered variances persistently
        /// over the threshold.
        const EKF = 1 << 2;

        /// **Bit 3** - Terrain-data failsafe, lookups failing for longer than
        /// the timeout while terrain navigation is active.
        const TERRAIN = 1 << 3;

        /// **Bit 4** - ADS-B failsafe, separation-violating traffic reported
        /// by the avoidance subsystem.
        const ADSB = 1 << 4;

        /// **Bit 5** - Dead-reckoning failsafe, flying without an absolute
        /// position source for longer than the timeout.
        const DEADRECKON = 1 << 5;
    }
}

impl FailsafeStatus {
    /// Logical OR over the source flags. The battery delegation is not
    /// part of the register, callers that care combine it themselves.
    pub const fn any_triggered(self) -> bool {
        !self.is_empty()
    }
}
