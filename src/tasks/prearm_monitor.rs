//! Periodic pre-arm evaluation.
//!
//! The arming gate runs the checks again at the moment of arming, this
//! task only keeps the [`ARMING_BLOCKER`](s::ARMING_BLOCKER) signal
//! fresh so ground stations and the shell can show the blockers before
//! the pilot ever touches the arm switch.

use embassy_time::{Duration, Ticker};
use portable_atomic::Ordering;

use crate::checks::{run_pre_arm_checks, VehicleSnapshot};
use crate::errors::Debounce;
use crate::get_or_warn;
use crate::signals as s;
use crate::types::status::ArmingBlocker;

#[embassy_executor::task]
pub async fn main() -> ! {
    const ID: &str = "prearm_monitor";
    info!("{}: Task started", ID);

    let mut rcv_config = s::CFG_SUPERVISOR.receiver().unwrap();

    let snd_blocker = s::ARMING_BLOCKER.sender();

    // All high until the first real pass
    snd_blocker.send(ArmingBlocker::all());

    let mut config = get_or_warn!(rcv_config).await;

    let mut snapshot = VehicleSnapshot::nominal();
    snapshot.system_init = false;

    // Persistent warnings are repeated at a slow cadence
    let mut debounce = Debounce::new(Duration::from_secs(10));

    let mut ticker = Ticker::every(Duration::from_hz(1));
    loop {
        ticker.next().await;

        if let Some(new_config) = rcv_config.try_changed() {
            config = new_config;
        }

        snapshot.terminated = s::MOTORS_TERMINATED.load(Ordering::Relaxed);
        if let Some(init) = s::SYSTEM_INIT.try_get() {
            snapshot.system_init = init;
        }
        if let Some(active_mode) = s::ACTIVE_MODE.try_get() {
            snapshot.active_mode = active_mode;
        }
        if let Some(landed) = s::LANDED_STATE.try_get() {
            snapshot.landed = landed;
        }
        if let Some(failsafe) = s::FAILSAFE_STATUS.try_get() {
            snapshot.failsafe = failsafe;
        }
        if let Some(estimator) = s::ESTIMATOR_STATUS.try_get() {
            snapshot.estimator = estimator;
        }
        if let Some(attitude) = s::ATTITUDE_QUAT.try_get() {
            snapshot.attitude = attitude;
        }
        if let Some(gnss) = s::GNSS_STATUS.try_get() {
            snapshot.gnss = gnss;
        }
        if let Some(battery) = s::BATTERY_STATUS.try_get() {
            snapshot.battery = battery;
        }
        if let Some(nav) = s::NAV_STATUS.try_get() {
            snapshot.nav = nav;
        }
        if let Some(sensors) = s::SENSOR_HEALTH.try_get() {
            snapshot.sensors = sensors;
        }
        if let Some(motors) = s::MOTOR_STATUS.try_get() {
            snapshot.motors = motors;
        }

        let armed = s::ARMED_STATE.try_get().unwrap_or(false);

        // The periodic pass stays quiet, on-demand reporting goes
        // through the supervisor procedure instead
        let blocker = run_pre_arm_checks(armed, &snapshot, &config, &mut |_| {});

        if let Some(blocker) = debounce.evaluate(blocker) {
            if !blocker.is_empty() {
                warn!("{}: Arming blocked by {:?}", ID, blocker);
            }
        }

        if s::ARMING_BLOCKER.try_get() != Some(blocker) {
            snd_blocker.send(blocker);
        }
    }
}
