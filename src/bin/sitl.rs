//! Software-in-the-loop run of the supervisor task mesh.
//!
//! Boots every task on a host executor, feeds healthy input signals,
//! then scripts a short flight: arm, takeoff, loss and recovery of the
//! radio link, and a final forced disarm. Events and state transitions
//! land on stdout through `env_logger`.

use embassy_executor::Executor;
use embassy_sync::pubsub::WaitResult;
use embassy_time::{Duration, Instant, Ticker, Timer};
use log::{info, warn};
use static_cell::StaticCell;

use kestrel_supervisor::config::DEFAULT_CONFIG;
use kestrel_supervisor::nalgebra::UnitQuaternion;
use kestrel_supervisor::signals as s;
use kestrel_supervisor::tasks;
use kestrel_supervisor::tasks::supervisor::message::ArmDisarm;
use kestrel_supervisor::tasks::supervisor::{Origin, PROCEDURE};
use kestrel_supervisor::types::inputs::{
    AdsbThreat, BatteryStatus, EstimatorStatus, GnssStatus, MotorStatus, NavStatus, RadioInput,
    SensorHealth,
};

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() -> ! {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .format_timestamp_millis()
        .init();

    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.must_spawn(tasks::supervisor::main());
        spawner.must_spawn(tasks::prearm_monitor::main());
        spawner.must_spawn(tasks::failsafe_monitor::main());
        spawner.must_spawn(tasks::flight_detector::main());
        spawner.must_spawn(gcs_heartbeat());
        spawner.must_spawn(event_logger());
        spawner.must_spawn(scenario());
    })
}

/// The mesh considers the ground station link alive for as long as
/// these keep arriving.
#[embassy_executor::task]
async fn gcs_heartbeat() {
    let snd_heartbeat = s::GCS_HEARTBEAT.sender();
    let mut ticker = Ticker::every(Duration::from_hz(1));
    loop {
        snd_heartbeat.send(Instant::now());
        ticker.next().await;
    }
}

/// Mirror of the audit event channel onto the log.
#[embassy_executor::task]
async fn event_logger() {
    let mut events = s::EVENTS.subscriber().unwrap();
    loop {
        match events.next_message().await {
            WaitResult::Lagged(missed) => warn!("sitl: Event log lagged by {} events", missed),
            WaitResult::Message(event) => info!("sitl: {:?}", event),
        }
    }
}

#[embassy_executor::task]
async fn scenario() {
    // Healthy vehicle on the ground
    s::CFG_SUPERVISOR.sender().send(DEFAULT_CONFIG);
    s::SYSTEM_INIT.sender().send(true);
    s::ESTIMATOR_STATUS.sender().send(EstimatorStatus::nominal());
    s::ATTITUDE_QUAT.sender().send(UnitQuaternion::identity());
    s::RADIO_INPUT.sender().send(RadioInput::nominal());
    s::GNSS_STATUS.sender().send(GnssStatus::nominal());
    s::BATTERY_STATUS.sender().send(BatteryStatus::nominal());
    s::NAV_STATUS.sender().send(NavStatus::nominal());
    s::SENSOR_HEALTH.sender().send(SensorHealth::nominal());
    s::MOTOR_STATUS.sender().send(MotorStatus::nominal());
    s::ADSB_THREAT.sender().send(AdsbThreat::nominal());

    // Give the mesh a moment to settle
    Timer::after_secs(2).await;

    info!("sitl: Requesting arm");
    let response = PROCEDURE
        .request((ArmDisarm { arm: true, force: false }, Origin::GroundControl).into())
        .await;
    info!("sitl: Arm request answered: {:?}", response);

    // Takeoff, stick up then a climb on the estimate
    let mut radio = RadioInput::nominal();
    radio.throttle_us = 1600;
    s::RADIO_INPUT.sender().send(radio);
    Timer::after_millis(500).await;

    let mut estimator = EstimatorStatus::nominal();
    estimator.alt_m = 20.0;
    s::ESTIMATOR_STATUS.sender().send(estimator);
    Timer::after_secs(2).await;

    warn!("sitl: Cutting the radio link");
    let mut lost = radio;
    lost.present = false;
    s::RADIO_INPUT.sender().send(lost);
    Timer::after_secs(3).await;

    info!("sitl: Restoring the radio link");
    s::RADIO_INPUT.sender().send(radio);
    Timer::after_secs(3).await;

    info!("sitl: Requesting forced disarm");
    let response = PROCEDURE
        .request((ArmDisarm { arm: false, force: true }, Origin::GroundControl).into())
        .await;
    info!("sitl: Disarm request answered: {:?}", response);

    info!("sitl: Scenario complete");
}
