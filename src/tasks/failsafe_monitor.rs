//! Failsafe monitoring and action resolution.
//!
//! Runs the watcher bank over the freshest input sample at a fixed
//! rate, publishes the trigger status word and feeds the resolved
//! action to the supervisor through the
//! [`RESOLVED_ACTION`](s::RESOLVED_ACTION) signal. Edges and mode
//! exemptions are published as audit events.

use embassy_time::{Duration, Instant, Ticker};
use heapless::Vec;

use crate::failsafe::{ActionResolver, FailsafeEdge, FailsafeMonitor, MonitorSample, MONITOR_RATE_HZ};
use crate::get_or_warn;
use crate::signals::{self as s, publish_event};
use crate::types::actions::{FailsafeAction, FailsafeSource};
use crate::types::events::SupervisorEvent;

#[embassy_executor::task]
pub async fn main() -> ! {
    const ID: &str = "failsafe_monitor";
    info!("{}: Task started", ID);

    let mut rcv_config = s::CFG_SUPERVISOR.receiver().unwrap();

    let snd_status = s::FAILSAFE_STATUS.sender();
    let snd_resolved = s::RESOLVED_ACTION.sender();

    let mut config = get_or_warn!(rcv_config).await;
    let mut monitor = FailsafeMonitor::new(&config.failsafe);
    let mut resolver = ActionResolver::new();

    snd_status.send(monitor.status());
    snd_resolved.send(None);

    let mut sample = MonitorSample::nominal();
    let mut last_suppressed: Vec<(FailsafeSource, FailsafeAction), 8> = Vec::new();

    let mut ticker = Ticker::every(Duration::from_hz(MONITOR_RATE_HZ));
    loop {
        ticker.next().await;

        if let Some(new_config) = rcv_config.try_changed() {
            info!("{}: Configuration updated, watchers restarted", ID);
            // Thresholds and filter states derive from the config
            monitor = FailsafeMonitor::new(&new_config.failsafe);
            config = new_config;
        }

        if let Some(radio) = s::RADIO_INPUT.try_get() {
            sample.radio = radio;
        }
        if let Some(heartbeat) = s::GCS_HEARTBEAT.try_get() {
            sample.gcs_heartbeat = Some(heartbeat);
        }
        if let Some(estimator) = s::ESTIMATOR_STATUS.try_get() {
            sample.estimator = estimator;
        }
        if let Some(nav) = s::NAV_STATUS.try_get() {
            sample.nav = nav;
        }
        if let Some(adsb) = s::ADSB_THREAT.try_get() {
            sample.adsb = adsb;
        }
        if let Some(battery) = s::BATTERY_STATUS.try_get() {
            sample.battery = battery;
        }

        let edges = monitor.update(&sample, Instant::now(), &config.failsafe);
        for (source, edge) in edges {
            match edge {
                FailsafeEdge::Triggered => {
                    warn!("{}: {:?} failsafe triggered", ID, source);
                    publish_event(SupervisorEvent::FailsafeTriggered { source });
                }
                FailsafeEdge::Cleared => {
                    info!("{}: {:?} failsafe cleared", ID, source);
                    publish_event(SupervisorEvent::FailsafeCleared { source });
                }
            }
        }

        if s::FAILSAFE_STATUS.try_get() != Some(monitor.status()) {
            snd_status.send(monitor.status());
        }

        let active_mode = s::ACTIVE_MODE.try_get().unwrap_or(config.mode.initial_mode);
        let mut suppressed: Vec<(FailsafeSource, FailsafeAction), 8> = Vec::new();
        let resolved = resolver.resolve(
            monitor.status(),
            monitor.battery_action(),
            &config.failsafe,
            active_mode,
            |source, action| {
                suppressed.push((source, action)).ok();
            },
        );

        // Announce each suppression once, when it starts
        for &(source, action) in suppressed.iter() {
            if !last_suppressed.contains(&(source, action)) {
                info!("{}: {:?} failsafe suppressed, {:?} exempted by mode", ID, source, action);
                publish_event(SupervisorEvent::FailsafeSuppressed { source, action });
            }
        }
        last_suppressed = suppressed;

        if s::RESOLVED_ACTION.try_get() != Some(resolved) {
            snd_resolved.send(resolved);
        }
    }
}
