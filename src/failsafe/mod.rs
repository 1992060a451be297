//! Failsafe detection and resolution.
//!
//! Each failure source has a watcher that owns the trigger and release
//! hysteresis for that source. The [`FailsafeMonitor`] runs all watchers
//! against one input sample per tick and maintains the combined status
//! word, the [`ActionResolver`] then maps the triggered sources to at
//! most one corrective action per pass.

pub mod resolver;
pub mod watchers;

pub use resolver::ActionResolver;
pub use watchers::FailsafeEdge;

use embassy_time::Instant;
use heapless::Vec;

use crate::config::FailsafeConfig;
use crate::types::actions::{FailsafeAction, FailsafeSource};
use crate::types::inputs::{AdsbThreat, BatteryStatus, EstimatorStatus, NavStatus, RadioInput};
use crate::types::status::FailsafeStatus;
use watchers::{
    AdsbWatcher, DeadReckonWatcher, EkfWatcher, GcsWatcher, RadioWatcher, TerrainWatcher,
};

/// Evaluation rate of the failsafe monitor task [Hz].
pub const MONITOR_RATE_HZ: u64 = 10;

/// Sampling interval matching [`MONITOR_RATE_HZ`], used to tune the
/// variance filters.
pub const MONITOR_DT: f32 = 1.0 / MONITOR_RATE_HZ as f32;

/// One tick worth of watcher inputs.
#[derive(Debug, Clone, Copy)]
pub struct MonitorSample {
    pub radio: RadioInput,
    pub gcs_heartbeat: Option<Instant>,
    pub estimator: EstimatorStatus,
    pub nav: NavStatus,
    pub adsb: AdsbThreat,
    pub battery: BatteryStatus,
}

impl MonitorSample {
    pub const fn nominal() -> Self {
        Self {
            radio: RadioInput::nominal(),
            gcs_heartbeat: None,
            estimator: EstimatorStatus::nominal(),
            nav: NavStatus::nominal(),
            adsb: AdsbThreat::nominal(),
            battery: BatteryStatus::nominal(),
        }
    }
}

/// Runs every watcher against the sampled vehicle state and folds the
/// individual edges into the combined [`FailsafeStatus`] word.
///
/// The battery source is not watched here, its backend monitors cell
/// state itself and hands over a ready-made action, so the monitor only
/// tracks the edges of that request.
pub struct FailsafeMonitor {
    radio: RadioWatcher,
    gcs: GcsWatcher,
    ekf: EkfWatcher,
    terrain: TerrainWatcher,
    adsb: AdsbWatcher,
    deadreckon: DeadReckonWatcher,
    status: FailsafeStatus,
    battery_action: Option<FailsafeAction>,
}

impl FailsafeMonitor {
    pub fn new(config: &FailsafeConfig) -> Self {
        Self {
            radio: RadioWatcher::new(),
            gcs: GcsWatcher::new(),
            ekf: EkfWatcher::new(&config.ekf, MONITOR_DT),
            terrain: TerrainWatcher::new(),
            adsb: AdsbWatcher::new(),
            deadreckon: DeadReckonWatcher::new(),
            status: FailsafeStatus::empty(),
            battery_action: None,
        }
    }

    /// Combined status word over all watched sources.
    pub fn status(&self) -> FailsafeStatus {
        self.status
    }

    /// Action currently requested by the battery backend, if any.
    pub fn battery_action(&self) -> Option<FailsafeAction> {
        self.battery_action
    }

    /// Advance every watcher by one sample. Returns the edges seen this
    /// tick, sources that merely stay triggered or clear produce none.
    pub fn update(
        &mut self,
        sample: &MonitorSample,
        now: Instant,
        config: &FailsafeConfig,
    ) -> Vec<(FailsafeSource, FailsafeEdge), 8> {
        let mut edges = Vec::new();
        let mut apply = |bit, source, edge: Option<FailsafeEdge>| {
            if let Some(edge) = edge {
                self.status.set(bit, edge == FailsafeEdge::Triggered);
                let _ = edges.push((source, edge));
            }
        };

        apply(
            FailsafeStatus::RADIO,
            FailsafeSource::Radio,
            self.radio.update(&sample.radio, &config.radio),
        );
        apply(
            FailsafeStatus::GCS,
            FailsafeSource::Gcs,
            self.gcs.update(sample.gcs_heartbeat, now, &config.gcs),
        );
        apply(
            FailsafeStatus::EKF,
            FailsafeSource::Ekf,
            self.ekf.update(&sample.estimator, &config.ekf),
        );
        apply(
            FailsafeStatus::TERRAIN,
            FailsafeSource::Terrain,
            self.terrain.update(&sample.nav, now, &config.terrain),
        );
        apply(
            FailsafeStatus::ADSB,
            FailsafeSource::Adsb,
            self.adsb.update(&sample.adsb, &config.adsb),
        );
        apply(
            FailsafeStatus::DEADRECKON,
            FailsafeSource::DeadReckon,
            self.deadreckon
                .update(&sample.estimator, now, &config.deadreckon),
        );
        drop(apply);

        // An escalating battery backend re-announces with the new action
        if sample.battery.failsafe_action != self.battery_action {
            let edge = if sample.battery.failsafe_action.is_some() {
                FailsafeEdge::Triggered
            } else {
                FailsafeEdge::Cleared
            };
            let _ = edges.push((FailsafeSource::Battery, edge));
            self.battery_action = sample.battery.failsafe_action;
        }

        edges
    }
}
