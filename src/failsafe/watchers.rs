use embassy_time::Instant;

use crate::config::{
    AdsbFailsafeConfig, DeadReckonFailsafeConfig, EkfFailsafeConfig, GcsFailsafeConfig,
    RadioFailsafeConfig, TerrainFailsafeConfig,
};
use crate::filters::Lowpass;
use crate::types::inputs::{AdsbThreat, EstimatorStatus, NavStatus, RadioInput};

/// Transition of a single failsafe source between its two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FailsafeEdge {
    Triggered,
    Cleared,
}

fn edge(active: &mut bool, next: bool) -> Option<FailsafeEdge> {
    match (*active, next) {
        (false, true) => {
            *active = true;
            Some(FailsafeEdge::Triggered)
        }
        (true, false) => {
            *active = false;
            Some(FailsafeEdge::Cleared)
        }
        _ => None,
    }
}

/// Radio link watcher. Counts consecutive bad readings so a single
/// dropped frame does not trigger, and requires the throttle to clear
/// the failsafe level by a margin before releasing.
pub struct RadioWatcher {
    counter: u8,
    active: bool,
}

impl RadioWatcher {
    pub const fn new() -> Self {
        Self {
            counter: 0,
            active: false,
        }
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn update(
        &mut self,
        radio: &RadioInput,
        config: &RadioFailsafeConfig,
    ) -> Option<FailsafeEdge> {
        if !config.enable {
            return edge(&mut self.active, false);
        }

        let bad = !radio.present || radio.throttle_us < config.throttle_min_us;
        let recovered = radio.present
            && radio.throttle_us > config.throttle_min_us + config.clear_margin_us;

        if bad {
            self.counter = self.counter.saturating_add(1).min(config.trigger_count);
        } else if recovered {
            self.counter = self.counter.saturating_sub(1);
        }

        let next = if self.active {
            self.counter > 0
        } else {
            self.counter >= config.trigger_count
        };
        edge(&mut self.active, next)
    }
}

/// Ground station link watcher. Armed only after the first heartbeat,
/// a vehicle that never saw a ground station does not failsafe.
pub struct GcsWatcher {
    active: bool,
}

impl GcsWatcher {
    pub const fn new() -> Self {
        Self { active: false }
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn update(
        &mut self,
        last_heartbeat: Option<Instant>,
        now: Instant,
        config: &GcsFailsafeConfig,
    ) -> Option<FailsafeEdge> {
        let silent = match last_heartbeat {
            Some(seen) => (now - seen).as_millis() > config.timeout_ms as u64,
            None => false,
        };
        edge(&mut self.active, config.enable && silent)
    }
}

/// Estimator watcher. The raw variances are low-pass filtered before
/// comparison so the failsafe triggers on sustained degradation, and a
/// symmetric up/down counter gives the trigger and release the same
/// persistence requirement.
pub struct EkfWatcher {
    pos_var: Lowpass<f32>,
    vel_var: Lowpass<f32>,
    cmp_var: Lowpass<f32>,
    counter: u8,
    active: bool,
}

impl EkfWatcher {
    pub fn new(config: &EkfFailsafeConfig, dt: f32) -> Self {
        Self {
            pos_var: Lowpass::from_cutoff(config.filter_hz, dt),
            vel_var: Lowpass::from_cutoff(config.filter_hz, dt),
            cmp_var: Lowpass::from_cutoff(config.filter_hz, dt),
            counter: 0,
            active: false,
        }
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// Two of the three variances over the threshold, or velocity alone
    /// at twice the threshold, counts as a degraded tick.
    fn over_threshold(&mut self, estimator: &EstimatorStatus, config: &EkfFailsafeConfig) -> bool {
        let pos = self.pos_var.update(estimator.position_variance);
        let vel = self.vel_var.update(estimator.velocity_variance);
        let cmp = self.cmp_var.update(estimator.compass_variance);

        if vel >= 2.0 * config.variance_threshold {
            return true;
        }

        let mut over = 0;
        for var in [pos, vel, cmp] {
            if var >= config.variance_threshold {
                over += 1;
            }
        }
        over >= 2
    }

    pub fn update(
        &mut self,
        estimator: &EstimatorStatus,
        config: &EkfFailsafeConfig,
    ) -> Option<FailsafeEdge> {
        let degraded = self.over_threshold(estimator, config) || !estimator.attitude_valid;

        if degraded {
            self.counter = self
                .counter
                .saturating_add(1)
                .min(config.trigger_iterations);
        } else {
            self.counter = self.counter.saturating_sub(1);
        }

        let next = if self.active {
            self.counter > 0
        } else {
            self.counter >= config.trigger_iterations
        };
        edge(&mut self.active, next)
    }
}

/// Terrain data watcher. Only relevant while the active mode navigates
/// by terrain data, and only triggers after a continuous outage.
pub struct TerrainWatcher {
    first_failure: Option<Instant>,
    active: bool,
}

impl TerrainWatcher {
    pub const fn new() -> Self {
        Self {
            first_failure: None,
            active: false,
        }
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn update(
        &mut self,
        nav: &NavStatus,
        now: Instant,
        config: &TerrainFailsafeConfig,
    ) -> Option<FailsafeEdge> {
        let failing = config.enable && nav.terrain_needed && !nav.terrain_data_ok;

        if !failing {
            self.first_failure = None;
            return edge(&mut self.active, false);
        }

        let first = *self.first_failure.get_or_insert(now);
        let next = (now - first).as_millis() >= config.timeout_ms as u64;
        let next = self.active || next;
        edge(&mut self.active, next)
    }
}

/// Traffic threat watcher. The avoidance backend owns the threat
/// evaluation, this only tracks the edge.
pub struct AdsbWatcher {
    active: bool,
}

impl AdsbWatcher {
    pub const fn new() -> Self {
        Self { active: false }
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn update(
        &mut self,
        adsb: &AdsbThreat,
        config: &AdsbFailsafeConfig,
    ) -> Option<FailsafeEdge> {
        edge(&mut self.active, config.enable && adsb.threat_detected)
    }
}

/// Dead reckoning watcher. Triggers when the estimator has navigated
/// without absolute position aiding for longer than the timeout.
pub struct DeadReckonWatcher {
    since: Option<Instant>,
    active: bool,
}

impl DeadReckonWatcher {
    pub const fn new() -> Self {
        Self {
            since: None,
            active: false,
        }
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn update(
        &mut self,
        estimator: &EstimatorStatus,
        now: Instant,
        config: &DeadReckonFailsafeConfig,
    ) -> Option<FailsafeEdge> {
        if !config.enable || !estimator.dead_reckoning {
            self.since = None;
            return edge(&mut self.active, false);
        }

        let since = *self.since.get_or_insert(now);
        let next = (now - since).as_millis() >= config.timeout_ms as u64;
        let next = self.active || next;
        edge(&mut self.active, next)
    }
}
