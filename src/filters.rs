use num_traits::Float;

/// First order low-pass filter with a fixed sample time.
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Lowpass<T: Float> {
    y: T,
    alpha0: T,
    alpha1: T,
}

impl<T: Float> Lowpass<T> {
    pub fn new(tau: T, dt: T) -> Self {
        let alpha0 = dt / (tau + dt);
        let alpha1 = T::one() - alpha0;
        Self {
            y: T::zero(),
            alpha0,
            alpha1,
        }
    }

    /// Construct from a cutoff frequency in Hz.
    pub fn from_cutoff(cutoff_hz: T, dt: T) -> Self {
        let two_pi = T::from(core::f64::consts::TAU).unwrap();
        Self::new(T::one() / (two_pi * cutoff_hz), dt)
    }

    pub fn update(&mut self, x: T) -> T {
        self.y = self.alpha0 * x + self.alpha1 * self.y;
        self.y
    }

    /// Force the filter state to `value`.
    pub fn reset(&mut self, value: T) {
        self.y = value;
    }

    pub fn value(&self) -> T {
        self.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_response_converges() {
        let mut filter = Lowpass::new(0.1f32, 0.01);
        let mut y = 0.0;
        for _ in 0..500 {
            y = filter.update(1.0);
        }
        assert!((y - 1.0).abs() < 1e-3);
    }

    #[test]
    fn filter_attenuates_single_spike() {
        let mut filter = Lowpass::from_cutoff(5.0f32, 0.1);
        let y = filter.update(10.0);
        assert!(y < 10.0);
        let y = filter.update(0.0);
        assert!(y < 5.0);
    }
}
