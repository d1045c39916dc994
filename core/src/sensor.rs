//! Fixed range sensors and the Gaussian range likelihood.
//!
//! A sensor sits at a fixed position on the track and reports the distance to the vehicle,
//! corrupted by zero-mean Gaussian noise. A single range reading cannot tell which side of
//! the sensor the vehicle is on, so at least two sensors at distinct positions are needed
//! for a unimodal posterior. With one sensor the filter keeps two mirror-image modes; that
//! is a degenerate but valid configuration.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use std::f64::consts::PI;

/// Smallest standard deviation used when evaluating a likelihood.
///
/// A noiseless sensor would otherwise produce a Dirac likelihood that no particle can satisfy.
pub const MIN_LIKELIHOOD_STD: f64 = 1e-3;

/// A fixed-position range sensor.
#[derive(Clone, Debug, PartialEq)]
pub struct Sensor {
    position: f64,
    noise_std: f64,
    last_observation: Option<f64>,
}

impl Sensor {
    pub fn new(position: f64, noise_std: f64) -> Self {
        assert!(position.is_finite(), "Sensor position must be finite");
        assert!(
            noise_std >= 0.0 && noise_std.is_finite(),
            "Sensor noise standard deviation must be finite and non-negative"
        );
        Sensor {
            position,
            noise_std,
            last_observation: None,
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn noise_std(&self) -> f64 {
        self.noise_std
    }

    /// Most recent reading produced by [`Sensor::measure`], if any.
    pub fn last_observation(&self) -> Option<f64> {
        self.last_observation
    }

    /// Distance from this sensor to `x` with no noise applied.
    pub fn expected_range(&self, x: f64) -> f64 {
        (x - self.position).abs()
    }

    /// Measure the range to the true vehicle position.
    ///
    /// The reading is stored as the sensor's latest observation and also returned.
    pub fn measure<R: Rng>(&mut self, true_x: f64, rng: &mut R) -> f64 {
        let mut observation = self.expected_range(true_x);
        if self.noise_std > 0.0 {
            let z: f64 = StandardNormal.sample(rng);
            observation += z * self.noise_std;
        }
        self.last_observation = Some(observation);
        observation
    }

    /// Gaussian density of `observation` given a vehicle at `hypothesis_x`.
    ///
    /// The density is evaluated on the residual between the observed range and the range the
    /// hypothesis implies, with standard deviation `max(noise_std, MIN_LIKELIHOOD_STD)`. The
    /// value is an unnormalized weight and may exceed one; it underflows to exactly zero for
    /// hypotheses far from the observation.
    pub fn likelihood(&self, hypothesis_x: f64, observation: f64) -> f64 {
        let residual = observation - self.expected_range(hypothesis_x);
        gaussian_log_density(residual, self.likelihood_std()).exp()
    }

    /// Standard deviation used by [`Sensor::likelihood`].
    pub fn likelihood_std(&self) -> f64 {
        self.noise_std.max(MIN_LIKELIHOOD_STD)
    }
}

fn gaussian_log_density(residual: f64, std_dev: f64) -> f64 {
    if !residual.is_finite() {
        return f64::NEG_INFINITY;
    }
    let normalized = residual / std_dev;
    -0.5 * normalized * normalized - std_dev.ln() - 0.5 * (2.0 * PI).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_noiseless_measurement_is_range() {
        let mut sensor = Sensor::new(0.25, 0.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sensor.last_observation(), None);
        let z = sensor.measure(0.4, &mut rng);
        assert_approx_eq!(z, 0.15, 1e-12);
        assert_eq!(sensor.last_observation(), Some(z));
        let z = sensor.measure(0.1, &mut rng);
        assert_approx_eq!(z, 0.15, 1e-12);
    }

    #[test]
    fn test_measurement_noise_statistics() {
        let mut sensor = Sensor::new(0.5, 0.05);
        let mut rng = StdRng::seed_from_u64(99);
        let n = 10_000;
        let readings: Vec<f64> = (0..n).map(|_| sensor.measure(0.9, &mut rng)).collect();
        let mean = readings.iter().sum::<f64>() / n as f64;
        let var = readings.iter().map(|z| (z - mean).powi(2)).sum::<f64>() / n as f64;
        assert_approx_eq!(mean, 0.4, 5e-3);
        assert_approx_eq!(var.sqrt(), 0.05, 5e-3);
    }

    #[test]
    fn test_likelihood_peaks_at_consistent_hypothesis() {
        let sensor = Sensor::new(0.25, 0.05);
        let peak = sensor.likelihood(0.4, 0.15);
        assert_approx_eq!(peak, 1.0 / (0.05 * (2.0 * PI).sqrt()), 1e-9);
        assert!(sensor.likelihood(0.45, 0.15) < peak);
        assert!(sensor.likelihood(0.6, 0.15) < sensor.likelihood(0.45, 0.15));
    }

    #[test]
    fn test_single_sensor_is_ambiguous() {
        let sensor = Sensor::new(0.5, 0.02);
        assert_approx_eq!(
            sensor.likelihood(0.3, 0.2),
            sensor.likelihood(0.7, 0.2),
            1e-12
        );
    }

    #[test]
    fn test_noiseless_sensor_uses_likelihood_floor() {
        let sensor = Sensor::new(0.75, 0.0);
        assert_eq!(sensor.likelihood_std(), MIN_LIKELIHOOD_STD);
        let w = sensor.likelihood(0.4, 0.35);
        assert!(w.is_finite() && w > 0.0);
    }

    #[test]
    fn test_far_hypothesis_underflows_to_zero() {
        let sensor = Sensor::new(0.25, 0.0);
        assert_eq!(sensor.likelihood(0.9, 0.15), 0.0);
        assert_eq!(sensor.likelihood(0.4, f64::NAN), 0.0);
    }

    #[test]
    #[should_panic(expected = "Sensor noise standard deviation must be finite and non-negative")]
    fn test_negative_noise_panics() {
        let _sensor = Sensor::new(0.5, -0.1);
    }
}
