//! Resampling schemes that turn a weighted particle set into an equally weighted one.
//!
//! Each scheme is an index-level function: given normalized (or merely non-negative)
//! weights it returns `n` indices drawn in proportion to those weights. Particles are then
//! cloned by index so duplicated lineages evolve independently afterwards.
use crate::particle::ParticleSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ParticleResamplingStrategy {
    /// One random offset, `n` evenly spaced pointers
    #[default]
    Systematic,
    /// `n` independent draws
    Multinomial,
    /// One independent draw inside each of `n` equal strata
    Stratified,
    /// Deterministic integer copies, systematic draw on the remainders
    Residual,
}

impl ParticleResamplingStrategy {
    /// Indices of the particles selected by this strategy.
    pub fn indices<R: Rng>(&self, weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
        match self {
            ParticleResamplingStrategy::Systematic => systematic_resample(weights, n, rng),
            ParticleResamplingStrategy::Multinomial => multinomial_resample(weights, n, rng),
            ParticleResamplingStrategy::Stratified => stratified_resample(weights, n, rng),
            ParticleResamplingStrategy::Residual => residual_resample(weights, n, rng),
        }
    }

    /// Build a new set of exactly `n` particles, each with weight `1/n`.
    pub fn resample<R: Rng>(&self, particles: &ParticleSet, n: usize, rng: &mut R) -> ParticleSet {
        assert!(n > 0, "Resampling target size must be positive");
        assert!(!particles.is_empty(), "Cannot resample an empty particle set");
        let indices = self.indices(&particles.weights(), n, rng);
        let uniform = 1.0 / n as f64;
        let new_particles = indices
            .into_iter()
            .map(|idx| {
                let mut particle = particles.particles()[idx].clone();
                particle.weight = uniform;
                particle
            })
            .collect();
        ParticleSet::from_particles(new_particles, particles.prior().clone())
    }
}

/// Systematic resampling of `particles` down (or up) to `n` equally weighted particles.
pub fn resample<R: Rng>(particles: &ParticleSet, n: usize, rng: &mut R) -> ParticleSet {
    ParticleResamplingStrategy::Systematic.resample(particles, n, rng)
}

fn cumulative(weights: &[f64]) -> Vec<f64> {
    assert!(!weights.is_empty(), "Cannot resample from an empty weight vector");
    let mut total = 0.0;
    let cumsum: Vec<f64> = weights
        .iter()
        .map(|&w| {
            total += w;
            total
        })
        .collect();
    assert!(
        total.is_finite() && total > 0.0,
        "Resampling weights must have a finite positive sum"
    );
    cumsum
}

/// Walk `cumsum` with sorted `positions` (each in `[0, total)`), picking for each position
/// the first particle whose cumulative weight exceeds it.
fn select_sorted(cumsum: &[f64], positions: impl Iterator<Item = f64>) -> Vec<usize> {
    let last = cumsum.len() - 1;
    let mut idx = 0;
    positions
        .map(|u| {
            while idx < last && cumsum[idx] <= u {
                idx += 1;
            }
            idx
        })
        .collect()
}

/// Single offset `u0 ~ U[0, 1/n)`, pointers at `u0 + i/n`.
pub fn systematic_resample<R: Rng>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    let cumsum = cumulative(weights);
    let total = cumsum[cumsum.len() - 1];
    let step = 1.0 / n as f64;
    let u0: f64 = rng.random::<f64>() * step;
    select_sorted(&cumsum, (0..n).map(|i| (u0 + i as f64 * step) * total))
}

/// Pointer `i` drawn independently from `[i/n, (i+1)/n)`.
pub fn stratified_resample<R: Rng>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    let cumsum = cumulative(weights);
    let total = cumsum[cumsum.len() - 1];
    let step = 1.0 / n as f64;
    let positions: Vec<f64> = (0..n)
        .map(|i| (i as f64 + rng.random::<f64>()) * step * total)
        .collect();
    select_sorted(&cumsum, positions.into_iter())
}

/// `n` independent draws from the categorical distribution over `weights`.
pub fn multinomial_resample<R: Rng>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    let cumsum = cumulative(weights);
    let last = cumsum.len() - 1;
    let total = cumsum[last];
    (0..n)
        .map(|_| {
            let u = rng.random::<f64>() * total;
            cumsum.partition_point(|&c| c <= u).min(last)
        })
        .collect()
}

/// Copy `floor(n * w_i)` of each particle, then fill the remainder systematically from the
/// fractional residuals.
pub fn residual_resample<R: Rng>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    let cumsum = cumulative(weights);
    let total = cumsum[cumsum.len() - 1];
    let mut indices = Vec::with_capacity(n);
    let mut residual = Vec::with_capacity(weights.len());
    for (i, &w) in weights.iter().enumerate() {
        let expected = w / total * n as f64;
        let copies = expected.floor() as usize;
        indices.extend(std::iter::repeat_n(i, copies));
        residual.push(expected - copies as f64);
    }
    // Rounding in the expected counts can overshoot by one copy
    indices.truncate(n);
    let remaining = n - indices.len();
    if remaining > 0 {
        indices.extend(systematic_resample(&residual, remaining, rng));
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::{ConstantVelocity, VehicleState};
    use crate::particle::{Particle, ParticlePrior};
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const ALL_STRATEGIES: [ParticleResamplingStrategy; 4] = [
        ParticleResamplingStrategy::Systematic,
        ParticleResamplingStrategy::Multinomial,
        ParticleResamplingStrategy::Stratified,
        ParticleResamplingStrategy::Residual,
    ];

    fn weighted_set(weights: &[f64]) -> ParticleSet {
        let particles = weights
            .iter()
            .enumerate()
            .map(|(i, &w)| Particle::new(VehicleState::new(i as f64 / 10.0, 0.0, 0.05), w))
            .collect();
        ParticleSet::from_particles(particles, ParticlePrior::default())
    }

    /// Pearson chi-squared statistic of selection counts against `weights`.
    fn chi_squared(strategy: ParticleResamplingStrategy, weights: &[f64], seed: u64) -> f64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = 7;
        let trials = 2000;
        let mut counts = vec![0usize; weights.len()];
        for _ in 0..trials {
            for idx in strategy.indices(weights, n, &mut rng) {
                counts[idx] += 1;
            }
        }
        let draws = (n * trials) as f64;
        counts
            .iter()
            .zip(weights)
            .map(|(&observed, &w)| {
                let expected = w * draws;
                (observed as f64 - expected).powi(2) / expected
            })
            .sum()
    }

    #[test]
    fn test_resample_size_and_uniform_weights() {
        let mut rng = StdRng::seed_from_u64(42);
        let set = weighted_set(&[0.1, 0.4, 0.2, 0.3]);
        for strategy in ALL_STRATEGIES {
            for n in [1, 3, 4, 10, 25] {
                let resampled = strategy.resample(&set, n, &mut rng);
                assert_eq!(resampled.len(), n, "{strategy:?}");
                for particle in resampled.iter() {
                    assert_approx_eq!(particle.weight, 1.0 / n as f64, 1e-15);
                }
            }
        }
    }

    #[test]
    fn test_resample_is_weight_proportional() {
        let weights = [0.1, 0.2, 0.3, 0.4];
        // 3 degrees of freedom, p = 0.001 critical value
        let critical = 16.27;
        for strategy in ALL_STRATEGIES {
            let stat = chi_squared(strategy, &weights, 1234);
            assert!(stat < critical, "{strategy:?}: chi-squared {stat}");
        }
    }

    #[test]
    fn test_degenerate_weights_clone_single_particle() {
        let mut rng = StdRng::seed_from_u64(9);
        let set = weighted_set(&[0.0, 0.0, 1.0, 0.0]);
        for strategy in ALL_STRATEGIES {
            let resampled = strategy.resample(&set, 50, &mut rng);
            assert_eq!(resampled.len(), 50);
            assert!(resampled.iter().all(|p| p.state == set.particles()[2].state));
        }
    }

    #[test]
    fn test_zero_weight_particles_never_selected() {
        let mut rng = StdRng::seed_from_u64(17);
        let weights = [0.0, 0.5, 0.0, 0.5, 0.0];
        for strategy in ALL_STRATEGIES {
            for _ in 0..100 {
                let idx = strategy.indices(&weights, 6, &mut rng);
                assert!(idx.iter().all(|&i| i == 1 || i == 3), "{strategy:?}: {idx:?}");
            }
        }
    }

    #[test]
    fn test_systematic_counts_are_floor_or_ceil() {
        let mut rng = StdRng::seed_from_u64(2);
        let weights = [0.05, 0.15, 0.5, 0.3];
        for _ in 0..200 {
            let idx = systematic_resample(&weights, 10, &mut rng);
            for (i, &w) in weights.iter().enumerate() {
                let count = idx.iter().filter(|&&j| j == i).count() as f64;
                let expected = w * 10.0;
                assert!(count >= expected.floor() && count <= expected.ceil());
            }
        }
    }

    #[test]
    fn test_unnormalized_weights_are_accepted() {
        let mut rng = StdRng::seed_from_u64(4);
        let idx = residual_resample(&[2.0, 6.0], 4, &mut rng);
        assert_eq!(idx, vec![0, 1, 1, 1]);
    }

    #[test]
    fn test_duplicates_evolve_independently() {
        let mut rng = StdRng::seed_from_u64(33);
        let set = weighted_set(&[0.0, 1.0]);
        let mut resampled = resample(&set, 2, &mut rng);
        assert_eq!(resampled.particles()[0], resampled.particles()[1]);
        resampled.advance(&ConstantVelocity::default(), 0.1, &mut rng);
        assert_ne!(resampled.particles()[0].x(), resampled.particles()[1].x());
        // The source set is untouched
        assert_eq!(set.particles()[1].x(), 0.1);
    }

    #[test]
    #[should_panic(expected = "Resampling target size must be positive")]
    fn test_zero_target_size_panics() {
        let mut rng = StdRng::seed_from_u64(0);
        let set = weighted_set(&[0.5, 0.5]);
        let _ = resample(&set, 0, &mut rng);
    }

    #[cfg(feature = "clap")]
    #[test]
    fn test_strategy_parses_as_value_enum() {
        use clap::ValueEnum;
        assert_eq!(
            ParticleResamplingStrategy::from_str("stratified", true),
            Ok(ParticleResamplingStrategy::Stratified)
        );
        assert!(ParticleResamplingStrategy::from_str("bogus", true).is_err());
    }
}
