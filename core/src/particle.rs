//! Weighted particle hypotheses and the particle set that owns them.
//!
//! A [`ParticleSet`] is a Monte Carlo approximation of the posterior over the vehicle
//! state. Each step the driver calls [`ParticleSet::freshen`] to replace dead hypotheses,
//! multiplies every weight by each sensor's likelihood, calls [`ParticleSet::normalize`]
//! (which is where filter loss is detected), and reads the estimate from
//! [`ParticleSet::centroid`].
use crate::motion::{MotionModel, VehicleState};
use crate::sensor::Sensor;

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};

/// One weighted hypothesis of the vehicle state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Particle {
    pub state: VehicleState,
    pub weight: f64,
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("x", &self.state.x)
            .field("velocity", &self.state.velocity)
            .field("weight", &self.weight)
            .finish()
    }
}
impl Particle {
    pub fn new(state: VehicleState, weight: f64) -> Particle {
        Particle { state, weight }
    }
    pub fn x(&self) -> f64 {
        self.state.x
    }
    /// Multiply the weight by the likelihood of `sensor`'s latest observation.
    ///
    /// No renormalization happens here. The likelihood may underflow to zero for a particle
    /// far from every plausible position; [`ParticleSet::normalize`] and
    /// [`ParticleSet::freshen`] deal with that.
    pub fn measure(&mut self, sensor: &Sensor) {
        let observation = match sensor.last_observation() {
            Some(z) => z,
            None => panic!(
                "Sensor at {} has not produced an observation yet",
                sensor.position()
            ),
        };
        self.weight *= sensor.likelihood(self.state.x, observation);
    }
    /// Propagate the hypothesis with `model`. The weight is untouched.
    pub fn advance<M: MotionModel, R: Rng>(&mut self, model: &M, dt: f64, rng: &mut R) {
        model.advance(&mut self.state, dt, rng);
    }
}

/// Prior distribution that new and replacement particles are drawn from.
///
/// Positions are uniform over `[x_min, x_max]`, velocities Gaussian. The position interval
/// doubles as the validity domain: a particle outside it is replaced on the next freshen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticlePrior {
    pub x_min: f64,
    pub x_max: f64,
    pub velocity_mean: f64,
    pub velocity_std: f64,
    /// Position diffusion assigned to every drawn particle
    pub noise: f64,
}
impl Default for ParticlePrior {
    fn default() -> Self {
        ParticlePrior {
            x_min: 0.0,
            x_max: 1.0,
            velocity_mean: 0.0,
            velocity_std: 0.2,
            noise: 0.02,
        }
    }
}
impl ParticlePrior {
    /// Draw one particle carrying `weight`.
    pub fn draw<R: Rng>(&self, weight: f64, rng: &mut R) -> Particle {
        let u: f64 = rng.random();
        let x = self.x_min + u * (self.x_max - self.x_min);
        let velocity = if self.velocity_std > 0.0 {
            let z: f64 = StandardNormal.sample(rng);
            self.velocity_mean + z * self.velocity_std
        } else {
            self.velocity_mean
        };
        Particle::new(VehicleState::new(x, velocity, self.noise), weight)
    }
    /// True when `x` lies inside the closed prior interval.
    pub fn contains(&self, x: f64) -> bool {
        x >= self.x_min && x <= self.x_max
    }
}

/// Draw `n` particles from `prior`, each with weight `1/n`.
pub fn generate_particles<R: Rng>(n: usize, prior: &ParticlePrior, rng: &mut R) -> ParticleSet {
    assert!(n > 0, "Number of particles must be positive");
    let weight = 1.0 / n as f64;
    let particles = (0..n).map(|_| prior.draw(weight, rng)).collect();
    ParticleSet::from_particles(particles, prior.clone())
}

/// The authoritative collection of particles for one run.
#[derive(Clone, PartialEq)]
pub struct ParticleSet {
    particles: Vec<Particle>,
    prior: ParticlePrior,
}
impl Debug for ParticleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_weight = self
            .particles
            .iter()
            .map(|p| p.weight)
            .fold(f64::INFINITY, f64::min);
        let max_weight = self.particles.iter().map(|p| p.weight).fold(0.0, f64::max);
        f.debug_struct("ParticleSet")
            .field("num_particles", &self.particles.len())
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .field("prior", &self.prior)
            .finish()
    }
}
impl ParticleSet {
    pub fn from_particles(particles: Vec<Particle>, prior: ParticlePrior) -> Self {
        ParticleSet { particles, prior }
    }
    pub fn len(&self) -> usize {
        self.particles.len()
    }
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Particle> {
        self.particles.iter()
    }
    pub fn prior(&self) -> &ParticlePrior {
        &self.prior
    }
    pub fn weights(&self) -> Vec<f64> {
        self.particles.iter().map(|p| p.weight).collect()
    }
    /// Weight a freshly drawn particle receives.
    pub fn uniform_weight(&self) -> f64 {
        1.0 / self.particles.len() as f64
    }

    fn is_viable(&self, particle: &Particle) -> bool {
        particle.state.x.is_finite()
            && self.prior.contains(particle.state.x)
            && particle.weight.is_finite()
            && particle.weight > 0.0
    }

    /// Replace every particle that left the domain or carries a zero or non-finite weight.
    ///
    /// Replacements are drawn from the prior with the uniform weight `1/n`. The stale indices
    /// are collected first and the set is rebuilt in a single pass. Returns the number of
    /// particles replaced; a set with nothing to replace is left exactly as it was.
    pub fn freshen<R: Rng>(&mut self, rng: &mut R) -> usize {
        let stale: Vec<usize> = self
            .particles
            .iter()
            .enumerate()
            .filter(|(_, p)| !self.is_viable(p))
            .map(|(i, _)| i)
            .collect();
        if stale.is_empty() {
            return 0;
        }
        let mut replace = vec![false; self.particles.len()];
        for &i in &stale {
            replace[i] = true;
        }
        let baseline = self.uniform_weight();
        let prior = &self.prior;
        let rebuilt: Vec<Particle> = self
            .particles
            .iter()
            .zip(replace)
            .map(|(p, stale)| {
                if stale {
                    prior.draw(baseline, rng)
                } else {
                    p.clone()
                }
            })
            .collect();
        self.particles = rebuilt;
        stale.len()
    }

    /// Weigh every particle against `sensor`'s latest observation.
    pub fn measure(&mut self, sensor: &Sensor) {
        for particle in &mut self.particles {
            particle.measure(sensor);
        }
    }

    /// Rescale the weights to sum to one.
    ///
    /// Returns `false` when the total weight is non-finite or not positive, meaning every hypothesis has collapsed and the filter has lost track. The weights are
    /// left untouched in that case and the caller is expected to regenerate the set.
    pub fn normalize(&mut self) -> bool {
        let sum: f64 = self.particles.iter().map(|p| p.weight).sum();
        if !sum.is_finite() || sum <= 0.0 {
            return false;
        }
        for particle in &mut self.particles {
            particle.weight /= sum;
        }
        true
    }

    /// Weighted mean position, `Σ w_i x_i`. Only meaningful after a successful normalize.
    pub fn centroid(&self) -> f64 {
        self.particles.iter().map(|p| p.weight * p.state.x).sum()
    }

    /// Weighted variance of position about the centroid
    pub fn variance(&self) -> f64 {
        let mean = self.centroid();
        self.particles
            .iter()
            .map(|p| p.weight * (p.state.x - mean).powi(2))
            .sum()
    }

    /// N_eff = 1 / Σ w_i², for normalized weights
    pub fn effective_sample_size(&self) -> f64 {
        let sum_of_squares: f64 = self.particles.iter().map(|p| p.weight * p.weight).sum();
        if sum_of_squares > 0.0 {
            1.0 / sum_of_squares
        } else {
            0.0
        }
    }

    /// Propagate every particle by `dt` seconds.
    pub fn advance<M: MotionModel, R: Rng>(&mut self, model: &M, dt: f64, rng: &mut R) {
        for particle in &mut self.particles {
            particle.advance(model, dt, rng);
        }
    }
}
