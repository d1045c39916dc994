//! PFT: a one-dimensional Bayesian particle filter.
//!
//! This crate estimates the position of a vehicle moving along a line from noisy range
//! readings taken by sensors at fixed positions. The posterior over the vehicle state is
//! represented by a set of weighted particles (a sequential Monte Carlo approximation).
//!
//! ## Crate overview
//!
//! - [motion]: the vehicle state and the stochastic process model that advances it.
//! - [sensor]: fixed range sensors and the Gaussian range likelihood.
//! - [particle]: particles, the prior they are drawn from, and the particle set with its
//!   freshen / normalize / centroid operations.
//! - [resample]: systematic, stratified, multinomial and residual resampling.
//! - [config]: run configuration and its JSON/YAML/TOML serialization.
//! - [sim]: the driver that runs the filter against a simulated vehicle.
//!
//! ## Filter step
//!
//! Each time step runs the same fixed sequence:
//!
//! 1. `freshen` replaces particles that left the domain or carry a dead weight
//! 2. every sensor measures the true vehicle and every particle multiplies its weight by
//!    that reading's likelihood
//! 3. `normalize` rescales the weights to sum to one, or reports that track was lost
//! 4. `centroid` gives the position estimate `Σ w_i x_i`
//! 5. the set is resampled when the resampling policy says so
//! 6. the vehicle and every particle advance by `dt`
//!
//! Range readings are symmetric about a sensor, so one sensor leaves two mirror-image
//! modes in the posterior. Two or more sensors at distinct positions are needed for the
//! estimate to converge.
//!
//! ## Example
//!
//! ```
//! use pft::motion::ConstantVelocity;
//! use pft::particle::{ParticlePrior, generate_particles};
//! use pft::resample::resample;
//! use pft::sensor::Sensor;
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let model = ConstantVelocity::default();
//! let mut sensors = vec![Sensor::new(0.25, 0.02), Sensor::new(0.75, 0.02)];
//! let mut particles = generate_particles(500, &ParticlePrior::default(), &mut rng);
//! let true_x = 0.4;
//!
//! particles.freshen(&mut rng);
//! for sensor in &mut sensors {
//!     sensor.measure(true_x, &mut rng);
//!     particles.measure(sensor);
//! }
//! assert!(particles.normalize());
//! let estimate = particles.centroid();
//! assert!((estimate - true_x).abs() < 0.1);
//!
//! let mut particles = resample(&particles, 500, &mut rng);
//! particles.advance(&model, 0.1, &mut rng);
//! ```
pub mod config;
pub mod motion;
pub mod particle;
pub mod resample;
pub mod sensor;
pub mod sim;

pub use config::SimulationConfig;
pub use motion::{ConstantVelocity, MotionModel, VehicleState};
pub use particle::{Particle, ParticlePrior, ParticleSet, generate_particles};
pub use resample::{ParticleResamplingStrategy, resample};
pub use sensor::Sensor;
pub use sim::{RunState, Simulation, SimulationResult, StepOutcome};
