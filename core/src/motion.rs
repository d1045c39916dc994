//! Process models for advancing the vehicle and its particle hypotheses.
//!
//! The true vehicle and every particle share the same kinematic state, so the same
//! [`MotionModel`] drives both. The default [`ConstantVelocity`] model drifts position by
//! `velocity * dt` and adds a Wiener-type diffusion whose standard deviation grows with
//! `sqrt(dt)`, so two half steps have the same variance as one full step.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Scalar kinematic state of the vehicle, or one hypothesis of it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// Position along the track. Only `[0, 1]` is observable in the default scenario.
    pub x: f64,
    /// Velocity in position units per second
    pub velocity: f64,
    /// Position diffusion standard deviation per square-root second
    pub noise: f64,
}
impl Display for VehicleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x={:.4} v={:.4} (noise {:.3e})",
            self.x, self.velocity, self.noise
        )
    }
}
impl VehicleState {
    pub fn new(x: f64, velocity: f64, noise: f64) -> Self {
        VehicleState { x, velocity, noise }
    }
}

/// Stochastic process model for a [`VehicleState`].
pub trait MotionModel {
    /// Advance `state` in place by `dt` seconds.
    ///
    /// `dt == 0` must leave the state untouched. Implementations panic on a negative or
    /// non-finite `dt`.
    fn advance<R: Rng>(&self, state: &mut VehicleState, dt: f64, rng: &mut R);
}

/// Constant velocity drift with additive Gaussian diffusion.
///
/// Position: `x += velocity * dt + state.noise * sqrt(dt) * N(0, 1)`
///
/// Velocity: `velocity += velocity_noise * sqrt(dt) * N(0, 1)`
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstantVelocity {
    /// Velocity random-walk standard deviation per square-root second
    #[serde(default)]
    pub velocity_noise: f64,
}
impl ConstantVelocity {
    pub fn new(velocity_noise: f64) -> Self {
        assert!(
            velocity_noise >= 0.0 && velocity_noise.is_finite(),
            "Velocity noise must be finite and non-negative"
        );
        ConstantVelocity { velocity_noise }
    }
}
impl MotionModel for ConstantVelocity {
    fn advance<R: Rng>(&self, state: &mut VehicleState, dt: f64, rng: &mut R) {
        assert!(
            dt >= 0.0 && dt.is_finite(),
            "Time step must be finite and non-negative, got {dt}"
        );
        if dt == 0.0 {
            return;
        }
        let dt_sqrt = dt.sqrt();
        state.x += state.velocity * dt;
        if state.noise > 0.0 {
            let z: f64 = StandardNormal.sample(rng);
            state.x += z * state.noise * dt_sqrt;
        }
        if self.velocity_noise > 0.0 {
            let z: f64 = StandardNormal.sample(rng);
            state.velocity += z * self.velocity_noise * dt_sqrt;
        }
    }
}
