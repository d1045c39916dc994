//! Simulation driver: runs the filter against a simulated vehicle and collects results.
//!
//! This module provides:
//! - [`Simulation`], which owns the true vehicle, the sensors, the authoritative
//!   [`ParticleSet`] and the run's random number generator
//! - [`RunState`] snapshots, one per accepted step
//! - [`SimulationResult`] with CSV export of per-step estimates and per-particle states
//!
//! A step is atomic: it either yields an estimate (and a snapshot) or reports
//! [`StepOutcome::Lost`], in which case the particle set is regenerated from the prior and
//! neither the clock nor the vehicle advances.
use crate::config::{ResamplePolicy, SimulationConfig};
use crate::motion::{ConstantVelocity, MotionModel, VehicleState};
use crate::particle::{ParticleSet, generate_particles};
use crate::sensor::Sensor;

use anyhow::bail;
use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// Slack for comparing accumulated time against the resampling period
const TIME_EPSILON: f64 = 1e-9;

/// Result of a single filter step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepOutcome {
    /// Weights normalized; carries the centroid estimate
    Estimated(f64),
    /// Every particle's weight collapsed; the set was regenerated
    Lost,
}

/// Snapshot taken after a successful normalize, before resampling and motion.
#[derive(Clone, Debug)]
pub struct RunState {
    /// Index of the accepted step
    pub step: usize,
    /// Simulated time in seconds
    pub time: f64,
    pub vehicle: VehicleState,
    pub particles: ParticleSet,
    /// Centroid estimate of the vehicle position
    pub estimate: f64,
    /// Whether the set was resampled at the end of this step
    pub resampled: bool,
}
impl RunState {
    pub fn error(&self) -> f64 {
        self.estimate - self.vehicle.x
    }
}

/// Everything a renderer needs to replay a run.
#[derive(Clone, Debug)]
pub struct SimulationResult {
    pub sensors: Vec<Sensor>,
    pub dt: f64,
    pub states: Vec<RunState>,
    /// Total number of lost steps
    pub losses: usize,
}

/// One CSV row per accepted step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub time: f64,
    pub vehicle_x: f64,
    pub vehicle_velocity: f64,
    pub estimate: f64,
    pub error: f64,
    /// Weighted standard deviation of particle positions
    pub spread: f64,
    pub effective_sample_size: f64,
    pub resampled: bool,
}

/// One CSV row per particle per accepted step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticleRecord {
    pub step: usize,
    pub index: usize,
    pub x: f64,
    pub velocity: f64,
    pub weight: f64,
}

impl SimulationResult {
    pub fn estimates(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.estimate).collect()
    }

    /// Root-mean-square position error over all accepted steps
    pub fn rms_error(&self) -> f64 {
        if self.states.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.states.iter().map(|s| s.error().powi(2)).sum();
        (sum_sq / self.states.len() as f64).sqrt()
    }

    pub fn step_records(&self) -> Vec<StepRecord> {
        self.states
            .iter()
            .map(|s| StepRecord {
                step: s.step,
                time: s.time,
                vehicle_x: s.vehicle.x,
                vehicle_velocity: s.vehicle.velocity,
                estimate: s.estimate,
                error: s.error(),
                spread: s.particles.variance().sqrt(),
                effective_sample_size: s.particles.effective_sample_size(),
                resampled: s.resampled,
            })
            .collect()
    }

    /// Writes one row per step: vehicle state, estimate, error and set diagnostics.
    ///
    /// # Arguments
    /// * `path` - Path where the CSV file will be saved
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in self.step_records() {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes one row per particle per step. This file grows as `steps * num_particles`.
    pub fn write_particles_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for state in &self.states {
            for (index, particle) in state.particles.iter().enumerate() {
                writer.serialize(ParticleRecord {
                    step: state.step,
                    index,
                    x: particle.state.x,
                    velocity: particle.state.velocity,
                    weight: particle.weight,
                })?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

/// A single tracking run.
pub struct Simulation {
    config: SimulationConfig,
    model: ConstantVelocity,
    vehicle: VehicleState,
    sensors: Vec<Sensor>,
    particles: ParticleSet,
    rng: StdRng,
    time: f64,
    since_resample: f64,
    consecutive_losses: usize,
    losses: usize,
    states: Vec<RunState>,
}

impl Simulation {
    /// Validate `config` and draw the initial particle set.
    pub fn new(config: SimulationConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let particles = generate_particles(config.num_particles, &config.prior, &mut rng);
        Ok(Simulation {
            model: config.motion,
            vehicle: config.vehicle,
            sensors: config.build_sensors(),
            particles,
            rng,
            time: 0.0,
            since_resample: 0.0,
            consecutive_losses: 0,
            losses: 0,
            states: Vec::new(),
            config,
        })
    }

    /// Replace the initial particle set, e.g. to start from an informed prior.
    pub fn with_particles(mut self, particles: ParticleSet) -> Self {
        assert!(!particles.is_empty(), "Particle set must not be empty");
        self.particles = particles;
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
    pub fn vehicle(&self) -> &VehicleState {
        &self.vehicle
    }
    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }
    pub fn particles(&self) -> &ParticleSet {
        &self.particles
    }
    pub fn states(&self) -> &[RunState] {
        &self.states
    }
    pub fn time(&self) -> f64 {
        self.time
    }
    pub fn losses(&self) -> usize {
        self.losses
    }
    pub fn consecutive_losses(&self) -> usize {
        self.consecutive_losses
    }

    /// True while the vehicle is strictly inside the domain and the step budget remains.
    pub fn is_running(&self) -> bool {
        let prior = &self.config.prior;
        self.vehicle.x > prior.x_min
            && self.vehicle.x < prior.x_max
            && self.states.len() < self.config.max_steps()
    }

    fn resample_due(&self) -> bool {
        match self.config.resampling.policy {
            ResamplePolicy::Interval { period_s } => self.since_resample + TIME_EPSILON >= period_s,
            ResamplePolicy::EffectiveSampleSize { threshold } => {
                self.particles.effective_sample_size()
                    < threshold * self.config.num_particles as f64
            }
        }
    }

    /// One full sweep: freshen, measure, normalize, estimate, resample, advance.
    pub fn step(&mut self) -> StepOutcome {
        let replaced = self.particles.freshen(&mut self.rng);
        if replaced > 0 {
            debug!("Replaced {replaced} stale particles at t={:.2}s", self.time);
        }

        for sensor in &mut self.sensors {
            sensor.measure(self.vehicle.x, &mut self.rng);
            self.particles.measure(sensor);
        }

        if !self.particles.normalize() {
            self.losses += 1;
            self.consecutive_losses += 1;
            warn!(
                "Lost track at t={:.2}s (vehicle at {:.4}); regenerating particles",
                self.time, self.vehicle.x
            );
            self.particles =
                generate_particles(self.config.num_particles, &self.config.prior, &mut self.rng);
            return StepOutcome::Lost;
        }
        self.consecutive_losses = 0;

        let estimate = self.particles.centroid();
        debug!("actual: {:.4}  imputed: {:.4}", self.vehicle.x, estimate);

        let resampled = self.resample_due();
        self.states.push(RunState {
            step: self.states.len(),
            time: self.time,
            vehicle: self.vehicle,
            particles: self.particles.clone(),
            estimate,
            resampled,
        });
        if resampled {
            debug!(
                "Resampling at t={:.2}s (N_eff {:.1})",
                self.time,
                self.particles.effective_sample_size()
            );
            self.particles = self.config.resampling.strategy.resample(
                &self.particles,
                self.config.num_particles,
                &mut self.rng,
            );
            self.since_resample = 0.0;
        }

        let dt = self.config.dt;
        self.model.advance(&mut self.vehicle, dt, &mut self.rng);
        self.particles.advance(&self.model, dt, &mut self.rng);
        self.time += dt;
        self.since_resample += dt;

        StepOutcome::Estimated(estimate)
    }

    /// Step until the vehicle leaves the domain or the duration is used up.
    ///
    /// Fails if the filter loses track more than `max_consecutive_losses` times in a row.
    pub fn run(mut self) -> anyhow::Result<SimulationResult> {
        info!(
            "Starting run: {} particles, {} sensors, dt={}s, up to {} steps",
            self.config.num_particles,
            self.sensors.len(),
            self.config.dt,
            self.config.max_steps()
        );
        while self.is_running() {
            if self.step() == StepOutcome::Lost
                && self.consecutive_losses > self.config.max_consecutive_losses
            {
                bail!(
                    "filter lost track {} times in a row at t={:.2}s",
                    self.consecutive_losses,
                    self.time
                );
            }
        }
        let result = SimulationResult {
            sensors: self.sensors,
            dt: self.config.dt,
            states: self.states,
            losses: self.losses,
        };
        info!(
            "Run finished: {} steps, {} losses, RMS error {:.4}",
            result.states.len(),
            result.losses,
            result.rms_error()
        );
        Ok(result)
    }
}
