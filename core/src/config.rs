//! Run configuration for the tracking simulation.
//!
//! Every run parameter lives in [`SimulationConfig`] and is passed explicitly into the
//! driver; nothing is process-wide. Configurations can be stored as JSON, YAML, or TOML and
//! the generic [`SimulationConfig::from_file`]/[`SimulationConfig::to_file`] pick the format
//! from the file extension.
//!
//! ```
//! use pft::config::{ResamplePolicy, SimulationConfig};
//!
//! let mut cfg = SimulationConfig::default();
//! cfg.num_particles = 250;
//! cfg.resampling.policy = ResamplePolicy::EffectiveSampleSize { threshold: 0.5 };
//! cfg.validate().expect("valid configuration");
//! ```
use crate::motion::{ConstantVelocity, VehicleState};
use crate::particle::ParticlePrior;
use crate::resample::ParticleResamplingStrategy;
use crate::sensor::Sensor;

use anyhow::{bail, ensure};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// Position and noise of one fixed range sensor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub position: f64,
    #[serde(default)]
    pub noise_std: f64,
}

/// When the driver rebuilds the particle set.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResamplePolicy {
    /// Resample once at least `period_s` seconds have passed since the last resample
    Interval { period_s: f64 },
    /// Resample when the effective sample size drops below `threshold * num_particles`
    EffectiveSampleSize { threshold: f64 },
}
impl Default for ResamplePolicy {
    fn default() -> Self {
        ResamplePolicy::Interval { period_s: 0.5 }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResamplingConfig {
    pub strategy: ParticleResamplingStrategy,
    pub policy: ResamplePolicy,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// off, error, warn, info, debug, trace
    pub level: String,
    /// Log file path; stderr when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}
impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Particles per set, fixed for the whole run
    pub num_particles: usize,
    /// Time step in seconds
    pub dt: f64,
    /// Simulated duration in seconds; the run makes at most `duration_s / dt` estimates
    pub duration_s: f64,
    /// Seed for the run's random number generator
    pub seed: u64,
    /// Consecutive losses tolerated before the run is aborted
    pub max_consecutive_losses: usize,
    /// Per-step CSV output path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Per-particle CSV output path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub particles_output: Option<String>,
    /// Initial true state of the vehicle
    pub vehicle: VehicleState,
    pub sensors: Vec<SensorConfig>,
    /// Prior used for initial, replacement, and recovery particles
    pub prior: ParticlePrior,
    pub motion: ConstantVelocity,
    pub resampling: ResamplingConfig,
    pub logging: LoggingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            num_particles: 1000,
            dt: 0.1,
            duration_s: 10.0,
            seed: 42,
            vehicle: VehicleState::new(0.01, 0.1, 0.01),
            sensors: vec![
                SensorConfig {
                    position: 0.25,
                    noise_std: 0.05,
                },
                SensorConfig {
                    position: 0.75,
                    noise_std: 0.06,
                },
            ],
            prior: ParticlePrior::default(),
            motion: ConstantVelocity::new(0.02),
            resampling: ResamplingConfig::default(),
            max_consecutive_losses: 100,
            logging: LoggingConfig::default(),
            output: None,
            particles_output: None,
        }
    }
}

impl SimulationConfig {
    /// Number of estimates a full-length run produces.
    pub fn max_steps(&self) -> usize {
        (self.duration_s / self.dt).round() as usize
    }

    /// Instantiate the configured sensors.
    pub fn build_sensors(&self) -> Vec<Sensor> {
        self.sensors
            .iter()
            .map(|s| Sensor::new(s.position, s.noise_std))
            .collect()
    }

    /// Check the configuration for values the filter cannot run with.
    ///
    /// A single sensor is accepted, but the posterior then stays bimodal and a warning is
    /// logged.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.num_particles > 0, "num_particles must be positive");
        ensure!(
            self.dt > 0.0 && self.dt.is_finite(),
            "dt must be positive and finite, got {}",
            self.dt
        );
        ensure!(
            self.duration_s > 0.0 && self.duration_s.is_finite(),
            "duration_s must be positive and finite, got {}",
            self.duration_s
        );
        ensure!(!self.sensors.is_empty(), "at least one sensor is required");
        for (i, sensor) in self.sensors.iter().enumerate() {
            ensure!(
                sensor.position.is_finite(),
                "sensor {i} position must be finite"
            );
            ensure!(
                sensor.noise_std >= 0.0 && sensor.noise_std.is_finite(),
                "sensor {i} noise_std must be finite and non-negative"
            );
        }
        if self.sensors.len() == 1 {
            log::warn!(
                "Only one sensor configured: range-only measurements are ambiguous and the estimate will not converge"
            );
        }
        ensure!(
            self.vehicle.x.is_finite() && self.vehicle.velocity.is_finite(),
            "vehicle state must be finite"
        );
        ensure!(
            self.vehicle.noise >= 0.0 && self.vehicle.noise.is_finite(),
            "vehicle noise must be finite and non-negative"
        );
        ensure!(
            self.prior.x_min.is_finite()
                && self.prior.x_max.is_finite()
                && self.prior.x_min < self.prior.x_max,
            "prior domain [{}, {}] is empty",
            self.prior.x_min,
            self.prior.x_max
        );
        ensure!(
            self.prior.velocity_mean.is_finite(),
            "prior velocity_mean must be finite"
        );
        ensure!(
            self.prior.velocity_std >= 0.0 && self.prior.velocity_std.is_finite(),
            "prior velocity_std must be finite and non-negative"
        );
        ensure!(
            self.prior.noise >= 0.0 && self.prior.noise.is_finite(),
            "prior noise must be finite and non-negative"
        );
        ensure!(
            self.motion.velocity_noise >= 0.0 && self.motion.velocity_noise.is_finite(),
            "motion velocity_noise must be finite and non-negative"
        );
        match self.resampling.policy {
            ResamplePolicy::Interval { period_s } if !(period_s > 0.0) => {
                bail!("resampling period_s must be positive, got {period_s}")
            }
            ResamplePolicy::EffectiveSampleSize { threshold }
                if !(threshold > 0.0 && threshold <= 1.0) =>
            {
                bail!("resampling threshold must lie in (0, 1], got {threshold}")
            }
            _ => {}
        }
        Ok(())
    }

    /// Write the configuration to a JSON file (pretty-printed).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }
    /// Read the configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as YAML.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from YAML.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as TOML.
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from TOML.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut s = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(io::Error::other)
    }
    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}
