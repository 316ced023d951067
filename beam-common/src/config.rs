use crate::species::SpeciesLayout;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// Beam composition and launch conditions, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BeamConfig {
    /// Total particle count; split evenly among species groups and isotopes.
    pub n_total: usize,
    /// Launch point of the beam [m].
    pub launch_point: [f64; 3],
    /// Half-width of the uniform position jitter cube around the launch point [m].
    pub sub_width: f64,
    /// Initial kinetic energy range [eV].
    pub energy_range_ev: [f64; 2],
    /// Polar-angle band of launch directions about the inward beam axis [rad].
    pub theta_range_rad: [f64; 2],
    /// Particle charge in elementary charges.
    #[serde(default = "default_charge_e")]
    pub charge_e: f64,
    pub species: Vec<SpeciesGroupConfig>,
}

// One top-level species group; each listed molar mass becomes a cohort.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SpeciesGroupConfig {
    pub name: String,
    /// Molar masses [kg/mol]; per-particle mass is molar / N_A.
    pub molar_masses_kg: Vec<f64>,
    /// Cross-section table column per isotope, parallel to molar_masses_kg.
    pub sigma_columns: Vec<usize>,
}

// Background neutral gas descriptor; immutable for the run.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GasConfig {
    pub name: String,
    pub temperature_k: f64,
    /// Number density [1/m^3].
    pub density_m3: f64,
    /// Molecular mass [kg].
    pub mass_kg: f64,
    /// CSV cross-section table for this gas (energy_ev, sigma columns).
    pub cross_sections: PathBuf,
}

/// Where a field interpolator gets its data.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldSource {
    /// Constant field over all space; handy for vacuum and test runs.
    Uniform { value: [f64; 3] },
    /// Radially symmetric field tabulated as (r, f_r) rows.
    RadialCsv { path: PathBuf },
    /// 3-D field tabulated as (x, y, z, fx, fy, fz) rows on a regular grid.
    GridCsv {
        path: PathBuf,
        #[serde(default = "default_field_scale")]
        scale: f64,
    },
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FieldsConfig {
    pub electric: FieldSource,
    pub magnetic: FieldSource,
}

// Configuration for timing and the random stream
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    /// Integration timestep [s].
    pub dt_s: f64,
    /// Number of leapfrog iterations to run.
    pub iterations: u32,
    /// Trajectory capture interval in steps.
    #[serde(default = "default_capture_interval")]
    pub capture_interval: u32,
    /// Seed for the run's single random generator.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CollisionConfig {
    #[serde(default = "default_true")]
    pub enable_elastic: bool,
    /// Long-range Coulomb scattering between beam particles; off by default.
    #[serde(default)]
    pub enable_coulomb: bool,
    /// Apply the Coulomb stage every this many steps.
    #[serde(default = "default_coulomb_interval")]
    pub coulomb_interval: u32,
    /// Coulomb logarithm used by the pairwise deflection model.
    #[serde(default = "default_coulomb_log")]
    pub coulomb_log: f64,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        CollisionConfig {
            enable_elastic: true,
            enable_coulomb: false,
            coulomb_interval: default_coulomb_interval(),
            coulomb_log: default_coulomb_log(),
        }
    }
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    #[serde(default = "default_true")]
    pub save_trajectory: bool,
    #[serde(default)]
    pub save_final_positions: bool,
    /// Trajectory format: "json", "bincode", "messagepack"
    pub format: Option<String>,
}

fn default_charge_e() -> f64 {
    1.0
}

fn default_field_scale() -> f64 {
    1.0
}

fn default_capture_interval() -> u32 {
    100
}

fn default_seed() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

fn default_coulomb_interval() -> u32 {
    10
}

fn default_coulomb_log() -> f64 {
    10.0
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub beam: BeamConfig,
    pub gas: GasConfig,
    pub fields: FieldsConfig,
    pub timing: TimingConfig,
    #[serde(default)]
    pub collisions: CollisionConfig,
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e)
        })?;
        let config: SimulationConfig = toml::from_str(&config_str).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from '{}': {}", path_ref.display(), e)
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Pre-run configuration checks; anything caught here is fatal before
    /// the driver is even constructed.
    pub fn validate(&self) -> Result<()> {
        if self.timing.dt_s <= 0.0 || !self.timing.dt_s.is_finite() {
            anyhow::bail!("dt_s must be positive and finite.");
        }
        if self.timing.iterations == 0 {
            anyhow::bail!("iterations must be greater than 0.");
        }
        if self.timing.capture_interval == 0 {
            anyhow::bail!("capture_interval must be greater than 0.");
        }
        if self.beam.sub_width < 0.0 {
            anyhow::bail!("sub_width must not be negative.");
        }
        let [e_min, e_max] = self.beam.energy_range_ev;
        if e_min < 0.0 || e_max < e_min {
            anyhow::bail!("energy_range_ev must be ordered and non-negative.");
        }
        let [t_min, t_max] = self.beam.theta_range_rad;
        if t_min < 0.0 || t_max < t_min || t_max > std::f64::consts::PI {
            anyhow::bail!("theta_range_rad must be an ordered band within [0, pi].");
        }
        if self.gas.temperature_k <= 0.0 {
            anyhow::bail!("gas temperature_k must be positive.");
        }
        if self.gas.density_m3 < 0.0 {
            anyhow::bail!("gas density_m3 must not be negative.");
        }
        if self.gas.mass_kg <= 0.0 {
            anyhow::bail!("gas mass_kg must be positive.");
        }
        if self.collisions.coulomb_interval == 0 {
            anyhow::bail!("coulomb_interval must be greater than 0.");
        }
        // Divisibility among species cohorts is checked by the layout build.
        self.species_layout().map(|_| ())
    }

    /// Builds the explicit species-cohort layout from the beam section.
    pub fn species_layout(&self) -> Result<SpeciesLayout> {
        SpeciesLayout::from_groups(self.beam.n_total, self.beam.charge_e, &self.beam.species)
    }
}
