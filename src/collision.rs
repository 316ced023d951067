use crate::ensemble::ParticleEnsemble;
use anyhow::{Context, Result};
use beam_common::config::GasConfig;
use beam_common::constants::{EV_TO_J, K_BOLTZMANN};
use beam_common::{SpeciesLayout, Vec3};
use rand::prelude::*;
use rand_distr::Normal;
use std::f64::consts::PI;
use std::path::Path;

/// Background neutral gas descriptor; immutable for the run.
#[derive(Debug, Clone)]
pub struct NeutralGas {
    pub name: String,
    /// Temperature [K].
    pub temperature: f64,
    /// Number density [1/m^3].
    pub density: f64,
    /// Molecular mass [kg].
    pub mass: f64,
}

impl NeutralGas {
    pub fn from_config(config: &GasConfig) -> Self {
        Self {
            name: config.name.clone(),
            temperature: config.temperature_k,
            density: config.density_m3,
            mass: config.mass_kg,
        }
    }

    /// Per-component thermal velocity spread of the gas molecules [m/s].
    pub fn thermal_sigma(&self) -> f64 {
        (K_BOLTZMANN * self.temperature / self.mass).sqrt()
    }
}

/// Tabulated collision cross-sections versus kinetic energy, one column per
/// process/species pairing against the background gas.
///
/// Lookups interpolate linearly inside the tabulated energy grid and
/// extrapolate linearly from the end segments outside it; interpolated
/// values are clamped to >= 0. The policy is deterministic, so a given
/// high-energy tail always sees the same probabilities.
#[derive(Debug, Clone)]
pub struct CrossSectionTable {
    /// Ascending energy grid [eV].
    energies: Vec<f64>,
    /// columns[j] holds file column j+1 (column 0 is the energy grid).
    columns: Vec<Vec<f64>>,
}

impl CrossSectionTable {
    pub fn new(energies: Vec<f64>, columns: Vec<Vec<f64>>) -> Result<Self> {
        if energies.len() < 2 {
            anyhow::bail!("cross-section table needs at least two energy rows");
        }
        if energies.windows(2).any(|w| w[1] <= w[0]) {
            anyhow::bail!("cross-section energy grid must be strictly ascending");
        }
        if columns.is_empty() || columns.iter().any(|c| c.len() != energies.len()) {
            anyhow::bail!("cross-section columns must all match the energy grid length");
        }
        Ok(Self { energies, columns })
    }

    /// Loads a headerless CSV table whose first column is energy [eV] and
    /// whose remaining columns are cross-sections. Lines starting with '#'
    /// are ignored.
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .from_path(path)
            .with_context(|| format!("Failed to open cross-section table '{}'", path.display()))?;

        let mut energies = Vec::new();
        let mut columns: Vec<Vec<f64>> = Vec::new();
        for record in reader.records() {
            let record =
                record.with_context(|| format!("Malformed row in '{}'", path.display()))?;
            let mut fields = record.iter().map(|f| {
                f.trim()
                    .parse::<f64>()
                    .with_context(|| format!("Non-numeric value '{}' in '{}'", f, path.display()))
            });
            let energy = fields
                .next()
                .ok_or_else(|| anyhow::anyhow!("Empty row in '{}'", path.display()))??;
            let values = fields.collect::<Result<Vec<f64>>>()?;
            if columns.is_empty() {
                columns = vec![Vec::new(); values.len()];
            } else if values.len() != columns.len() {
                anyhow::bail!("Ragged row in '{}'", path.display());
            }
            energies.push(energy);
            for (col, v) in columns.iter_mut().zip(values) {
                col.push(v);
            }
        }
        Self::new(energies, columns)
            .with_context(|| format!("Invalid cross-section table '{}'", path.display()))
    }

    /// Number of cross-section columns (excluding the energy column).
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Cross-section [m^2] of file column `column` (1-based, column 0 being
    /// energy) at `energy_ev`. The column index must have been validated
    /// against [`Self::num_columns`].
    pub fn sigma(&self, column: usize, energy_ev: f64) -> f64 {
        debug_assert!(column >= 1 && column <= self.columns.len());
        let col = &self.columns[column - 1];
        let e = &self.energies;
        let hi = e.partition_point(|&x| x < energy_ev).clamp(1, e.len() - 1);
        let lo = hi - 1;
        let t = (energy_ev - e[lo]) / (e[hi] - e[lo]);
        (col[lo] + t * (col[hi] - col[lo])).max(0.0)
    }
}

/// Per-step collision probability from the null-collision frequency
/// `nu = n_gas * sigma(E) * g`.
#[inline(always)]
pub fn collision_probability(density: f64, sigma: f64, rel_speed: f64, dt: f64) -> f64 {
    1.0 - (-density * sigma * rel_speed * dt).exp()
}

/// Outcome counters of one elastic-stage application.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElasticStats {
    pub collisions: u64,
    /// Particles whose expected collision count nu*dt reached 1; a non-zero
    /// value hints that dt is oversized for the cross-section magnitude.
    pub saturated: u64,
}

/// Monte-Carlo elastic collisions of every beam particle against the
/// background gas.
///
/// Per particle: look up its cohort's cross-section at the current kinetic
/// energy, draw a Maxwellian gas partner, roll the null-collision
/// probability, and on a hit rotate the relative velocity isotropically in
/// the center-of-mass frame. Mutates only the velocity array, in place.
pub fn elastic_collision(
    ensemble: &mut ParticleEnsemble,
    layout: &SpeciesLayout,
    gas: &NeutralGas,
    table: &CrossSectionTable,
    dt: f64,
    rng: &mut StdRng,
) -> Result<ElasticStats> {
    let maxwell = Normal::new(0.0, gas.thermal_sigma())?;
    let mut stats = ElasticStats::default();

    // Cross-section selection is per cohort range, never per-particle mass
    // comparison.
    for cohort in layout.cohorts() {
        for i in cohort.range() {
            let v = ensemble.velocity[i];
            let mass = ensemble.masses()[i];
            let energy_ev = 0.5 * mass * v.length_squared() / EV_TO_J;
            let sigma = table.sigma(cohort.sigma_column, energy_ev);

            let partner = Vec3::new(
                rng.sample(maxwell),
                rng.sample(maxwell),
                rng.sample(maxwell),
            );
            let rel_speed = v.sub(partner).length();
            if gas.density * sigma * rel_speed * dt >= 1.0 {
                stats.saturated += 1;
            }
            let p = collision_probability(gas.density, sigma, rel_speed, dt);
            if rng.random::<f64>() < p {
                ensemble.velocity[i] = scatter_elastic(v, partner, mass, gas.mass, rng);
                stats.collisions += 1;
            }
        }
    }
    Ok(stats)
}

/// Post-collision velocity from isotropic two-body elastic kinematics.
///
/// The relative velocity is rotated by Euler angles with an isotropic
/// scattering angle; its magnitude is preserved, so the pair's total kinetic
/// energy is conserved and the projectile's share follows the mass ratio.
pub fn scatter_elastic(v: Vec3, partner: Vec3, mass: f64, gas_mass: f64, rng: &mut StdRng) -> Vec3 {
    let g = v.sub(partner);
    let g_mag = g.length();
    if g_mag < 1e-30 {
        return v;
    }
    let com = v.scale(mass).add(partner.scale(gas_mass)).scale(1.0 / (mass + gas_mass));

    // Orientation of the incoming relative velocity.
    let theta = (g.y * g.y + g.z * g.z).sqrt().atan2(g.x);
    let phi = g.z.atan2(g.y);
    // Isotropic scattering angle, uniform azimuth.
    let chi = (1.0 - 2.0 * rng.random::<f64>()).acos();
    let eta = 2.0 * PI * rng.random::<f64>();

    let (sc, cc) = chi.sin_cos();
    let (se, ce) = eta.sin_cos();
    let (st, ct) = theta.sin_cos();
    let (sp, cp) = phi.sin_cos();

    let rotated = Vec3::new(
        ct * cc - st * sc * ce,
        st * cp * cc + ct * cp * sc * ce - sp * sc * se,
        st * sp * cc + ct * sp * sc * ce + cp * sc * se,
    )
    .scale(g_mag);

    com.add(rotated.scale(gas_mass / (mass + gas_mass)))
}
