use crate::collision::{elastic_collision, CrossSectionTable, NeutralGas};
use crate::coulomb::coulomb_collision;
use crate::ensemble::{ParticleEnsemble, SyncPhase};
use crate::fields::FieldInterpolator;
use crate::tracker::TrajectoryTracker;
use anyhow::Result;
use beam_common::config::{CollisionConfig, SimulationConfig};
use beam_common::{SpeciesLayout, TrajectoryRecord};
use log::{debug, info, warn};
use rand::prelude::*;
use std::time::Instant;

/// Progress of the driver through its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Collaborators validated and loaded; the half-step offset has not been
    /// applied yet.
    Initialized,
    /// The single backward half-step velocity offset has been applied.
    HalfStepOffset,
    Running,
    Complete,
}

/// Orchestrates the per-step stage ordering over a fixed iteration count:
/// push, field resample, collisions, periodic trajectory capture.
///
/// The driver exclusively owns the mutable ensemble and the run's random
/// generator; stages receive both explicitly, so a seed reproduces a run.
pub struct SimulationDriver {
    dt: f64,
    iterations: u32,
    capture_interval: u32,
    collisions: CollisionConfig,
    ensemble: ParticleEnsemble,
    layout: SpeciesLayout,
    gas: NeutralGas,
    sigma: CrossSectionTable,
    electric: Box<dyn FieldInterpolator>,
    magnetic: Box<dyn FieldInterpolator>,
    rng: StdRng,
    tracker: TrajectoryTracker,
    state: DriverState,
    collision_total: u64,
    saturation_warned: bool,
}

impl SimulationDriver {
    /// Validates the assembled collaborators and enters `Initialized`.
    ///
    /// Everything checked here is a configuration error: cohort layout
    /// coverage, array alignment, cross-section column bounds. None of it
    /// can be detected later without corrupting a running simulation.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &SimulationConfig,
        ensemble: ParticleEnsemble,
        layout: SpeciesLayout,
        gas: NeutralGas,
        sigma: CrossSectionTable,
        electric: Box<dyn FieldInterpolator>,
        magnetic: Box<dyn FieldInterpolator>,
        rng: StdRng,
    ) -> Result<Self> {
        config.validate()?;
        layout.validate()?;
        if layout.n_total != ensemble.len() {
            anyhow::bail!(
                "species layout covers {} particles but the ensemble holds {}",
                layout.n_total,
                ensemble.len()
            );
        }
        if ensemble.phase() != SyncPhase::Unsynced {
            anyhow::bail!("ensemble velocities are already half-step offset");
        }
        for cohort in layout.cohorts() {
            if cohort.sigma_column == 0 || cohort.sigma_column > sigma.num_columns() {
                anyhow::bail!(
                    "cohort '{}' references cross-section column {} but the table has columns 1..={}",
                    cohort.name,
                    cohort.sigma_column,
                    sigma.num_columns()
                );
            }
        }
        Ok(Self {
            dt: config.timing.dt_s,
            iterations: config.timing.iterations,
            capture_interval: config.timing.capture_interval,
            collisions: config.collisions.clone(),
            ensemble,
            layout,
            gas,
            sigma,
            electric,
            magnetic,
            rng,
            tracker: TrajectoryTracker::new(),
            state: DriverState::Initialized,
            collision_total: 0,
            saturation_warned: false,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn ensemble(&self) -> &ParticleEnsemble {
        &self.ensemble
    }

    /// The trajectory captured so far; on a fatal mid-run error everything
    /// recorded up to the failing step is still here.
    pub fn tracker(&self) -> &TrajectoryTracker {
        &self.tracker
    }

    /// Runs the full simulation: one backward half-step velocity offset,
    /// then `iterations` ordered steps.
    pub fn run(&mut self) -> Result<()> {
        if self.state != DriverState::Initialized {
            anyhow::bail!("driver has already run");
        }

        // Prime the field caches at the initial positions so the offset kick
        // sees the fields of step 0.
        self.ensemble.refresh_electric_field(&*self.electric)?;
        self.ensemble.refresh_magnetic_field(&*self.magnetic)?;
        self.ensemble.offset_half_step(self.dt)?;
        self.state = DriverState::HalfStepOffset;

        info!(
            "Starting simulation loop: {} particles, {} steps, dt = {:.3e} s",
            self.ensemble.len(),
            self.iterations,
            self.dt
        );
        self.state = DriverState::Running;
        let start = Instant::now();
        let mut previous_print_time = start;

        for it in 0..self.iterations {
            self.step(it)?;

            let now = Instant::now();
            let is_last = it + 1 == self.iterations;
            if now.duration_since(previous_print_time).as_secs_f64() >= 5.0 || is_last {
                info!(
                    "Step [{}/{}] | t = {:.4e} s | collisions: {} | elapsed: {:.2} s",
                    it + 1,
                    self.iterations,
                    (it + 1) as f64 * self.dt,
                    self.collision_total,
                    start.elapsed().as_secs_f64()
                );
                previous_print_time = now;
            }
        }

        self.state = DriverState::Complete;
        info!(
            "Simulation finished in {:.3} s: {} captures, {} gas collisions.",
            start.elapsed().as_secs_f64(),
            self.tracker.num_frames(),
            self.collision_total
        );
        Ok(())
    }

    /// One iteration in the fixed stage order: position push, electric then
    /// magnetic field resample at the new positions, elastic collisions,
    /// optional Coulomb collisions, periodic capture.
    fn step(&mut self, it: u32) -> Result<()> {
        self.ensemble.push(self.dt);
        self.ensemble.refresh_electric_field(&*self.electric)?;
        self.ensemble.refresh_magnetic_field(&*self.magnetic)?;

        if self.collisions.enable_elastic {
            let stats = elastic_collision(
                &mut self.ensemble,
                &self.layout,
                &self.gas,
                &self.sigma,
                self.dt,
                &mut self.rng,
            )?;
            self.collision_total += stats.collisions;
            if stats.saturated > 0 && !self.saturation_warned {
                warn!(
                    "Collision probability saturated for {} particle(s) at step {}; \
                     dt is likely oversized for the cross-section magnitude.",
                    stats.saturated, it
                );
                self.saturation_warned = true;
            }
        }

        if self.collisions.enable_coulomb {
            let pairs = coulomb_collision(
                &mut self.ensemble,
                self.dt,
                it,
                self.collisions.coulomb_interval,
                self.collisions.coulomb_log,
                &mut self.rng,
            )?;
            if pairs > 0 {
                debug!("Coulomb stage scattered {} pairs at step {}", pairs, it);
            }
        }

        if it % self.capture_interval == 0 {
            self.tracker.track(it, &self.ensemble);
            debug!(
                "Captured trajectory frame {} at step {}",
                self.tracker.num_frames(),
                it
            );
        }
        Ok(())
    }

    /// Consumes the driver and finalizes the trajectory record.
    pub fn into_record(self) -> TrajectoryRecord {
        self.tracker
            .into_record(self.dt, self.capture_interval, self.layout)
    }
}
