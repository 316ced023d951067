use crate::fields::FieldInterpolator;
use anyhow::Result;
use beam_common::Vec3;
use rayon::prelude::*;

/// Integration phase of the ensemble's velocity array relative to its
/// position array. The leapfrog stagger is established exactly once per run;
/// encoding it as state makes the precondition checkable instead of
/// convention-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Positions and velocities refer to the same instant.
    Unsynced,
    /// Velocities trail positions by half a timestep.
    HalfStepOffset,
}

/// The particle swarm as one mutable structure-of-arrays aggregate.
///
/// All arrays share the same length for the ensemble's lifetime; index i in
/// every array refers to the same physical particle, and no stage permutes
/// indices.
#[derive(Debug, Clone)]
pub struct ParticleEnsemble {
    mass: Vec<f64>,
    charge: Vec<f64>,
    pub position: Vec<Vec3>,
    pub velocity: Vec<Vec3>,
    /// Cached field samples at each particle's current position; refreshed
    /// once per step after the position push.
    pub electric_field: Vec<Vec3>,
    pub magnetic_field: Vec<Vec3>,
    phase: SyncPhase,
}

impl ParticleEnsemble {
    pub fn new(
        mass: Vec<f64>,
        charge: Vec<f64>,
        position: Vec<Vec3>,
        velocity: Vec<Vec3>,
    ) -> Result<Self> {
        let n = mass.len();
        if n == 0 {
            anyhow::bail!("ensemble must contain at least one particle");
        }
        if charge.len() != n || position.len() != n || velocity.len() != n {
            anyhow::bail!(
                "ensemble array lengths disagree: mass {}, charge {}, position {}, velocity {}",
                n,
                charge.len(),
                position.len(),
                velocity.len()
            );
        }
        if mass.iter().any(|&m| m <= 0.0 || !m.is_finite()) {
            anyhow::bail!("every particle mass must be positive and finite");
        }
        Ok(Self {
            mass,
            charge,
            position,
            velocity,
            electric_field: vec![Vec3::zero(); n],
            magnetic_field: vec![Vec3::zero(); n],
            phase: SyncPhase::Unsynced,
        })
    }

    pub fn len(&self) -> usize {
        self.mass.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mass.is_empty()
    }

    pub fn masses(&self) -> &[f64] {
        &self.mass
    }

    pub fn charges(&self) -> &[f64] {
        &self.charge
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Kinetic energy of particle i [J].
    pub fn kinetic_energy(&self, i: usize) -> f64 {
        0.5 * self.mass[i] * self.velocity[i].length_squared()
    }

    /// Advances every velocity by `dt` under the Lorentz force
    /// `F = q (E + v x B)` evaluated at the cached field samples, with v
    /// taken before the kick.
    ///
    /// Called once with `-0.5 * dt` to establish the leapfrog stagger; the
    /// same kick drives the per-step velocity update inside [`Self::push`].
    pub fn vel_push(&mut self, dt: f64) {
        for i in 0..self.mass.len() {
            let v = self.velocity[i];
            let accel = self.electric_field[i]
                .add(v.cross(self.magnetic_field[i]))
                .scale(self.charge[i] / self.mass[i]);
            self.velocity[i] = v.add(accel.scale(dt));
        }
    }

    /// Offsets velocities backward by half a step, moving the ensemble into
    /// the staggered phase. Rejected when the stagger is already established:
    /// a second offset would break time-centering.
    pub fn offset_half_step(&mut self, step_dt: f64) -> Result<()> {
        if self.phase == SyncPhase::HalfStepOffset {
            anyhow::bail!("half-step velocity offset was already applied");
        }
        self.vel_push(-0.5 * step_dt);
        self.phase = SyncPhase::HalfStepOffset;
        Ok(())
    }

    /// One full leapfrog step: velocity kick from the cached fields (sampled
    /// at position n), then position drift with the half-step-centered
    /// velocity. With zero fields this reduces to exact straight-line motion.
    pub fn push(&mut self, dt: f64) {
        self.vel_push(dt);
        for i in 0..self.position.len() {
            self.position[i] = self.position[i].add(self.velocity[i].scale(dt));
        }
    }

    /// Re-evaluates the electric field at every particle's current position,
    /// overwriting the cached samples. A particle outside the interpolator's
    /// domain fails the step.
    pub fn refresh_electric_field(&mut self, interp: &dyn FieldInterpolator) -> Result<()> {
        let sampled: Result<Vec<Vec3>> =
            self.position.par_iter().map(|&p| interp.sample(p)).collect();
        self.electric_field = sampled?;
        Ok(())
    }

    /// Magnetic counterpart of [`Self::refresh_electric_field`].
    pub fn refresh_magnetic_field(&mut self, interp: &dyn FieldInterpolator) -> Result<()> {
        let sampled: Result<Vec<Vec3>> =
            self.position.par_iter().map(|&p| interp.sample(p)).collect();
        self.magnetic_field = sampled?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_particle(velocity: Vec3) -> ParticleEnsemble {
        ParticleEnsemble::new(
            vec![1.0e-25],
            vec![1.602e-19],
            vec![Vec3::zero()],
            vec![velocity],
        )
        .unwrap()
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let bad = ParticleEnsemble::new(
            vec![1.0, 1.0],
            vec![1.0],
            vec![Vec3::zero(); 2],
            vec![Vec3::zero(); 2],
        );
        assert!(bad.is_err());
    }

    #[test]
    fn repeated_half_step_offset_is_rejected() {
        let mut ensemble = single_particle(Vec3::new(100.0, 0.0, 0.0));
        assert_eq!(ensemble.phase(), SyncPhase::Unsynced);
        ensemble.offset_half_step(1e-8).unwrap();
        assert_eq!(ensemble.phase(), SyncPhase::HalfStepOffset);
        assert!(ensemble.offset_half_step(1e-8).is_err());
    }

    #[test]
    fn zero_field_push_is_ballistic() {
        let v0 = Vec3::new(250.0, -40.0, 3.0);
        let mut ensemble = single_particle(v0);
        let dt = 1e-6;
        for _ in 0..100 {
            ensemble.push(dt);
        }
        let expected = v0.scale(100.0 * dt);
        assert!(ensemble.position[0].sub(expected).length() < 1e-12);
        assert_eq!(ensemble.velocity[0], v0);
    }

    #[test]
    fn electric_kick_matches_qm_acceleration() {
        let mut ensemble = single_particle(Vec3::zero());
        ensemble.electric_field[0] = Vec3::new(0.0, 0.0, 5.0);
        let dt = 2e-7;
        ensemble.vel_push(dt);
        let expected = 1.602e-19 / 1.0e-25 * 5.0 * dt;
        assert!((ensemble.velocity[0].z - expected).abs() < expected.abs() * 1e-12);
    }
}
