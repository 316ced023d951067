use crate::ensemble::ParticleEnsemble;
use anyhow::Result;
use beam_common::constants::EPSILON_0;
use beam_common::Vec3;
use rand::prelude::*;
use rand::seq::SliceRandom;
use rand_distr::StandardNormal;
use std::f64::consts::PI;

/// Long-range Coulomb momentum exchange between beam particles.
///
/// Binary small-angle scattering in the Takizuka-Abe fashion: particles are
/// paired at random each application, and each pair's relative velocity is
/// deflected by a Gaussian-sampled angle whose variance follows the Spitzer
/// collision frequency. Mutates velocities only; positions are untouched.
///
/// The stage sub-steps: it applies only when `iteration` is a multiple of
/// `interval`, with the deflection variance accumulated over the skipped
/// steps. Returns the number of scattered pairs.
pub fn coulomb_collision(
    ensemble: &mut ParticleEnsemble,
    dt: f64,
    iteration: u32,
    interval: u32,
    coulomb_log: f64,
    rng: &mut StdRng,
) -> Result<u64> {
    if iteration % interval != 0 {
        return Ok(0);
    }
    let n = ensemble.len();
    if n < 2 {
        return Ok(0);
    }
    let dt_eff = dt * interval as f64;
    let density = ensemble_density(ensemble);

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);

    let mut pairs = 0u64;
    for pair in order.chunks_exact(2) {
        let (i, j) = (pair[0], pair[1]);
        let u = ensemble.velocity[i].sub(ensemble.velocity[j]);
        let u_mag = u.length();
        if u_mag < 1e-12 {
            continue;
        }
        let m_i = ensemble.masses()[i];
        let m_j = ensemble.masses()[j];
        let q_i = ensemble.charges()[i];
        let q_j = ensemble.charges()[j];
        let mu = m_i * m_j / (m_i + m_j);

        // Variance of tan(theta/2) over the accumulated interval.
        let var = (q_i * q_i * q_j * q_j * density * coulomb_log * dt_eff)
            / (8.0 * PI * EPSILON_0 * EPSILON_0 * mu * mu * u_mag * u_mag * u_mag);
        let delta: f64 = rng.sample::<f64, _>(StandardNormal) * var.sqrt();
        let sin_theta = 2.0 * delta / (1.0 + delta * delta);
        let one_minus_cos = 2.0 * delta * delta / (1.0 + delta * delta);
        let phi = 2.0 * PI * rng.random::<f64>();
        let (sin_phi, cos_phi) = phi.sin_cos();

        let u_perp = (u.x * u.x + u.y * u.y).sqrt();
        let du = if u_perp > 1e-12 * u_mag {
            Vec3::new(
                (u.x / u_perp) * u.z * sin_theta * cos_phi
                    - (u.y / u_perp) * u_mag * sin_theta * sin_phi
                    - u.x * one_minus_cos,
                (u.y / u_perp) * u.z * sin_theta * cos_phi
                    + (u.x / u_perp) * u_mag * sin_theta * sin_phi
                    - u.y * one_minus_cos,
                -u_perp * sin_theta * cos_phi - u.z * one_minus_cos,
            )
        } else {
            // Relative velocity along z; deflect off the pole directly.
            Vec3::new(
                u_mag * sin_theta * cos_phi,
                u_mag * sin_theta * sin_phi,
                -u.z * one_minus_cos,
            )
        };

        ensemble.velocity[i] = ensemble.velocity[i].add(du.scale(mu / m_i));
        ensemble.velocity[j] = ensemble.velocity[j].sub(du.scale(mu / m_j));
        pairs += 1;
    }
    Ok(pairs)
}

/// Crude local density estimate from the ensemble's bounding box.
fn ensemble_density(ensemble: &ParticleEnsemble) -> f64 {
    let mut lo = ensemble.position[0];
    let mut hi = ensemble.position[0];
    for p in &ensemble.position {
        lo = Vec3::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z));
        hi = Vec3::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z));
    }
    let extent = hi.sub(lo);
    let volume = extent.x.max(1e-6) * extent.y.max(1e-6) * extent.z.max(1e-6);
    ensemble.len() as f64 / volume
}
