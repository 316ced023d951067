use beam_common::constants::EV_TO_J;
use beam_common::Vec3;
use rand::prelude::*;
use std::f64::consts::PI;

/// Initial positions: uniform jitter inside a cube of half-width `sub_width`
/// centered on the launch point.
pub fn gen_positions(rng: &mut StdRng, launch: Vec3, sub_width: f64, n: usize) -> Vec<Vec3> {
    (0..n)
        .map(|_| {
            let jitter = Vec3::new(
                sub_width * (2.0 * rng.random::<f64>() - 1.0),
                sub_width * (2.0 * rng.random::<f64>() - 1.0),
                sub_width * (2.0 * rng.random::<f64>() - 1.0),
            );
            launch.add(jitter)
        })
        .collect()
}

/// Initial velocities: kinetic energy uniform in `energy_range_ev`, direction
/// in a polar-angle band about the beam axis with uniform azimuth.
///
/// The beam axis points from the launch point toward the device axis (the
/// beam is fired inward); a launch point on the axis itself falls back to +z.
pub fn gen_velocities(
    rng: &mut StdRng,
    launch: Vec3,
    masses: &[f64],
    energy_range_ev: [f64; 2],
    theta_range_rad: [f64; 2],
) -> Vec<Vec3> {
    let inward = Vec3::new(-launch.x, -launch.y, 0.0).normalize_or_zero();
    let axis = if inward == Vec3::zero() {
        Vec3::new(0.0, 0.0, 1.0)
    } else {
        inward
    };
    // Orthonormal frame around the beam axis.
    let mut e1 = axis.cross(Vec3::new(0.0, 0.0, 1.0));
    if e1.length_squared() < 1e-24 {
        e1 = Vec3::new(1.0, 0.0, 0.0);
    } else {
        e1 = e1.normalize_or_zero();
    }
    let e2 = axis.cross(e1);

    let [e_min, e_max] = energy_range_ev;
    let [t_min, t_max] = theta_range_rad;
    masses
        .iter()
        .map(|&mass| {
            let energy = (e_min + (e_max - e_min) * rng.random::<f64>()) * EV_TO_J;
            let speed = (2.0 * energy / mass).sqrt();
            let theta = t_min + (t_max - t_min) * rng.random::<f64>();
            let phi = 2.0 * PI * rng.random::<f64>();
            let transverse = e1.scale(phi.cos()).add(e2.scale(phi.sin()));
            axis.scale(theta.cos())
                .add(transverse.scale(theta.sin()))
                .scale(speed)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_stay_inside_the_jitter_cube() {
        let mut rng = StdRng::seed_from_u64(5);
        let launch = Vec3::new(0.25, 0.0, 0.0);
        for p in gen_positions(&mut rng, launch, 0.01, 500) {
            let d = p.sub(launch);
            assert!(d.x.abs() <= 0.01 && d.y.abs() <= 0.01 && d.z.abs() <= 0.01);
        }
    }

    #[test]
    fn velocities_respect_the_energy_range() {
        let mut rng = StdRng::seed_from_u64(5);
        let masses = vec![2.3e-25; 200];
        let velocities = gen_velocities(
            &mut rng,
            Vec3::new(0.25, 0.0, 0.0),
            &masses,
            [1.0, 20.0],
            [0.0, PI / 6.0],
        );
        for (v, &m) in velocities.iter().zip(&masses) {
            let energy_ev = 0.5 * m * v.length_squared() / EV_TO_J;
            assert!(energy_ev >= 1.0 - 1e-9 && energy_ev <= 20.0 + 1e-9);
            // Inward beam: the axis for this launch point is -x.
            let cos_theta = -v.x / v.length();
            assert!(cos_theta >= (PI / 6.0).cos() - 1e-9);
        }
    }
}
