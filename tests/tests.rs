use beam_common::config::{
    BeamConfig, CollisionConfig, FieldSource, FieldsConfig, GasConfig, OutputConfig,
    SimulationConfig, SpeciesGroupConfig, TimingConfig,
};
use beam_common::Vec3;
use beam_engine::collision::{CrossSectionTable, NeutralGas};
use beam_engine::driver::{DriverState, SimulationDriver};
use beam_engine::ensemble::ParticleEnsemble;
use beam_engine::fields::{RadialFieldInterpolation, UniformField};
use rand::prelude::*;

/// Build a full configuration around the given species groups; fields are
/// uniform and zero unless the test swaps them out.
fn test_config(
    n_total: usize,
    iterations: u32,
    species: Vec<SpeciesGroupConfig>,
    enable_elastic: bool,
    gas_density: f64,
) -> SimulationConfig {
    SimulationConfig {
        beam: BeamConfig {
            n_total,
            launch_point: [0.25, 0.0, 0.0],
            sub_width: 0.01,
            energy_range_ev: [1.0, 20.0],
            theta_range_rad: [0.0, std::f64::consts::FRAC_PI_6],
            charge_e: 1.0,
            species,
        },
        gas: GasConfig {
            name: "Ar".into(),
            temperature_k: 300.0,
            density_m3: gas_density,
            mass_kg: 6.6335209e-26,
            cross_sections: "unused.csv".into(),
        },
        fields: FieldsConfig {
            electric: FieldSource::Uniform { value: [0.0; 3] },
            magnetic: FieldSource::Uniform { value: [0.0; 3] },
        },
        timing: TimingConfig {
            dt_s: 1e-8,
            iterations,
            capture_interval: 100,
            seed: 42,
        },
        collisions: CollisionConfig {
            enable_elastic,
            enable_coulomb: false,
            coulomb_interval: 10,
            coulomb_log: 10.0,
        },
        output: OutputConfig {
            base_filename: "test".into(),
            save_trajectory: false,
            save_final_positions: false,
            format: None,
        },
    }
}

fn single_species(name: &str, molar_mass: f64) -> SpeciesGroupConfig {
    SpeciesGroupConfig {
        name: name.into(),
        molar_masses_kg: vec![molar_mass],
        sigma_columns: vec![1],
    }
}

fn three_group_species() -> Vec<SpeciesGroupConfig> {
    vec![
        SpeciesGroupConfig {
            name: "uranium".into(),
            molar_masses_kg: vec![0.235, 0.238, 0.239, 0.240],
            sigma_columns: vec![1, 1, 2, 2],
        },
        single_species("cesium", 0.137),
        SpeciesGroupConfig {
            name: "strontium".into(),
            molar_masses_kg: vec![0.090],
            sigma_columns: vec![4],
        },
    ]
}

/// Flat cross-section table with the given number of columns.
fn flat_table(columns: usize, sigma: f64) -> CrossSectionTable {
    CrossSectionTable::new(vec![0.0, 1.0e6], vec![vec![sigma; 2]; columns]).unwrap()
}

fn zero_field() -> Box<UniformField> {
    Box::new(UniformField::new(Vec3::zero()))
}

/// Ensemble with explicit positions/velocities matching a config's layout.
fn build_driver(
    config: &SimulationConfig,
    positions: Vec<Vec3>,
    velocities: Vec<Vec3>,
    table: CrossSectionTable,
) -> SimulationDriver {
    let layout = config.species_layout().unwrap();
    let ensemble =
        ParticleEnsemble::new(layout.masses(), layout.charges(), positions, velocities).unwrap();
    SimulationDriver::new(
        config,
        ensemble,
        layout,
        NeutralGas::from_config(&config.gas),
        table,
        zero_field(),
        zero_field(),
        StdRng::seed_from_u64(config.timing.seed),
    )
    .unwrap()
}

// ==================================================================================
// Integrator properties
// ==================================================================================

#[test]
fn zero_field_collisionless_motion_is_ballistic() {
    let config = test_config(4, 1000, vec![single_species("test", 0.235)], false, 0.0);
    let dt = config.timing.dt_s;
    let p0 = Vec3::new(0.25, 0.0, 0.0);
    let v0 = Vec3::new(-120.0, 35.0, 4.0);
    let mut driver = build_driver(&config, vec![p0; 4], vec![v0; 4], flat_table(4, 0.0));

    driver.run().unwrap();
    assert_eq!(driver.state(), DriverState::Complete);

    // Frame k was captured at iteration k*100, i.e. after k*100 + 1 pushes.
    let record = driver.into_record();
    for (frame, &step) in record.frames.iter().zip(record.captured_steps.iter()) {
        let t = (step + 1) as f64 * dt;
        let expected = p0.add(v0.scale(t));
        for p in frame {
            assert!(p.sub(expected).length() < 1e-12, "step {}: {:?}", step, p);
        }
    }
    assert_eq!(record.frames.last().unwrap().len(), 4);
}

#[test]
fn push_kick_reproduces_a_full_vel_push() {
    let layout = test_config(1, 1, vec![single_species("test", 0.235)], false, 0.0)
        .species_layout()
        .unwrap();
    let v0 = Vec3::new(500.0, 0.0, -200.0);
    let mut staggered = ParticleEnsemble::new(
        layout.masses(),
        layout.charges(),
        vec![Vec3::zero()],
        vec![v0],
    )
    .unwrap();
    let mut reference = staggered.clone();

    let e = Vec3::new(30.0, -10.0, 5.0);
    let b = Vec3::new(0.0, 0.0, 0.02);
    staggered.electric_field[0] = e;
    staggered.magnetic_field[0] = b;
    reference.electric_field[0] = e;
    reference.magnetic_field[0] = b;

    let dt = 1e-8;
    staggered.offset_half_step(dt).unwrap();
    staggered.push(dt);

    reference.vel_push(-0.5 * dt);
    reference.vel_push(dt);

    // The kick inside push is exactly one vel_push(dt) from the offset
    // velocity, so the staggered sequence is reproduced bit for bit.
    assert_eq!(staggered.velocity[0], reference.velocity[0]);
}

// ==================================================================================
// Collision stage properties
// ==================================================================================

#[test]
fn stages_preserve_mass_charge_alignment() {
    let species = vec![single_species("heavy", 0.238), single_species("light", 0.090)];
    let config = test_config(8, 300, species, true, 1e21);
    let layout = config.species_layout().unwrap();
    let expected_masses = layout.masses();
    let expected_charges = layout.charges();

    let positions = (0..8).map(|i| Vec3::new(i as f64, 0.0, 0.0)).collect();
    let velocities = vec![Vec3::new(3000.0, 100.0, -250.0); 8];
    let mut driver = build_driver(&config, positions, velocities, flat_table(4, 1e-18));
    driver.run().unwrap();

    let ensemble = driver.ensemble();
    assert_eq!(ensemble.masses(), expected_masses.as_slice());
    assert_eq!(ensemble.charges(), expected_charges.as_slice());
    assert!(ensemble.velocity.iter().all(|v| v.length().is_finite()));
}

#[test]
fn cold_gas_collisions_never_gain_energy() {
    let mut config = test_config(6, 500, vec![single_species("test", 0.235)], true, 1e21);
    // Effectively resting gas molecules: no thermal energy to pick up.
    config.gas.temperature_k = 1e-9;

    let layout = config.species_layout().unwrap();
    let v0 = Vec3::new(4000.0, -500.0, 800.0);
    let initial_energy = 0.5 * layout.masses()[0] * v0.length_squared();

    let positions = vec![Vec3::zero(); 6];
    let mut driver = build_driver(&config, positions, vec![v0; 6], flat_table(4, 1e-18));
    driver.run().unwrap();

    let ensemble = driver.ensemble();
    for i in 0..ensemble.len() {
        assert!(ensemble.kinetic_energy(i) <= initial_energy * (1.0 + 1e-9));
    }
}

#[test]
fn identical_seeds_reproduce_a_run_exactly() {
    let run = || {
        let config = test_config(12, 400, vec![single_species("test", 0.137)], true, 1e21);
        let positions = (0..12).map(|i| Vec3::new(0.0, i as f64 * 0.01, 0.0)).collect();
        let velocities = vec![Vec3::new(2500.0, -300.0, 90.0); 12];
        let mut driver = build_driver(&config, positions, velocities, flat_table(4, 1e-18));
        driver.run().unwrap();
        (
            driver.ensemble().position.clone(),
            driver.ensemble().velocity.clone(),
        )
    };
    let (pos_a, vel_a) = run();
    let (pos_b, vel_b) = run();
    assert_eq!(pos_a, pos_b);
    assert_eq!(vel_a, vel_b);
}

// ==================================================================================
// Tracker and cohort properties
// ==================================================================================

#[test]
fn capture_cadence_yields_it_num_over_k_frames() {
    let config = test_config(5, 1000, vec![single_species("test", 0.235)], false, 0.0);
    let positions = vec![Vec3::zero(); 5];
    let velocities = vec![Vec3::new(10.0, 0.0, 0.0); 5];
    let mut driver = build_driver(&config, positions, velocities, flat_table(4, 0.0));
    driver.run().unwrap();

    let record = driver.into_record();
    assert_eq!(record.num_frames(), 10);
    let expected_steps: Vec<u32> = (0..10).map(|k| k * 100).collect();
    assert_eq!(record.captured_steps, expected_steps);
    assert!(record.frames.iter().all(|f| f.len() == 5));
}

#[test]
fn species_cohorts_round_trip_through_the_record() {
    let config = test_config(120, 1, three_group_species(), false, 0.0);
    let positions = vec![Vec3::zero(); 120];
    let velocities = vec![Vec3::new(10.0, 0.0, 0.0); 120];
    let mut driver = build_driver(&config, positions, velocities, flat_table(4, 0.0));
    driver.run().unwrap();

    let record = driver.into_record();
    let counts: Vec<usize> = record.layout.cohorts().map(|c| c.count).collect();
    assert_eq!(counts, vec![10, 10, 10, 10, 40, 40]);

    // Group spans partition 0..120 without overlap or omission.
    let mut covered = 0usize;
    for group in &record.layout.groups {
        let span = group.span();
        assert_eq!(span.start, covered);
        covered = span.end;
    }
    assert_eq!(covered, 120);
    assert_eq!(record.num_particles(), 120);
}

// ==================================================================================
// Error handling
// ==================================================================================

#[test]
fn leaving_the_field_domain_aborts_but_keeps_the_trajectory() {
    let mut config = test_config(1, 1000, vec![single_species("test", 0.235)], false, 0.0);
    config.timing.dt_s = 1e-3;

    let layout = config.species_layout().unwrap();
    let ensemble = ParticleEnsemble::new(
        layout.masses(),
        layout.charges(),
        vec![Vec3::new(0.5, 0.0, 0.0)],
        // Crosses r = 1 (the domain edge) around step 148.
        vec![Vec3::new(3.4, 0.0, 0.0)],
    )
    .unwrap();
    let radial = RadialFieldInterpolation::new(vec![0.0, 1.0], vec![0.0, 0.0]).unwrap();
    let mut driver = SimulationDriver::new(
        &config,
        ensemble,
        layout,
        NeutralGas::from_config(&config.gas),
        flat_table(4, 0.0),
        Box::new(radial),
        zero_field(),
        StdRng::seed_from_u64(config.timing.seed),
    )
    .unwrap();

    let result = driver.run();
    assert!(result.is_err());
    // Frames captured at steps 0 and 100 survive the abort.
    assert_eq!(driver.tracker().num_frames(), 2);
}

#[test]
fn driver_rejects_layout_ensemble_mismatch() {
    let config = test_config(4, 10, vec![single_species("test", 0.235)], false, 0.0);
    let layout = config.species_layout().unwrap();
    // Ensemble with one particle too few.
    let ensemble = ParticleEnsemble::new(
        layout.masses()[..3].to_vec(),
        layout.charges()[..3].to_vec(),
        vec![Vec3::zero(); 3],
        vec![Vec3::zero(); 3],
    )
    .unwrap();
    let result = SimulationDriver::new(
        &config,
        ensemble,
        layout,
        NeutralGas::from_config(&config.gas),
        flat_table(4, 0.0),
        zero_field(),
        zero_field(),
        StdRng::seed_from_u64(1),
    );
    assert!(result.is_err());
}

#[test]
fn driver_rejects_out_of_range_sigma_columns() {
    let config = test_config(120, 1, three_group_species(), false, 0.0);
    let layout = config.species_layout().unwrap();
    let ensemble = ParticleEnsemble::new(
        layout.masses(),
        layout.charges(),
        vec![Vec3::zero(); 120],
        vec![Vec3::zero(); 120],
    )
    .unwrap();
    // Only two columns, but the strontium cohort references column 4.
    let result = SimulationDriver::new(
        &config,
        ensemble,
        layout,
        NeutralGas::from_config(&config.gas),
        flat_table(2, 0.0),
        zero_field(),
        zero_field(),
        StdRng::seed_from_u64(1),
    );
    assert!(result.is_err());
}
