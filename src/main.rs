use anyhow::{Context, Result};
use beam_common::{SimulationConfig, TrajectoryRecord, Vec3};
use beam_engine::collision::{CrossSectionTable, NeutralGas};
use beam_engine::driver::SimulationDriver;
use beam_engine::ensemble::ParticleEnsemble;
use beam_engine::fields;
use beam_engine::init::{gen_positions, gen_velocities};
use log::{error, info, warn};
use rand::prelude::*;
use std::fs::File;

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting beam transport engine...");

    // --- Load Configuration ---
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = SimulationConfig::load(&config_path)?;

    let layout = config.species_layout()?;
    info!(
        "Species layout: {} cohorts over {} particles.",
        layout.cohorts().count(),
        layout.n_total
    );

    // --- Build External Collaborators ---
    let electric = fields::build_field(&config.fields.electric)
        .context("Failed to build the electric field interpolator")?;
    let magnetic = fields::build_field(&config.fields.magnetic)
        .context("Failed to build the magnetic field interpolator")?;
    let sigma = CrossSectionTable::load_csv(&config.gas.cross_sections)?;
    let gas = NeutralGas::from_config(&config.gas);
    info!(
        "Background gas: {} at {:.1} K, n = {:.3e} 1/m^3, {} cross-section column(s).",
        gas.name,
        gas.temperature,
        gas.density,
        sigma.num_columns()
    );

    // --- Generate Initial Conditions ---
    // One seeded generator drives initial sampling and the collision stages,
    // so the whole run reproduces from [timing].seed.
    let mut rng = StdRng::seed_from_u64(config.timing.seed);
    let masses = layout.masses();
    let charges = layout.charges();
    let launch = Vec3::from_array(config.beam.launch_point);
    let positions = gen_positions(&mut rng, launch, config.beam.sub_width, config.beam.n_total);
    let velocities = gen_velocities(
        &mut rng,
        launch,
        &masses,
        config.beam.energy_range_ev,
        config.beam.theta_range_rad,
    );
    let ensemble = ParticleEnsemble::new(masses, charges, positions, velocities)?;

    // --- Run the Simulation ---
    let mut driver = SimulationDriver::new(
        &config, ensemble, layout, gas, sigma, electric, magnetic, rng,
    )?;
    let run_result = driver.run();
    if let Err(e) = &run_result {
        error!("Simulation aborted: {:#}", e);
        info!(
            "Saving the {} frame(s) captured before the failure.",
            driver.tracker().num_frames()
        );
    }

    // --- Save Recorded Data ---
    let final_positions = driver.ensemble().position.clone();
    let record = driver.into_record();
    if config.output.save_trajectory {
        save_record(&record, &config)?;
    } else {
        info!("Skipping trajectory save as per config.");
    }
    if config.output.save_final_positions {
        save_final_positions(&final_positions, &config)?;
    } else {
        info!("Skipping final positions save as per config.");
    }

    run_result?;
    info!("Simulation Complete.");
    Ok(())
}

/// Writes the trajectory record in the configured format.
fn save_record(record: &TrajectoryRecord, config: &SimulationConfig) -> Result<()> {
    let format = config.output.format.as_deref().unwrap_or("json");
    let base = &config.output.base_filename;
    match format {
        "bincode" => {
            // Binary format (much more compact)
            let filename = format!("{}_trajectory.bin", base);
            let file = File::create(&filename)
                .with_context(|| format!("Error creating trajectory file '{}'", filename))?;
            bincode::serialize_into(file, record).context("Error serializing trajectory")?;
            info!("Trajectory saved to {} (binary format)", filename);
        }
        "messagepack" => {
            let filename = format!("{}_trajectory.msgpack", base);
            let mut file = File::create(&filename)
                .with_context(|| format!("Error creating trajectory file '{}'", filename))?;
            rmp_serde::encode::write(&mut file, record).context("Error serializing trajectory")?;
            info!("Trajectory saved to {} (MessagePack format)", filename);
        }
        other => {
            if other != "json" {
                warn!("Unknown output format: {}. Using JSON instead.", other);
            }
            let filename = format!("{}_trajectory.json", base);
            let file = File::create(&filename)
                .with_context(|| format!("Error creating trajectory file '{}'", filename))?;
            serde_json::to_writer(file, record).context("Error serializing trajectory")?;
            info!("Trajectory saved to {}", filename);
        }
    }
    Ok(())
}

fn save_final_positions(positions: &[Vec3], config: &SimulationConfig) -> Result<()> {
    let filename = format!("{}_final_positions.csv", config.output.base_filename);
    let mut writer = csv::Writer::from_path(&filename)
        .with_context(|| format!("Error creating CSV file '{}'", filename))?;
    writer.write_record(["x_m", "y_m", "z_m"])?;
    for p in positions {
        writer.write_record(&[
            format!("{:.6e}", p.x),
            format!("{:.6e}", p.y),
            format!("{:.6e}", p.z),
        ])?;
    }
    writer.flush()?;
    info!("Final positions saved to {}", filename);
    Ok(())
}
