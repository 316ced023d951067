use anyhow::{Context, Result};
use beam_common::{Axis, TrajectoryRecord};
use clap::Parser;
use log::info;
use plotters::prelude::*;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

/// Command-line arguments for the trajectory plotter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input trajectory file (.bin, .msgpack or .json)
    #[arg(short, long)]
    input: PathBuf,

    /// Output image file path (.png)
    #[arg(short, long, default_value = "beam_trajectory.png")]
    output: PathBuf,

    /// Width of the output image in pixels
    #[arg(long, default_value_t = 1000)]
    width: u32,

    /// Height of the output image in pixels
    #[arg(long, default_value_t = 1000)]
    height: u32,

    /// Axis limits as min,max [m]; computed from the data if omitted
    #[arg(long, value_delimiter = ',', num_args = 2)]
    xlim: Option<Vec<f64>>,

    #[arg(long, value_delimiter = ',', num_args = 2)]
    ylim: Option<Vec<f64>>,

    /// Line opacity for individual particle tracks
    #[arg(long, default_value_t = 0.3)]
    alpha: f64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let record = load_record(&args.input)?;
    info!(
        "Loaded trajectory: {} frames of {} particles, {} species group(s).",
        record.num_frames(),
        record.num_particles(),
        record.layout.groups.len()
    );
    if record.num_frames() == 0 {
        anyhow::bail!("trajectory record contains no frames");
    }

    let (x_range, y_range) = plot_ranges(&record, &args);
    let root = BitMapBackend::new(&args.output, (args.width, args.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Beam trajectories", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)?;
    chart
        .configure_mesh()
        .x_desc("x, meter")
        .y_desc("y, meter")
        .draw()?;

    // One color per top-level species group, faint per-particle tracks.
    for (g, group) in record.layout.groups.iter().enumerate() {
        let color = Palette99::pick(g).to_rgba();
        let track_style = color.mix(args.alpha);
        let mut labeled = false;
        for i in group.span() {
            let series = LineSeries::new(record.particle_track(i, Axis::X, Axis::Y), &track_style);
            let anno = chart.draw_series(series)?;
            if !labeled {
                anno.label(group.name.clone()).legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 16, y)], color)
                });
                labeled = true;
            }
        }
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()
        .with_context(|| format!("Failed to write '{}'", args.output.display()))?;
    info!("Trajectory plot saved to {}", args.output.display());
    Ok(())
}

/// Decodes a trajectory record based on its file extension.
fn load_record(path: &PathBuf) -> Result<TrajectoryRecord> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open trajectory file '{}'", path.display()))?;
    let reader = BufReader::new(file);
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let record = match ext {
        "bin" => bincode::deserialize_from(reader)
            .with_context(|| format!("Failed to decode bincode from '{}'", path.display()))?,
        "msgpack" => rmp_serde::from_read(reader)
            .with_context(|| format!("Failed to decode MessagePack from '{}'", path.display()))?,
        "json" => serde_json::from_reader(reader)
            .with_context(|| format!("Failed to decode JSON from '{}'", path.display()))?,
        other => anyhow::bail!(
            "Unsupported trajectory extension '{}' (expected bin, msgpack or json)",
            other
        ),
    };
    Ok(record)
}

/// Axis ranges from the arguments, or the padded data extent.
fn plot_ranges(record: &TrajectoryRecord, args: &Args) -> ((f64, f64), (f64, f64)) {
    let from_args = |lim: &Option<Vec<f64>>| lim.as_ref().map(|v| (v[0], v[1]));
    let x = from_args(&args.xlim).unwrap_or_else(|| data_extent(record, Axis::X));
    let y = from_args(&args.ylim).unwrap_or_else(|| data_extent(record, Axis::Y));
    (x, y)
}

fn data_extent(record: &TrajectoryRecord, axis: Axis) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for frame in record.axis_series(axis) {
        for v in frame {
            min = min.min(v);
            max = max.max(v);
        }
    }
    if !min.is_finite() || !max.is_finite() {
        return (-1.0, 1.0);
    }
    let pad = 0.05 * (max - min).max(1e-6);
    (min - pad, max + pad)
}
