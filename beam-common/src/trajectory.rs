use crate::species::SpeciesLayout;
use crate::vecmath::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// The time-ordered, append-only log of sampled particle positions,
/// serialized at the end of a run and consumed read-only by the visualizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    /// Integration timestep [s].
    pub dt: f64,
    /// Steps between captures.
    pub capture_interval: u32,
    /// Iteration index of each captured frame.
    pub captured_steps: Vec<u32>,
    /// frames[k][i] is the position of particle i at capture k.
    pub frames: Vec<Vec<Vec3>>,
    /// Cohort layout for grouped-by-species plotting.
    pub layout: SpeciesLayout,
}

impl TrajectoryRecord {
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn num_particles(&self) -> usize {
        self.frames.first().map_or(0, |f| f.len())
    }

    /// One axis of every frame, as per-capture sequences of length N.
    pub fn axis_series(&self, axis: Axis) -> Vec<Vec<f64>> {
        self.frames
            .iter()
            .map(|frame| {
                frame
                    .iter()
                    .map(|p| match axis {
                        Axis::X => p.x,
                        Axis::Y => p.y,
                        Axis::Z => p.z,
                    })
                    .collect()
            })
            .collect()
    }

    /// The (a, b) track of one particle across all frames, for plotting.
    pub fn particle_track(&self, particle: usize, a: Axis, b: Axis) -> Vec<(f64, f64)> {
        let pick = |p: &Vec3, axis: Axis| match axis {
            Axis::X => p.x,
            Axis::Y => p.y,
            Axis::Z => p.z,
        };
        self.frames
            .iter()
            .map(|frame| (pick(&frame[particle], a), pick(&frame[particle], b)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpeciesGroupConfig;

    fn record_of(n: usize, frames: usize) -> TrajectoryRecord {
        let layout = SpeciesLayout::from_groups(
            n,
            1.0,
            &[SpeciesGroupConfig {
                name: "test".into(),
                molar_masses_kg: vec![0.1],
                sigma_columns: vec![1],
            }],
        )
        .unwrap();
        TrajectoryRecord {
            dt: 1e-8,
            capture_interval: 100,
            captured_steps: (0..frames as u32).map(|k| k * 100).collect(),
            frames: (0..frames)
                .map(|k| (0..n).map(|i| Vec3::new(k as f64, i as f64, 0.0)).collect())
                .collect(),
            layout,
        }
    }

    #[test]
    fn axis_series_preserves_frame_and_particle_order() {
        let record = record_of(4, 3);
        let x = record.axis_series(Axis::X);
        let y = record.axis_series(Axis::Y);
        assert_eq!(x.len(), 3);
        assert_eq!(x[2], vec![2.0; 4]);
        assert_eq!(y[0], vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn particle_track_follows_one_column() {
        let record = record_of(4, 3);
        let track = record.particle_track(3, Axis::X, Axis::Y);
        assert_eq!(track, vec![(0.0, 3.0), (1.0, 3.0), (2.0, 3.0)]);
    }
}
