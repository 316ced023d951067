use crate::ensemble::ParticleEnsemble;
use beam_common::{SpeciesLayout, TrajectoryRecord, Vec3};

/// Periodic, lossless recorder of ensemble position state.
///
/// Owns the growing trajectory record exclusively; every other component
/// sees it read-only. Capture cadence is the driver's decision, not the
/// tracker's.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryTracker {
    captured_steps: Vec<u32>,
    frames: Vec<Vec<Vec3>>,
}

impl TrajectoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a snapshot of the full position array. The positions are
    /// copied, not referenced: the ensemble keeps mutating in place.
    pub fn track(&mut self, step: u32, ensemble: &ParticleEnsemble) {
        self.captured_steps.push(step);
        self.frames.push(ensemble.position.clone());
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Vec<Vec3>] {
        &self.frames
    }

    pub fn captured_steps(&self) -> &[u32] {
        &self.captured_steps
    }

    /// Finalizes the accumulated frames into the serializable record handed
    /// to the visualization collaborator.
    pub fn into_record(
        self,
        dt: f64,
        capture_interval: u32,
        layout: SpeciesLayout,
    ) -> TrajectoryRecord {
        TrajectoryRecord {
            dt,
            capture_interval,
            captured_steps: self.captured_steps,
            frames: self.frames,
            layout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracked_frames_are_deep_copies() {
        let mut ensemble = ParticleEnsemble::new(
            vec![1e-25],
            vec![1.6e-19],
            vec![Vec3::new(1.0, 2.0, 3.0)],
            vec![Vec3::zero()],
        )
        .unwrap();
        let mut tracker = TrajectoryTracker::new();
        tracker.track(0, &ensemble);
        ensemble.position[0] = Vec3::new(9.0, 9.0, 9.0);
        tracker.track(1, &ensemble);

        assert_eq!(tracker.num_frames(), 2);
        assert_eq!(tracker.frames()[0][0], Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(tracker.frames()[1][0], Vec3::new(9.0, 9.0, 9.0));
        assert_eq!(tracker.captured_steps(), &[0, 1]);
    }
}
