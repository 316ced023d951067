pub mod config;
pub mod constants;
pub mod species;
pub mod trajectory;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    BeamConfig, CollisionConfig, FieldSource, FieldsConfig, GasConfig, OutputConfig,
    SimulationConfig, SpeciesGroupConfig, TimingConfig,
};
pub use species::{SpeciesCohort, SpeciesGroup, SpeciesLayout};
pub use trajectory::{Axis, TrajectoryRecord};
pub use vecmath::Vec3;
