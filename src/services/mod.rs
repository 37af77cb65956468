pub mod occupancy;

pub use occupancy::{ImageUpload, OccupancyPipeline, PipelineOutcome, clamp_occupancy};
