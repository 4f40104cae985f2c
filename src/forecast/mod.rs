pub mod resample;
pub mod sources;

pub use resample::{resample, ResampleError, SeriesKind};
pub use sources::{LiveState, SensorReading, SourceError, ValueSource};
