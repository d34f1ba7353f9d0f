//! Beat timing: from detected peaks to cycles, metrics and quality flags

pub mod cycle;
pub mod metrics;
pub mod polarity;
pub mod posture;
pub mod quality;

pub use cycle::{CycleReconstructor, CycleRecord};
pub use metrics::{
    AmplitudeCalibration, CalibrationTable, Estimate, MetricsEngine, ResidualPoint,
    proxy_amplitude, residual_series,
};
pub use polarity::{Polarity, PolarityClassifier, TickEvent, energy_balance};
pub use posture::{PostureAggregator, PostureReading};
pub use quality::{QualityMonitor, QualityReport};
