//! Numeric constants for signal processing stability and timekeeping
//!
//! These constants define thresholds and epsilon values used throughout
//! the pipeline, plus the handful of physical constants the metrics rely on.

/// Epsilon for preventing division by zero in interpolation calculations.
/// Used when computing sub-sample peak positions.
pub const INTERPOLATION_EPSILON: f32 = 1e-10;

/// Minimum RMS threshold for AGC operation.
/// Signals with RMS below this are considered silent; AGC holds gain constant.
pub const MIN_RMS_THRESHOLD: f32 = 1e-6;

/// Floor for the adaptive envelope threshold.
/// Keeps digital silence (envelope identically zero) from producing ticks.
pub const MIN_ENVELOPE_THRESHOLD: f32 = 1e-7;

/// Seconds in one day, the unit of the reported rate.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Beats per hour contributed by one oscillation per second.
/// A full oscillation of the balance is two beats (tick + tock).
pub const BPH_PER_HZ: f64 = 7_200.0;

/// Physically plausible amplitude range in degrees.
pub const MIN_AMPLITUDE_DEG: f64 = 0.0;
pub const MAX_AMPLITUDE_DEG: f64 = 350.0;

/// Maximum number of posture slots.
pub const MAX_POSTURES: usize = 6;
