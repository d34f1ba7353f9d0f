use std::f64::consts::PI;
use std::sync::Arc;

use serde::Serialize;

use super::cycle::CycleRecord;
use super::polarity::{Polarity, TickEvent};
use crate::config::{MetricsConfig, MovementConfig};
use crate::constants::{BPH_PER_HZ, MAX_AMPLITUDE_DEG, MIN_AMPLITUDE_DEG, SECONDS_PER_DAY};
use crate::error::{Result, TimegrapherError};
use crate::signal_processing::trimmed_mean;

/// Maps the acoustic lift-time proxy to a calibrated amplitude
///
/// Implementations receive the robust lift time and cycle period in seconds
/// and the movement's lift angle in degrees, and return degrees.
pub trait AmplitudeCalibration: Send + Sync {
    fn amplitude(&self, lift_time: f64, period: f64, lift_angle: f64) -> f64;
}

/// Uncalibrated amplitude proxy in degrees
///
/// `(π × lift_time / period) / sin(lift_angle / 2)`, evaluated in radians.
pub fn proxy_amplitude(lift_time: f64, period: f64, lift_angle: f64) -> f64 {
    let half_lift = (lift_angle.to_radians() / 2.0).sin();
    (PI * lift_time / period / half_lift).to_degrees()
}

/// Piecewise-linear correction of the proxy amplitude
///
/// Points are `(proxy_deg, calibrated_deg)`. Proxies outside the table map
/// to the nearest end point.
#[derive(Debug, Clone)]
pub struct CalibrationTable {
    points: Vec<(f64, f64)>,
}

impl CalibrationTable {
    pub fn new(mut points: Vec<(f64, f64)>) -> Result<Self> {
        if points.len() < 2 {
            return Err(TimegrapherError::Config(
                "calibration table needs at least two points".into(),
            ));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        if points.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(TimegrapherError::Config(
                "calibration table proxy values must be distinct".into(),
            ));
        }
        Ok(Self { points })
    }

    pub fn map(&self, proxy: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if proxy <= first.0 {
            return first.1;
        }
        if proxy >= last.0 {
            return last.1;
        }

        let upper = self.points.partition_point(|p| p.0 <= proxy);
        let (x0, y0) = self.points[upper - 1];
        let (x1, y1) = self.points[upper];
        y0 + (proxy - x0) * (y1 - y0) / (x1 - x0)
    }
}

impl AmplitudeCalibration for CalibrationTable {
    fn amplitude(&self, lift_time: f64, period: f64, lift_angle: f64) -> f64 {
        self.map(proxy_amplitude(lift_time, period, lift_angle))
    }
}

/// Metrics derived from one trailing window of cycles
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    /// Robust cycle period, seconds
    pub period: f64,
    pub observed_beats_per_hour: f64,
    pub rate_seconds_per_day: f64,
    pub beat_error_ms: f64,
    pub amplitude_deg: Option<f64>,
    pub lift_time_ms: Option<f64>,
    pub cycles_used: usize,
}

/// Rate, beat error and amplitude from trailing cycles
///
/// Every aggregate is a trimmed mean so that single corrupted cycles cannot
/// dominate. Results depend only on the inputs: recomputing over an
/// unchanged window reproduces the same estimate exactly.
pub struct MetricsEngine {
    expected_bph: f64,
    lift_angle: f64,
    window: usize,
    trim_fraction: f64,
    min_cycles: usize,
    calibration: Option<Arc<dyn AmplitudeCalibration>>,
}

impl MetricsEngine {
    /// # Arguments
    /// * `movement` - Expected beat rate and lift angle
    /// * `metrics` - Window size, trim fraction and minimum cycle count
    pub fn new(movement: &MovementConfig, metrics: &MetricsConfig) -> Self {
        Self {
            expected_bph: movement.expected_beats_per_hour,
            lift_angle: movement.lift_angle,
            window: metrics.analysis_window_size,
            trim_fraction: metrics.trim_fraction,
            min_cycles: metrics.min_cycles.max(1),
            calibration: None,
        }
    }

    pub fn with_calibration(mut self, calibration: Arc<dyn AmplitudeCalibration>) -> Self {
        self.calibration = Some(calibration);
        self
    }

    pub fn set_calibration(&mut self, calibration: Option<Arc<dyn AmplitudeCalibration>>) {
        self.calibration = calibration;
    }

    pub fn set_lift_angle(&mut self, degrees: f64) {
        self.lift_angle = degrees;
    }

    pub fn set_expected_bph(&mut self, bph: f64) {
        self.expected_bph = bph;
    }

    pub fn lift_angle(&self) -> f64 {
        self.lift_angle
    }

    pub fn expected_bph(&self) -> f64 {
        self.expected_bph
    }

    /// Number of trailing cycles considered per estimate
    pub fn window(&self) -> usize {
        self.window
    }

    /// The trailing cycles an estimate over `cycles` would use
    pub fn window_of<'a>(&self, cycles: &'a [CycleRecord]) -> &'a [CycleRecord] {
        &cycles[cycles.len().saturating_sub(self.window)..]
    }

    /// Estimate over the trailing window of `cycles`
    ///
    /// # Arguments
    /// * `cycles` - Reconstructed cycles in time order
    /// * `lift_times` - Burst widths in seconds for the beats in the window
    ///
    /// # Returns
    /// `None` with fewer than `min_cycles` cycles in the window
    pub fn compute(&self, cycles: &[CycleRecord], lift_times: &[f64]) -> Option<Estimate> {
        let window = self.window_of(cycles);
        if window.len() < self.min_cycles {
            return None;
        }

        let periods: Vec<f64> = window.iter().map(|c| c.period).collect();
        let beat_errors: Vec<f64> = window.iter().map(|c| c.beat_error).collect();

        let period = trimmed_mean(&periods, self.trim_fraction)?;
        if period <= 0.0 {
            return None;
        }
        let beat_error = trimmed_mean(&beat_errors, self.trim_fraction)?;

        let observed_bph = BPH_PER_HZ / period;
        let rate = (observed_bph / self.expected_bph - 1.0) * SECONDS_PER_DAY;

        let lift_time = trimmed_mean(lift_times, self.trim_fraction);
        let amplitude = lift_time.map(|lt| {
            let raw = match &self.calibration {
                Some(cal) => cal.amplitude(lt, period, self.lift_angle),
                None => proxy_amplitude(lt, period, self.lift_angle),
            };
            raw.clamp(MIN_AMPLITUDE_DEG, MAX_AMPLITUDE_DEG)
        });

        Some(Estimate {
            period,
            observed_beats_per_hour: observed_bph,
            rate_seconds_per_day: rate,
            beat_error_ms: beat_error * 1000.0,
            amplitude_deg: amplitude,
            lift_time_ms: lift_time.map(|lt| lt * 1000.0),
            cycles_used: window.len(),
        })
    }
}

/// A beat's deviation from the nominal beat grid, for plotting
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResidualPoint {
    pub time: f64,
    pub residual_ms: f64,
    pub polarity: Polarity,
}

/// Offsets of each event from a grid of `beat_interval` anchored at the
/// first event, wrapped to ±half a beat
pub fn residual_series(events: &[TickEvent], beat_interval: f64) -> Vec<ResidualPoint> {
    let Some(first) = events.first() else {
        return Vec::new();
    };
    let origin = first.timestamp;

    events
        .iter()
        .map(|e| {
            let elapsed = e.timestamp - origin;
            let beats = (elapsed / beat_interval).round();
            ResidualPoint {
                time: e.timestamp,
                residual_ms: (elapsed - beats * beat_interval) * 1000.0,
                polarity: e.polarity,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn engine() -> MetricsEngine {
        MetricsEngine::new(&MovementConfig::default(), &MetricsConfig::default())
    }

    fn cycles(period: f64, beat_error: f64, count: usize) -> Vec<CycleRecord> {
        (0..count)
            .filter_map(|i| {
                let t = i as f64 * period;
                CycleRecord::new(t, t + period / 2.0 + beat_error, t + period)
            })
            .collect()
    }

    #[test]
    fn test_nominal_rate_is_zero() {
        let est = engine().compute(&cycles(0.25, 0.0, 50), &[]).unwrap();
        assert_relative_eq!(est.observed_beats_per_hour, 28800.0, epsilon = 1e-6);
        assert_relative_eq!(est.rate_seconds_per_day, 0.0, epsilon = 1e-6);
        assert_relative_eq!(est.beat_error_ms, 0.0, epsilon = 1e-9);
        assert!(est.amplitude_deg.is_none());
    }

    #[test]
    fn test_fast_watch_gains() {
        // A fast watch has a shorter period. Dividing the period by 1.02
        // raises the beat rate by 2%, i.e. +0.02 * 86400 = +1728 s/d.
        let est = engine().compute(&cycles(0.25 / 1.02, 0.0, 50), &[]).unwrap();
        assert_relative_eq!(est.rate_seconds_per_day, 1728.0, epsilon = 1e-6);
    }

    #[test]
    fn test_longer_period_loses() {
        // Stretching the period by 2% gives 1/1.02 of the beats, not 98%
        let est = engine().compute(&cycles(0.25 * 1.02, 0.0, 50), &[]).unwrap();
        let expected = (1.0 / 1.02 - 1.0) * 86400.0;
        assert_relative_eq!(est.rate_seconds_per_day, expected, epsilon = 1e-6);
        assert!(est.rate_seconds_per_day < 0.0);
    }

    #[test]
    fn test_beat_error_in_ms() {
        let est = engine().compute(&cycles(0.25, 0.0015, 50), &[]).unwrap();
        assert_relative_eq!(est.beat_error_ms, 1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_single_outlier_bounded() {
        let clean = cycles(0.25, 0.0, 60);
        let mut corrupted = clean.clone();
        corrupted[30] = CycleRecord::new(7.5, 20.0, 7.5 + 25.0).unwrap();

        let e = engine();
        let a = e.compute(&clean, &[]).unwrap();
        let b = e.compute(&corrupted, &[]).unwrap();
        assert!((a.rate_seconds_per_day - b.rate_seconds_per_day).abs() < 1.0);
        assert!((a.beat_error_ms - b.beat_error_ms).abs() < 0.1);
    }

    #[test]
    fn test_insufficient_cycles() {
        assert!(engine().compute(&cycles(0.25, 0.0, 2), &[]).is_none());
    }

    #[test]
    fn test_compute_is_idempotent() {
        let e = engine();
        let c = cycles(0.2501, 0.0007, 120);
        let lifts = vec![0.0031; 240];
        assert_eq!(e.compute(&c, &lifts), e.compute(&c, &lifts));
    }

    #[test]
    fn test_uses_trailing_window_only() {
        let mut c = cycles(0.3, 0.0, 100);
        c.extend(cycles(0.25, 0.0, 250).into_iter().filter_map(|r| {
            CycleRecord::new(
                r.tick_time + 30.0,
                r.tock_time + 30.0,
                r.next_tick_time + 30.0,
            )
        }));
        let est = engine().compute(&c, &[]).unwrap();
        assert_eq!(est.cycles_used, 200);
        assert_relative_eq!(est.period, 0.25, epsilon = 1e-9);
    }

    #[test]
    fn test_amplitude_proxy_formula() {
        let lift_time = 0.003;
        let est = engine().compute(&cycles(0.25, 0.0, 10), &[lift_time; 20]).unwrap();
        let expected = (PI * lift_time / 0.25 / (26.0_f64.to_radians()).sin()).to_degrees();
        assert_relative_eq!(est.amplitude_deg.unwrap(), expected, epsilon = 1e-9);
        assert_relative_eq!(est.lift_time_ms.unwrap(), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_amplitude_monotonic_and_clamped() {
        let a = proxy_amplitude(0.002, 0.25, 52.0);
        let b = proxy_amplitude(0.004, 0.25, 52.0);
        assert!(b > a);

        let est = engine().compute(&cycles(0.25, 0.0, 10), &[0.3; 20]).unwrap();
        assert_eq!(est.amplitude_deg, Some(MAX_AMPLITUDE_DEG));
    }

    #[test]
    fn test_calibration_table_interpolates() {
        let table = CalibrationTable::new(vec![(20.0, 300.0), (0.0, 150.0), (10.0, 250.0)]).unwrap();
        assert_relative_eq!(table.map(5.0), 200.0);
        assert_relative_eq!(table.map(15.0), 275.0);
        assert_relative_eq!(table.map(-3.0), 150.0);
        assert_relative_eq!(table.map(40.0), 300.0);
    }

    #[test]
    fn test_calibration_table_rejects_bad_points() {
        assert!(CalibrationTable::new(vec![(1.0, 2.0)]).is_err());
        assert!(CalibrationTable::new(vec![(1.0, 2.0), (1.0, 3.0)]).is_err());
    }

    #[test]
    fn test_calibration_applied() {
        let table = CalibrationTable::new(vec![(0.0, 100.0), (1000.0, 100.0)]).unwrap();
        let e = engine().with_calibration(Arc::new(table));
        let est = e.compute(&cycles(0.25, 0.0, 10), &[0.003; 20]).unwrap();
        assert_relative_eq!(est.amplitude_deg.unwrap(), 100.0);
    }

    #[test]
    fn test_residuals_on_grid() {
        let events: Vec<TickEvent> = (0..8)
            .map(|i| TickEvent {
                timestamp: 1.0 + i as f64 * 0.125 + if i == 5 { 0.001 } else { 0.0 },
                polarity: if i % 2 == 0 { Polarity::Tick } else { Polarity::Tock },
                sample_index: 0,
                height: 1.0,
                lift_time: None,
            })
            .collect();

        let residuals = residual_series(&events, 0.125);
        assert_eq!(residuals.len(), 8);
        assert_relative_eq!(residuals[0].residual_ms, 0.0);
        assert_relative_eq!(residuals[5].residual_ms, 1.0, epsilon = 1e-9);
        assert_relative_eq!(residuals[6].residual_ms, 0.0, epsilon = 1e-9);
    }
}
