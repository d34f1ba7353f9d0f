//! Configuration for the timegrapher.
//!
//! Every section deserializes from TOML with defaults for missing keys, so a
//! configuration file only needs to name what differs from the defaults:
//!
//! ```toml
//! [movement]
//! lift_angle = 51.0
//! expected_beats_per_hour = 21600.0
//!
//! [posture]
//! settle_secs = 15.0
//! ```
//!
//! All values are checked by [`TimegrapherConfig::validate`] before a session
//! starts.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::constants::{BPH_PER_HZ, MAX_POSTURES};
use crate::error::{Result, TimegrapherError};

/// Nominal beat rate of a movement
///
/// Can be specified either as beats per hour or as the balance frequency in Hz.
/// One oscillation of the balance is two beats, so 1 Hz = 7200 bph.
///
/// # Parsing formats
/// - `28800` - beats per hour (no suffix)
/// - `28800bph` - beats per hour (explicit)
/// - `4hz` or `4Hz` - balance frequency
///
/// # Example
/// ```
/// use timegrapher::config::BeatRate;
///
/// let rate: BeatRate = "4hz".parse().unwrap();
/// assert!((rate.as_bph() - 28800.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatRate(f64);

impl BeatRate {
    /// Create from beats per hour
    pub fn from_bph(bph: f64) -> Self {
        Self(bph)
    }

    /// Create from balance frequency in Hz
    pub fn from_hz(hz: f64) -> Self {
        Self(hz * BPH_PER_HZ)
    }

    /// Get beats per hour
    pub fn as_bph(&self) -> f64 {
        self.0
    }

    /// Get balance frequency in Hz
    pub fn as_hz(&self) -> f64 {
        self.0 / BPH_PER_HZ
    }

    /// Nominal time between two consecutive beats, in seconds
    pub fn beat_interval(&self) -> f64 {
        3600.0 / self.0
    }
}

impl Default for BeatRate {
    fn default() -> Self {
        Self::from_bph(28_800.0)
    }
}

impl fmt::Display for BeatRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}bph", self.0)
    }
}

impl FromStr for BeatRate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let lower = s.to_ascii_lowercase();

        if let Some(num) = lower.strip_suffix("hz") {
            let hz: f64 = num
                .trim()
                .parse()
                .map_err(|_| format!("invalid frequency: {}", s))?;
            if hz <= 0.0 {
                return Err("frequency must be positive".to_string());
            }
            return Ok(Self::from_hz(hz));
        }

        let num = lower.strip_suffix("bph").unwrap_or(&lower);
        let bph: f64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid beat rate: {}", s))?;
        if bph <= 0.0 {
            return Err("beat rate must be positive".to_string());
        }
        Ok(Self::from_bph(bph))
    }
}

/// Complete timegrapher configuration
///
/// Use `TimegrapherConfig::default()` for sensible defaults.
///
/// # Example
/// ```
/// use timegrapher::config::TimegrapherConfig;
///
/// let mut config = TimegrapherConfig::default();
/// config.movement.expected_beats_per_hour = 21600.0;
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TimegrapherConfig {
    /// Audio input and buffering
    pub audio: AudioConfig,
    /// Band-limiting filters
    pub filter: FilterConfig,
    /// Automatic gain control
    pub agc: AgcConfig,
    /// Transient detection and peak picking
    pub detector: DetectorConfig,
    /// Movement under test
    pub movement: MovementConfig,
    /// Metrics aggregation
    pub metrics: MetricsConfig,
    /// Posture slots and settling
    pub posture: PostureConfig,
    /// Stability and capture-quality monitoring
    pub quality: QualityConfig,
}

/// Audio input configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Audio sample rate in Hz
    pub sample_rate: u32,
    /// Capture buffer size in frames
    pub buffer_size: usize,
    /// Number of channels captured from the device (downmixed to mono)
    pub channels: u16,
    /// Ring buffer capacity in seconds of audio
    pub ring_capacity_secs: f32,
    /// Processing cadence in milliseconds; one analysis block per cycle
    pub processing_interval_ms: f32,
}

/// Band-limiting filter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Highpass cutoff in Hz (removes handling rumble)
    pub highpass_cutoff: f32,
    /// Lowpass cutoff in Hz (removes hiss)
    pub lowpass_cutoff: f32,
    /// Butterworth filter order for both filters
    pub order: usize,
}

/// Automatic gain control configuration
///
/// Normalizes the level of the microphone signal so detection thresholds
/// and burst widths do not depend on how the watch sits on the pickup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgcConfig {
    /// Target RMS signal level (0-1 range)
    pub target_rms: f32,
    /// Attack time constant in milliseconds (how fast gain decreases)
    pub attack_time_ms: f32,
    /// Release time constant in milliseconds (how fast gain increases)
    pub release_time_ms: f32,
    /// Measurement window for RMS calculation in milliseconds
    pub measurement_window_ms: f32,
    /// Minimum gain
    pub min_gain: f32,
    /// Maximum gain, bounds amplification of near-silence
    pub max_gain: f32,
}

/// Tick detection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Envelope moving-average length in milliseconds
    pub smoothing_ms: f32,
    /// Trailing envelope span used for the robust threshold, in seconds
    pub threshold_window_secs: f32,
    /// Threshold = median + k * MAD, with the MAD unscaled
    pub threshold_k: f32,
    /// Peaks below this fraction of the median recent beat height are noise
    pub min_relative_height: f32,
    /// Refractory period between accepted ticks in milliseconds
    pub min_tick_separation_ms: f32,
    /// Length of the pre/post-peak energy windows for tick/tock labelling
    pub polarity_window_ms: f32,
}

/// Movement under test
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Lift angle in degrees
    pub lift_angle: f64,
    /// Nominal beats per hour
    pub expected_beats_per_hour: f64,
}

/// Metrics aggregation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Number of trailing cycles the estimators look at
    pub analysis_window_size: usize,
    /// Fraction trimmed from each tail before averaging (0-0.5)
    pub trim_fraction: f64,
    /// Minimum number of cycles before an estimate is produced
    pub min_cycles: usize,
}

/// Posture configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostureConfig {
    /// Display labels, one per posture slot (at most six)
    pub labels: Vec<String>,
    /// Posture selected at session start
    pub initial: usize,
    /// Settle delay after a posture change in seconds
    pub settle_secs: f64,
    /// Exponential smoothing weight on each new reading (0-1]
    pub smoothing_weight: f64,
}

/// Stability and capture-quality configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Number of trailing rate estimates in the stability window
    pub stability_window: usize,
    /// Maximum rate standard deviation considered stable, s/day
    pub stability_threshold: f64,
    /// A gap longer than this multiple of the median beat interval is a dropout
    pub dropout_gap_factor: f64,
    /// Dropouts tolerated before capture is flagged unreliable
    pub max_dropouts: usize,
    /// Minimum acceptable tick signal-to-noise ratio in dB
    pub min_snr_db: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            buffer_size: 1024,
            channels: 1,
            ring_capacity_secs: 10.0,
            processing_interval_ms: 50.0,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            highpass_cutoff: 200.0,
            lowpass_cutoff: 5000.0,
            order: 2,
        }
    }
}

impl Default for AgcConfig {
    fn default() -> Self {
        Self {
            target_rms: 0.1,
            attack_time_ms: 500.0,
            release_time_ms: 2000.0,
            measurement_window_ms: 250.0,
            min_gain: 0.1,
            max_gain: 100.0,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            smoothing_ms: 2.0,
            threshold_window_secs: 2.0,
            threshold_k: 4.0,
            min_relative_height: 0.25,
            min_tick_separation_ms: 10.0,
            polarity_window_ms: 8.0,
        }
    }
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            lift_angle: 52.0,
            expected_beats_per_hour: 28_800.0,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            analysis_window_size: 200,
            trim_fraction: 0.1,
            min_cycles: 3,
        }
    }
}

impl Default for PostureConfig {
    fn default() -> Self {
        Self {
            labels: [
                "Dial up",
                "Dial down",
                "Crown up",
                "Crown down",
                "Crown left",
                "Crown right",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            initial: 0,
            settle_secs: 10.0,
            smoothing_weight: 0.2,
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            stability_window: 10,
            stability_threshold: 0.5,
            dropout_gap_factor: 2.0,
            max_dropouts: 3,
            min_snr_db: 6.0,
        }
    }
}

impl AudioConfig {
    /// Samples per processing cycle
    pub fn block_size(&self) -> usize {
        ((self.sample_rate as f32 * self.processing_interval_ms / 1000.0) as usize).max(1)
    }

    /// Ring buffer capacity in samples
    pub fn ring_capacity(&self) -> usize {
        (self.sample_rate as f32 * self.ring_capacity_secs) as usize
    }
}

impl MovementConfig {
    pub fn beat_rate(&self) -> BeatRate {
        BeatRate::from_bph(self.expected_beats_per_hour)
    }
}

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(TimegrapherError::Config(message()))
    }
}

/// Lift angles outside this range do not describe a real escapement.
pub fn validate_lift_angle(degrees: f64) -> Result<()> {
    check(degrees > 0.0 && degrees < 180.0, || {
        format!("lift_angle must be in (0, 180) degrees, got {}", degrees)
    })
}

/// Beat rates outside this range do not describe a real movement.
pub fn validate_beats_per_hour(bph: f64) -> Result<()> {
    check((3_600.0..=72_000.0).contains(&bph), || {
        format!(
            "expected_beats_per_hour must be in [3600, 72000], got {}",
            bph
        )
    })
}

impl TimegrapherConfig {
    /// Parse a TOML document, filling unspecified keys with defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reject physically meaningless settings
    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;
        let nyquist = audio.sample_rate as f32 / 2.0;
        check((8_000..=384_000).contains(&audio.sample_rate), || {
            format!(
                "sample_rate must be in [8000, 384000] Hz, got {}",
                audio.sample_rate
            )
        })?;
        check(audio.buffer_size > 0, || "buffer_size must be positive".into())?;
        check(audio.channels > 0, || "channels must be positive".into())?;
        check(audio.processing_interval_ms > 0.0, || {
            format!(
                "processing_interval_ms must be positive, got {}",
                audio.processing_interval_ms
            )
        })?;
        check(
            audio.ring_capacity_secs * 1000.0 >= audio.processing_interval_ms,
            || {
                format!(
                    "ring_capacity_secs ({}) must hold at least one processing interval ({} ms)",
                    audio.ring_capacity_secs, audio.processing_interval_ms
                )
            },
        )?;

        let filter = &self.filter;
        check(filter.highpass_cutoff > 0.0, || {
            format!(
                "highpass_cutoff must be positive, got {}",
                filter.highpass_cutoff
            )
        })?;
        check(
            filter.lowpass_cutoff > filter.highpass_cutoff && filter.lowpass_cutoff < nyquist,
            || {
                format!(
                    "lowpass_cutoff must lie between highpass_cutoff ({}) and Nyquist ({}), got {}",
                    filter.highpass_cutoff, nyquist, filter.lowpass_cutoff
                )
            },
        )?;
        check((1..=8).contains(&filter.order), || {
            format!("filter order must be in [1, 8], got {}", filter.order)
        })?;

        let agc = &self.agc;
        check(agc.target_rms > 0.0 && agc.target_rms <= 1.0, || {
            format!("agc target_rms must be in (0, 1], got {}", agc.target_rms)
        })?;
        check(
            agc.attack_time_ms > 0.0 && agc.release_time_ms > 0.0 && agc.measurement_window_ms > 0.0,
            || "agc time constants must be positive".into(),
        )?;
        check(agc.min_gain > 0.0 && agc.max_gain >= agc.min_gain, || {
            format!(
                "agc gain range invalid: min {} max {}",
                agc.min_gain, agc.max_gain
            )
        })?;

        let detector = &self.detector;
        check(detector.smoothing_ms > 0.0, || {
            "smoothing_ms must be positive".into()
        })?;
        check(detector.threshold_window_secs > 0.0, || {
            "threshold_window_secs must be positive".into()
        })?;
        check(detector.threshold_k > 0.0, || {
            format!("threshold_k must be positive, got {}", detector.threshold_k)
        })?;
        check(
            (0.0..1.0).contains(&detector.min_relative_height),
            || {
                format!(
                    "min_relative_height must be in [0, 1), got {}",
                    detector.min_relative_height
                )
            },
        )?;
        check(detector.min_tick_separation_ms > 0.0, || {
            format!(
                "min_tick_separation_ms must be positive, got {}",
                detector.min_tick_separation_ms
            )
        })?;
        check(detector.polarity_window_ms > 0.0, || {
            "polarity_window_ms must be positive".into()
        })?;

        validate_lift_angle(self.movement.lift_angle)?;
        validate_beats_per_hour(self.movement.expected_beats_per_hour)?;
        let beat_ms = self.movement.beat_rate().beat_interval() * 1000.0;
        check(
            (detector.min_tick_separation_ms as f64) < beat_ms,
            || {
                format!(
                    "min_tick_separation_ms ({}) must be shorter than the beat interval ({:.1} ms)",
                    detector.min_tick_separation_ms, beat_ms
                )
            },
        )?;

        let metrics = &self.metrics;
        check(metrics.min_cycles >= 1, || "min_cycles must be at least 1".into())?;
        check(metrics.analysis_window_size >= metrics.min_cycles, || {
            format!(
                "analysis_window_size ({}) must be at least min_cycles ({})",
                metrics.analysis_window_size, metrics.min_cycles
            )
        })?;
        check((0.0..0.5).contains(&metrics.trim_fraction), || {
            format!(
                "trim_fraction must be in [0, 0.5), got {}",
                metrics.trim_fraction
            )
        })?;

        let posture = &self.posture;
        check(
            !posture.labels.is_empty() && posture.labels.len() <= MAX_POSTURES,
            || {
                format!(
                    "between 1 and {} posture labels required, got {}",
                    MAX_POSTURES,
                    posture.labels.len()
                )
            },
        )?;
        check(posture.initial < posture.labels.len(), || {
            format!(
                "initial posture {} out of range for {} labels",
                posture.initial,
                posture.labels.len()
            )
        })?;
        check(posture.settle_secs >= 0.0, || {
            "settle_secs must not be negative".into()
        })?;
        check(
            posture.smoothing_weight > 0.0 && posture.smoothing_weight <= 1.0,
            || {
                format!(
                    "smoothing_weight must be in (0, 1], got {}",
                    posture.smoothing_weight
                )
            },
        )?;

        let quality = &self.quality;
        check(quality.stability_window >= 10, || {
            format!(
                "stability_window must be at least 10, got {}",
                quality.stability_window
            )
        })?;
        check(quality.stability_threshold > 0.0, || {
            "stability_threshold must be positive".into()
        })?;
        check(quality.dropout_gap_factor > 1.0, || {
            format!(
                "dropout_gap_factor must exceed 1, got {}",
                quality.dropout_gap_factor
            )
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beat_rate_from_bph() {
        let rate: BeatRate = "21600".parse().unwrap();
        assert!((rate.as_bph() - 21600.0).abs() < 1e-9);

        let rate: BeatRate = "21600bph".parse().unwrap();
        assert!((rate.as_bph() - 21600.0).abs() < 1e-9);
    }

    #[test]
    fn test_beat_rate_from_hz() {
        let rate: BeatRate = "3Hz".parse().unwrap();
        assert!((rate.as_bph() - 21600.0).abs() < 1e-9);
        assert!((rate.beat_interval() - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_beat_rate_invalid() {
        assert!("abc".parse::<BeatRate>().is_err());
        assert!("-100".parse::<BeatRate>().is_err());
        assert!("0hz".parse::<BeatRate>().is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(TimegrapherConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_bph() {
        let mut config = TimegrapherConfig::default();
        config.movement.expected_beats_per_hour = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("expected_beats_per_hour"));
    }

    #[test]
    fn test_rejects_bad_sample_rate() {
        let mut config = TimegrapherConfig::default();
        config.audio.sample_rate = 0;
        assert!(matches!(
            config.validate(),
            Err(TimegrapherError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_inverted_filters() {
        let mut config = TimegrapherConfig::default();
        config.filter.lowpass_cutoff = 100.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_too_many_postures() {
        let mut config = TimegrapherConfig::default();
        config.posture.labels.push("Extra".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_relative_height_of_one() {
        let mut config = TimegrapherConfig::default();
        config.detector.min_relative_height = 1.0;
        assert!(config.validate().is_err());
        config.detector.min_relative_height = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_partial_override() {
        let config = TimegrapherConfig::from_toml_str(
            r#"
            [movement]
            lift_angle = 44.0
            expected_beats_per_hour = 18000.0

            [detector]
            threshold_k = 5.0
            "#,
        )
        .unwrap();

        assert_eq!(config.movement.lift_angle, 44.0);
        assert_eq!(config.movement.expected_beats_per_hour, 18000.0);
        assert_eq!(config.detector.threshold_k, 5.0);
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.posture.labels.len(), 6);
    }

    #[test]
    fn test_toml_invalid_value_rejected() {
        let result = TimegrapherConfig::from_toml_str("[movement]\nlift_angle = -3.0\n");
        assert!(matches!(result, Err(TimegrapherError::Config(_))));
    }

    #[test]
    fn test_block_size() {
        let audio = AudioConfig::default();
        assert_eq!(audio.block_size(), 2400);
        assert_eq!(audio.ring_capacity(), 480_000);
    }
}
