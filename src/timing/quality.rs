use std::collections::VecDeque;

use rolling_stats::Stats;
use serde::Serialize;

use super::polarity::TickEvent;
use crate::config::QualityConfig;
use crate::constants::MIN_ENVELOPE_THRESHOLD;
use crate::signal_processing::median;

/// Beats considered when estimating signal-to-noise ratio
const SNR_BEATS: usize = 32;

/// Minimum number of intervals before the observed median replaces the
/// nominal beat interval as the dropout reference
const MIN_INTERVALS_FOR_MEDIAN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityReport {
    pub stability_ok: bool,
    pub rate_std_dev: Option<f64>,
    pub dropouts: usize,
    pub dropouts_ok: bool,
    pub snr_db: Option<f64>,
    pub snr_ok: bool,
}

/// Stability, dropout and signal-to-noise flags
///
/// Flags never stop the measurement; they tell the consumer how far to
/// trust the current numbers.
pub struct QualityMonitor {
    rates: VecDeque<f64>,
    window: usize,
    stability_threshold: f64,
    gap_factor: f64,
    max_dropouts: usize,
    min_snr_db: f64,
}

impl QualityMonitor {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            rates: VecDeque::with_capacity(config.stability_window),
            window: config.stability_window,
            stability_threshold: config.stability_threshold,
            gap_factor: config.dropout_gap_factor,
            max_dropouts: config.max_dropouts,
            min_snr_db: config.min_snr_db,
        }
    }

    /// Record a rate estimate; call once per newly completed cycle
    pub fn record_rate(&mut self, rate_seconds_per_day: f64) {
        if self.rates.len() == self.window {
            self.rates.pop_front();
        }
        self.rates.push_back(rate_seconds_per_day);
    }

    /// Standard deviation of the last `stability_window` rate estimates
    pub fn rate_std_dev(&self) -> Option<f64> {
        if self.rates.len() < 2 {
            return None;
        }
        let mut stats: Stats<f64> = Stats::new();
        for &rate in &self.rates {
            stats.update(rate);
        }
        Some(stats.std_dev)
    }

    pub fn stability_ok(&self) -> bool {
        self.rates.len() >= self.window
            && self
                .rate_std_dev()
                .is_some_and(|sd| sd < self.stability_threshold)
    }

    /// Count beats that arrived after an abnormally long gap
    ///
    /// A gap is abnormal when it exceeds `dropout_gap_factor` times the
    /// median cycle period, i.e. twice the median inter-beat interval (the
    /// nominal interval until enough beats are known). A single missed beat
    /// leaves a gap of one period and is not a dropout. The still-open gap
    /// since the last beat, or since `since` if there is none, counts once
    /// per elapsed abnormal gap length so that silence is flagged while it
    /// lasts.
    ///
    /// # Arguments
    /// * `events` - Beats in stream order
    /// * `now` - Current stream time in seconds
    /// * `since` - Start of the session, for the gap before the first beat
    /// * `nominal_interval` - Expected beat interval in seconds
    pub fn count_dropouts(
        &self,
        events: &[TickEvent],
        now: f64,
        since: f64,
        nominal_interval: f64,
    ) -> usize {
        let gaps: Vec<f64> = events
            .windows(2)
            .map(|w| w[1].timestamp - w[0].timestamp)
            .collect();

        let reference = if gaps.len() >= MIN_INTERVALS_FOR_MEDIAN {
            median(&gaps).unwrap_or(nominal_interval)
        } else {
            nominal_interval
        };
        let limit = self.gap_factor * 2.0 * reference;
        if limit <= 0.0 {
            return 0;
        }

        let closed = gaps.iter().filter(|&&g| g > limit).count();

        let last = events.last().map_or(since, |e| e.timestamp);
        let open = ((now - last) / limit).floor().max(0.0) as usize;

        closed + open
    }

    /// Median recent beat height over the envelope noise floor, in dB
    pub fn snr_db(&self, events: &[TickEvent], noise_floor: Option<f32>) -> Option<f64> {
        let floor = noise_floor?.max(MIN_ENVELOPE_THRESHOLD) as f64;
        let heights: Vec<f64> = events
            .iter()
            .rev()
            .take(SNR_BEATS)
            .map(|e| e.height as f64)
            .collect();
        let signal = median(&heights)?;
        Some(20.0 * (signal / floor).log10())
    }

    /// Evaluate every flag for the current state
    ///
    /// # Arguments
    /// * `events` - Beats in stream order
    /// * `now` - Current stream time in seconds
    /// * `since` - Start of the session in seconds
    /// * `nominal_interval` - Expected beat interval in seconds
    /// * `noise_floor` - Median envelope level, if known
    pub fn assess(
        &self,
        events: &[TickEvent],
        now: f64,
        since: f64,
        nominal_interval: f64,
        noise_floor: Option<f32>,
    ) -> QualityReport {
        let dropouts = self.count_dropouts(events, now, since, nominal_interval);
        let snr_db = self.snr_db(events, noise_floor);

        QualityReport {
            stability_ok: self.stability_ok(),
            rate_std_dev: self.rate_std_dev(),
            dropouts,
            dropouts_ok: dropouts <= self.max_dropouts,
            snr_db,
            snr_ok: snr_db.is_some_and(|snr| snr >= self.min_snr_db),
        }
    }

    pub fn reset(&mut self) {
        self.rates.clear();
    }
}
