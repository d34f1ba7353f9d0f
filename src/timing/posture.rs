use serde::Serialize;

use super::metrics::Estimate;
use crate::config::PostureConfig;
use crate::constants::MAX_POSTURES;
use crate::error::{Result, TimegrapherError};

/// Smoothed readings stored for one posture
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PostureReading {
    pub rate_seconds_per_day: f64,
    pub amplitude_deg: Option<f64>,
    pub beat_error_ms: f64,
    pub updates: usize,
}

impl PostureReading {
    fn first(estimate: &Estimate) -> Self {
        Self {
            rate_seconds_per_day: estimate.rate_seconds_per_day,
            amplitude_deg: estimate.amplitude_deg,
            beat_error_ms: estimate.beat_error_ms,
            updates: 1,
        }
    }

    fn blend(&mut self, estimate: &Estimate, weight: f64) {
        let ema = |old: f64, new: f64| weight * new + (1.0 - weight) * old;

        self.rate_seconds_per_day = ema(self.rate_seconds_per_day, estimate.rate_seconds_per_day);
        self.beat_error_ms = ema(self.beat_error_ms, estimate.beat_error_ms);
        self.amplitude_deg = match (self.amplitude_deg, estimate.amplitude_deg) {
            (Some(old), Some(new)) => Some(ema(old, new)),
            (old, new) => new.or(old),
        };
        self.updates += 1;
    }
}

/// Per-posture smoothed metrics across the fixed orientation slots
///
/// Selecting a posture clears that slot and starts a settle delay measured
/// in stream time. Estimates arriving before the delay has elapsed are not
/// trusted and leave the slot untouched.
pub struct PostureAggregator {
    labels: Vec<String>,
    slots: Vec<Option<PostureReading>>,
    current: usize,
    settle_secs: f64,
    weight: f64,
    settled_at: f64,
}

impl PostureAggregator {
    /// # Arguments
    /// * `config` - Posture labels, initial posture, settle delay and smoothing weight
    /// * `now` - Stream time in seconds; the settle delay starts here
    ///
    /// # Returns
    /// An error if there are no labels, too many, or the initial posture is
    /// out of range
    pub fn new(config: &PostureConfig, now: f64) -> Result<Self> {
        let count = config.labels.len();
        if count == 0 || count > MAX_POSTURES {
            return Err(TimegrapherError::Config(format!(
                "expected 1 to {} posture labels, got {}",
                MAX_POSTURES, count
            )));
        }
        if config.initial >= count {
            return Err(TimegrapherError::InvalidPosture {
                index: config.initial,
                count,
            });
        }

        Ok(Self {
            labels: config.labels.clone(),
            slots: vec![None; count],
            current: config.initial,
            settle_secs: config.settle_secs,
            weight: config.smoothing_weight,
            settled_at: now + config.settle_secs,
        })
    }

    /// Switch to posture `index`, clearing its slot and restarting the
    /// settle delay. Out-of-range indices are rejected and change nothing.
    pub fn set_posture(&mut self, index: usize, now: f64) -> Result<()> {
        if index >= self.labels.len() {
            return Err(TimegrapherError::InvalidPosture {
                index,
                count: self.labels.len(),
            });
        }

        self.current = index;
        self.slots[index] = None;
        self.begin_settle(now);
        log::info!("Posture set to {} ({})", index, self.labels[index]);
        Ok(())
    }

    /// Restart the settle delay without changing posture
    pub fn begin_settle(&mut self, now: f64) {
        self.settled_at = now + self.settle_secs;
    }

    pub fn is_settled(&self, now: f64) -> bool {
        now >= self.settled_at
    }

    /// Stream time at which the current posture's readings become valid
    pub fn settled_at(&self) -> f64 {
        self.settled_at
    }

    /// Fold an estimate into the current slot; returns whether it was used
    pub fn update(&mut self, now: f64, estimate: &Estimate) -> bool {
        if !self.is_settled(now) {
            return false;
        }

        let slot = &mut self.slots[self.current];
        match slot {
            Some(reading) => reading.blend(estimate, self.weight),
            None => *slot = Some(PostureReading::first(estimate)),
        }
        true
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn current_label(&self) -> &str {
        &self.labels[self.current]
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn reading(&self, index: usize) -> Option<&PostureReading> {
        self.slots.get(index)?.as_ref()
    }

    pub fn current_reading(&self) -> Option<&PostureReading> {
        self.reading(self.current)
    }

    /// Every slot with its label, in slot order
    pub fn readings(&self) -> impl Iterator<Item = (&str, Option<&PostureReading>)> {
        self.labels
            .iter()
            .zip(&self.slots)
            .map(|(label, slot)| (label.as_str(), slot.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn estimate(rate: f64) -> Estimate {
        Estimate {
            period: 0.25,
            observed_beats_per_hour: 28800.0,
            rate_seconds_per_day: rate,
            beat_error_ms: 0.5,
            amplitude_deg: Some(10.0),
            lift_time_ms: Some(3.0),
            cycles_used: 50,
        }
    }

    fn aggregator() -> PostureAggregator {
        PostureAggregator::new(&PostureConfig::default(), 0.0).unwrap()
    }

    #[test]
    fn test_ignores_estimates_while_settling() {
        let mut agg = aggregator();
        assert!(!agg.update(5.0, &estimate(3.0)));
        assert!(agg.current_reading().is_none());

        assert!(agg.update(10.0, &estimate(3.0)));
        assert_relative_eq!(agg.current_reading().unwrap().rate_seconds_per_day, 3.0);
    }

    #[test]
    fn test_exponential_smoothing() {
        let mut agg = aggregator();
        agg.update(11.0, &estimate(10.0));
        agg.update(11.1, &estimate(0.0));

        let r = agg.current_reading().unwrap();
        assert_relative_eq!(r.rate_seconds_per_day, 8.0, epsilon = 1e-12);
        assert_eq!(r.updates, 2);
    }

    #[test]
    fn test_set_posture_resets_slot_and_settles() {
        let mut agg = aggregator();
        agg.update(11.0, &estimate(5.0));

        agg.set_posture(0, 20.0).unwrap();
        assert!(agg.current_reading().is_none());
        assert!(!agg.is_settled(29.9));
        assert!(agg.is_settled(30.0));
    }

    #[test]
    fn test_other_slots_kept() {
        let mut agg = aggregator();
        agg.update(11.0, &estimate(5.0));
        agg.set_posture(2, 12.0).unwrap();

        assert!(agg.reading(0).is_some());
        assert_eq!(agg.current(), 2);
        assert_eq!(agg.current_label(), "Crown up");
    }

    #[test]
    fn test_invalid_posture_rejected() {
        let mut agg = aggregator();
        agg.set_posture(1, 0.0).unwrap();

        let err = agg.set_posture(6, 1.0).unwrap_err();
        assert!(matches!(
            err,
            TimegrapherError::InvalidPosture { index: 6, count: 6 }
        ));
        assert_eq!(agg.current(), 1);
        // Settle delay still runs from the accepted change
        assert!(agg.is_settled(10.0));
    }
}
