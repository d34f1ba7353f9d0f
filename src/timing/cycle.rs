use serde::Serialize;

use super::polarity::{Polarity, TickEvent};

/// One full oscillation: tick, the tock that follows, and the next tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CycleRecord {
    pub tick_time: f64,
    pub tock_time: f64,
    pub next_tick_time: f64,
    /// `next_tick_time - tick_time`, seconds
    pub period: f64,
    /// `(tock_time - tick_time) - period / 2`, seconds
    pub beat_error: f64,
}

impl CycleRecord {
    /// Build a record, or `None` unless `tick < tock < next_tick`
    pub fn new(tick_time: f64, tock_time: f64, next_tick_time: f64) -> Option<Self> {
        if !(tick_time < tock_time && tock_time < next_tick_time) {
            return None;
        }
        let period = next_tick_time - tick_time;
        Some(Self {
            tick_time,
            tock_time,
            next_tick_time,
            period,
            beat_error: (tock_time - tick_time) - period / 2.0,
        })
    }
}

/// Pairs labelled beats into oscillation cycles
///
/// For each tick, the first tock after it and the first tick after that
/// tock form one cycle. A tick with no tock before the following tick, or a
/// cycle longer than the search window, yields nothing: gaps and
/// misclassified beats cost cycles, never errors.
pub struct CycleReconstructor {
    max_period: f64,
}

/// Longest accepted cycle, in nominal cycle periods
const SEARCH_WINDOW_CYCLES: f64 = 1.5;

impl CycleReconstructor {
    /// # Arguments
    /// * `beat_interval` - Nominal seconds between beats; cycles longer than
    ///   1.5 nominal periods are discarded
    pub fn new(beat_interval: f64) -> Self {
        let mut reconstructor = Self { max_period: 0.0 };
        reconstructor.set_beat_interval(beat_interval);
        reconstructor
    }

    pub fn set_beat_interval(&mut self, beat_interval: f64) {
        self.max_period = SEARCH_WINDOW_CYCLES * 2.0 * beat_interval;
    }

    pub fn max_period(&self) -> f64 {
        self.max_period
    }

    /// Cycles in `events`, which must be in time order
    ///
    /// # Returns
    /// One record per pair of consecutive ticks with a tock between them
    /// and no more than [`max_period`](Self::max_period) apart, in time order
    pub fn reconstruct(&self, events: &[TickEvent]) -> Vec<CycleRecord> {
        let ticks: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.polarity == Polarity::Tick)
            .map(|(i, _)| i)
            .collect();

        ticks
            .windows(2)
            .filter_map(|pair| {
                let (start, next) = (pair[0], pair[1]);
                let tock = events[start + 1..next]
                    .iter()
                    .find(|e| e.polarity == Polarity::Tock)?;
                let record = CycleRecord::new(
                    events[start].timestamp,
                    tock.timestamp,
                    events[next].timestamp,
                )?;
                (record.period <= self.max_period).then_some(record)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn event(timestamp: f64, polarity: Polarity) -> TickEvent {
        TickEvent {
            timestamp,
            polarity,
            sample_index: (timestamp * 48000.0) as u64,
            height: 1.0,
            lift_time: None,
        }
    }

    fn alternating(times: &[f64]) -> Vec<TickEvent> {
        times
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                let p = if i % 2 == 0 { Polarity::Tick } else { Polarity::Tock };
                event(t, p)
            })
            .collect()
    }

    #[test]
    fn test_record_invariants() {
        assert!(CycleRecord::new(1.0, 1.0, 2.0).is_none());
        assert!(CycleRecord::new(1.0, 2.5, 2.0).is_none());

        let r = CycleRecord::new(1.0, 1.127, 1.25).unwrap();
        assert_relative_eq!(r.period, 0.25);
        assert_relative_eq!(r.beat_error, 0.002, epsilon = 1e-12);
    }

    #[test]
    fn test_regular_sequence() {
        let times: Vec<f64> = (0..9).map(|i| i as f64 * 0.125).collect();
        let cycles = CycleReconstructor::new(0.125).reconstruct(&alternating(&times));

        assert_eq!(cycles.len(), 4);
        for c in &cycles {
            assert_relative_eq!(c.period, 0.25, epsilon = 1e-12);
            assert_relative_eq!(c.beat_error, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_missing_tock_discards_cycle() {
        let events = vec![
            event(0.0, Polarity::Tick),
            event(0.125, Polarity::Tock),
            event(0.25, Polarity::Tick),
            // tock at 0.375 lost
            event(0.5, Polarity::Tick),
            event(0.625, Polarity::Tock),
            event(0.75, Polarity::Tick),
        ];
        let cycles = CycleReconstructor::new(0.125).reconstruct(&events);

        assert_eq!(cycles.len(), 2);
        assert_relative_eq!(cycles[0].tick_time, 0.0);
        assert_relative_eq!(cycles[1].tick_time, 0.5);
    }

    #[test]
    fn test_gap_beyond_search_window_discarded() {
        let events = vec![
            event(0.0, Polarity::Tick),
            event(0.125, Polarity::Tock),
            event(2.0, Polarity::Tick),
            event(2.125, Polarity::Tock),
            event(2.25, Polarity::Tick),
        ];
        let cycles = CycleReconstructor::new(0.125).reconstruct(&events);

        assert_eq!(cycles.len(), 1);
        assert_relative_eq!(cycles[0].tick_time, 2.0);
    }

    #[test]
    fn test_every_record_is_ordered() {
        // Misclassified beats scattered through the sequence
        let pattern = [
            Polarity::Tick,
            Polarity::Tock,
            Polarity::Tock,
            Polarity::Tick,
            Polarity::Tick,
            Polarity::Tock,
            Polarity::Tick,
            Polarity::Tock,
            Polarity::Tick,
        ];
        let events: Vec<TickEvent> = pattern
            .iter()
            .enumerate()
            .map(|(i, &p)| event(i as f64 * 0.125, p))
            .collect();

        for c in CycleReconstructor::new(0.125).reconstruct(&events) {
            assert!(c.period > 0.0);
            assert!(c.tick_time < c.tock_time && c.tock_time < c.next_tick_time);
        }
    }
}
