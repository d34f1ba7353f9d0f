use crate::config::TimegrapherConfig;
use crate::error::Result;
use crate::processing::{MetricsSnapshot, TimegrapherProcessor};
use crate::timing::{CycleRecord, Polarity, TickEvent};

use super::signal::SyntheticBeat;

/// Everything a processor produced for one synthetic recording
#[derive(Debug, Clone)]
pub struct Measurement {
    pub snapshots: Vec<MetricsSnapshot>,
    /// Beats still in the processor's trailing history at the end
    pub events: Vec<TickEvent>,
    pub cycles: Vec<CycleRecord>,
}

impl Measurement {
    pub fn last(&self) -> Option<&MetricsSnapshot> {
        self.snapshots.last()
    }

    /// Final snapshot that carries a fresh estimate
    pub fn final_estimate(&self) -> Option<&MetricsSnapshot> {
        self.snapshots.iter().rev().find(|s| !s.insufficient_data)
    }
}

/// Run a fresh processor over `signal`, block by block
pub fn measure_watch(signal: &[f32], config: &TimegrapherConfig) -> Result<Measurement> {
    let mut processor = TimegrapherProcessor::new(config)?;
    let snapshots = processor.process_signal(signal);

    Ok(Measurement {
        snapshots,
        events: processor.events().copied().collect(),
        cycles: processor.cycles(),
    })
}

/// Fraction of detected beats whose label matches the nearest synthetic
/// beat within `tolerance` seconds; unmatched detections count as wrong
pub fn polarity_accuracy(events: &[TickEvent], truth: &[SyntheticBeat], tolerance: f64) -> f64 {
    if events.is_empty() {
        return 0.0;
    }

    let correct = events
        .iter()
        .filter(|e| {
            truth
                .iter()
                .find(|b| (b.time - e.timestamp).abs() <= tolerance)
                .is_some_and(|b| b.is_tick == (e.polarity == Polarity::Tick))
        })
        .count();

    correct as f64 / events.len() as f64
}

/// Largest distance from a detected beat to its synthetic counterpart
pub fn max_timing_error(events: &[TickEvent], truth: &[SyntheticBeat]) -> Option<f64> {
    events
        .iter()
        .map(|e| {
            truth
                .iter()
                .map(|b| (b.time - e.timestamp).abs())
                .fold(f64::INFINITY, f64::min)
        })
        .reduce(f64::max)
}
