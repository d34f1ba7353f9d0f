use std::collections::VecDeque;

use super::envelope::half_max_width;
use super::history::TrailingBuffer;
use super::math::parabolic_peak_offset;
use super::robust::{RobustThreshold, median};
use crate::config::DetectorConfig;

/// A local envelope maximum accepted as a tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakCandidate {
    /// Absolute stream index of the maximum envelope sample
    pub sample_index: u64,
    /// Sub-sample position of the maximum, in absolute samples
    pub position: f64,
    pub height: f32,
    pub threshold: f32,
    /// Full width at half maximum of the burst, in samples
    pub width_samples: Option<f32>,
}

/// Adaptive peak picker for the tick envelope
///
/// The threshold is `median + k × MAD` over the trailing window (≈2 s),
/// recomputed once per block so it follows slowly varying background noise.
/// A sample is a candidate when it exceeds the threshold and is the largest
/// sample within the minimum separation on either side (ties resolve to the
/// earliest). Candidates closer than the minimum separation to the
/// previously accepted peak are rejected.
///
/// A candidate must also reach `min_relative_height` times the median
/// height of the last few accepted peaks. Heights older than the threshold
/// window are forgotten, so the gate relaxes after a dropout. Until enough
/// peaks are known the reference is the largest envelope value in the
/// window instead.
///
/// Samples are only examined once enough later envelope has arrived to
/// decide local maximality, so peaks are reported with a fixed lag of
/// [`lookahead`](Self::lookahead) samples. Scanning starts once an eighth
/// of the threshold window is buffered, so the first threshold is not
/// taken from a sliver of noise.
pub struct AdaptivePeakPicker {
    history: TrailingBuffer,
    window_samples: usize,
    warmup_samples: usize,
    separation: usize,
    lookahead: usize,
    k: f32,
    min_relative_height: f32,
    recent_heights: VecDeque<(u64, f32)>,
    scan_from: u64,
    last_position: Option<f64>,
    current: Option<RobustThreshold>,
}

/// Accepted peaks kept for the relative height gate
const RECENT_PEAKS: usize = 5;

/// The relative gate only applies once this many peaks are known
const MIN_PEAKS_FOR_GATE: usize = 3;

impl AdaptivePeakPicker {
    /// Create a picker for an envelope at `sample_rate`
    ///
    /// # Arguments
    /// * `config` - Threshold window, `k`, relative height gate and minimum separation
    /// * `sample_rate` - Envelope sample rate in Hz
    ///
    /// The lookahead covers both the separation and the polarity window, so
    /// the raw signal around a reported peak has always been seen.
    pub fn new(config: &DetectorConfig, sample_rate: f32) -> Self {
        let to_samples = |ms: f32| (ms * sample_rate / 1000.0).round() as usize;

        let window_samples = ((config.threshold_window_secs * sample_rate) as usize).max(1);
        let separation = to_samples(config.min_tick_separation_ms).max(1);
        let lookahead = separation.max(to_samples(config.polarity_window_ms)) + 1;

        Self {
            history: TrailingBuffer::new(window_samples + 2 * lookahead),
            window_samples,
            warmup_samples: window_samples / 8,
            separation,
            lookahead,
            k: config.threshold_k,
            min_relative_height: config.min_relative_height,
            recent_heights: VecDeque::with_capacity(RECENT_PEAKS),
            scan_from: 0,
            last_position: None,
            current: None,
        }
    }

    /// Consume an envelope block starting at absolute index `start_index`
    ///
    /// # Returns
    /// Peaks confirmed by this block, in stream order. A peak near the end
    /// of the block is reported by a later call once its lookahead arrives.
    pub fn process(&mut self, start_index: u64, envelope: &[f32]) -> Vec<PeakCandidate> {
        if !self.history.extend(start_index, envelope) {
            log::debug!("Envelope discontinuity at sample {}, restarting scan", start_index);
            self.scan_from = start_index;
            self.last_position = None;
            self.recent_heights.clear();
        }

        self.current = RobustThreshold::from_samples(self.history.tail(self.window_samples), self.k);
        let Some(threshold) = self.current else {
            return Vec::new();
        };
        if self.history.len() < self.warmup_samples {
            return Vec::new();
        }

        let scan_end = self
            .history
            .end_index()
            .saturating_sub(self.lookahead as u64);
        let mut peaks = Vec::new();

        let mut i = self.scan_from.max(self.history.start_index());
        while i < scan_end {
            if let Some(peak) = self.candidate_at(i, &threshold) {
                let too_close = self
                    .last_position
                    .is_some_and(|last| peak.position - last < self.separation as f64);
                if too_close {
                    log::trace!("Refractory rejection at sample {}", i);
                } else if peak.height < self.height_gate(i) {
                    log::trace!(
                        "Peak at sample {} too small ({:.3e}) next to recent beats",
                        i,
                        peak.height
                    );
                } else {
                    self.last_position = Some(peak.position);
                    self.remember_height(i, peak.height);
                    peaks.push(peak);
                    // Nothing within the separation can be another maximum
                    i += self.separation as u64;
                    continue;
                }
            }
            i += 1;
        }

        self.scan_from = self.scan_from.max(scan_end);
        peaks
    }

    fn candidate_at(&self, i: u64, threshold: &RobustThreshold) -> Option<PeakCandidate> {
        let value = self.history.get(i)?;
        if value <= threshold.threshold {
            return None;
        }

        let sep = self.separation as u64;
        let lo = i.saturating_sub(sep).max(self.history.start_index());
        if self.history.range(lo, i)?.any(|v| v >= value) {
            return None;
        }
        if self.history.range(i + 1, i + sep + 1)?.any(|v| v > value) {
            return None;
        }

        let before = self.history.get(i.wrapping_sub(1)).unwrap_or(value);
        let after = self.history.get(i + 1).unwrap_or(value);
        let offset = parabolic_peak_offset(before, value, after);

        Some(PeakCandidate {
            sample_index: i,
            position: i as f64 + offset as f64,
            height: value,
            threshold: threshold.threshold,
            width_samples: self.burst_width(i, threshold.median),
        })
    }

    fn height_gate(&mut self, i: u64) -> f32 {
        let window = self.window_samples as u64;
        while let Some(&(index, _)) = self.recent_heights.front() {
            if index + window >= i {
                break;
            }
            self.recent_heights.pop_front();
        }

        let reference = if self.recent_heights.len() < MIN_PEAKS_FOR_GATE {
            self.history
                .tail(self.window_samples)
                .fold(0.0_f32, f32::max)
        } else {
            let heights: Vec<f64> = self.recent_heights.iter().map(|&(_, h)| h as f64).collect();
            median(&heights).unwrap_or(0.0) as f32
        };
        self.min_relative_height * reference
    }

    fn remember_height(&mut self, i: u64, height: f32) {
        if self.recent_heights.len() == RECENT_PEAKS {
            self.recent_heights.pop_front();
        }
        self.recent_heights.push_back((i, height));
    }

    fn burst_width(&self, i: u64, baseline: f32) -> Option<f32> {
        let limit = (self.lookahead - 1) as u64;
        let lo = i.saturating_sub(limit).max(self.history.start_index());
        let hi = (i + limit + 1).min(self.history.end_index());
        let window: Vec<f32> = self.history.range(lo, hi)?.collect();
        half_max_width(&window, (i - lo) as usize, baseline, limit as usize)
    }

    /// Current robust threshold, once any envelope has been seen
    pub fn threshold(&self) -> Option<RobustThreshold> {
        self.current
    }

    /// Median envelope level over the trailing window
    pub fn noise_floor(&self) -> Option<f32> {
        self.current.map(|t| t.median)
    }

    pub fn separation(&self) -> usize {
        self.separation
    }

    pub fn lookahead(&self) -> usize {
        self.lookahead
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.scan_from = 0;
        self.last_position = None;
        self.current = None;
        self.recent_heights.clear();
    }
}
