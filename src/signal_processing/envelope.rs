use super::math::MovingAverage;

/// Transient enhancer turning the filtered signal into a tick envelope
///
/// Each output sample is the moving average of `|x[n] - x[n-1]|` over
/// roughly `smoothing_ms`. A tick's sharp onset gives a brief, large
/// derivative; averaging suppresses isolated single-sample spikes.
///
/// The average is trailing, so envelope features lag the signal by
/// [`delay_samples`](Self::delay_samples). Output has one sample per input
/// sample.
pub struct TransientDetector {
    smoother: MovingAverage,
    previous: Option<f32>,
}

impl TransientDetector {
    /// # Arguments
    /// * `smoothing_ms` - Length of the moving average in milliseconds,
    ///   rounded up to an odd number of samples
    /// * `sample_rate` - Sample rate in Hz
    pub fn new(smoothing_ms: f32, sample_rate: f32) -> Self {
        // Odd length gives an integer group delay
        let len = ((smoothing_ms * sample_rate / 1000.0).round() as usize).max(1) | 1;
        Self {
            smoother: MovingAverage::new(len),
            previous: None,
        }
    }

    /// Envelope of `block`
    ///
    /// # Returns
    /// One envelope sample per input sample
    pub fn process(&mut self, block: &[f32]) -> Vec<f32> {
        block
            .iter()
            .map(|&x| {
                let diff = match self.previous {
                    Some(prev) => x - prev,
                    None => 0.0,
                };
                self.previous = Some(x);
                self.smoother.add(diff.abs())
            })
            .collect()
    }

    /// Group delay of the smoothing stage in samples
    pub fn delay_samples(&self) -> usize {
        (self.smoother.window_size() - 1) / 2
    }

    pub fn reset(&mut self) {
        self.smoother.reset();
        self.previous = None;
    }
}

/// Full width at half maximum of an envelope burst, in samples
///
/// `peak` indexes the burst maximum in `envelope`; `baseline` is the
/// background level, so the half-maximum level is measured above it. The
/// search extends at most `limit` samples either side of the peak. Edges are
/// linearly interpolated between the samples straddling the half level.
/// Returns `None` if the envelope does not fall to half height within the
/// search range.
pub fn half_max_width(envelope: &[f32], peak: usize, baseline: f32, limit: usize) -> Option<f32> {
    let peak_value = *envelope.get(peak)?;
    if peak_value <= baseline {
        return None;
    }
    let half = baseline + 0.5 * (peak_value - baseline);

    let crossing = |outer: usize, inner: usize| -> f32 {
        let (a, b) = (envelope[outer], envelope[inner]);
        let span = b - a;
        if span.abs() < f32::EPSILON {
            0.0
        } else {
            (half - a) / span
        }
    };

    let lo = peak.saturating_sub(limit);
    let left = (lo..peak)
        .rev()
        .find(|&i| envelope[i] < half)
        .map(|i| i as f32 + crossing(i, i + 1))?;

    let hi = (peak + limit).min(envelope.len() - 1);
    let right = (peak + 1..=hi)
        .find(|&i| envelope[i] < half)
        .map(|i| i as f32 - crossing(i, i - 1))?;

    Some(right - left)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_is_non_negative_and_same_length() {
        let mut detector = TransientDetector::new(2.0, 48000.0);
        let block: Vec<f32> = (0..1000).map(|i| ((i * 7919) % 13) as f32 - 6.0).collect();
        let env = detector.process(&block);

        assert_eq!(env.len(), block.len());
        assert!(env.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_impulse_produces_delayed_plateau() {
        let mut detector = TransientDetector::new(2.0, 48000.0);
        assert_eq!(detector.delay_samples(), 48);

        let mut signal = vec![0.0; 400];
        signal[100] = 1.0;
        let env = detector.process(&signal);

        // A unit impulse gives two derivative spikes of 1 each
        let peak = env.iter().cloned().fold(0.0_f32, f32::max);
        assert!((peak - 2.0 / 97.0).abs() < 1e-6);
        assert_eq!(env[99], 0.0);
        assert!(env[150] > 0.0);
        assert_eq!(env[300], 0.0);
    }

    #[test]
    fn test_state_carries_across_blocks() {
        let signal: Vec<f32> = (0..600).map(|i| (i as f32 * 0.05).sin()).collect();

        let mut whole = TransientDetector::new(1.0, 48000.0);
        let expected = whole.process(&signal);

        let mut split = TransientDetector::new(1.0, 48000.0);
        let mut actual = split.process(&signal[..250]);
        actual.extend(split.process(&signal[250..]));

        for (a, b) in expected.iter().zip(&actual) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_half_max_width_triangle() {
        // Triangle rising 0..10 then falling, peak 10 at index 10
        let env: Vec<f32> = (0..=20).map(|i| 10.0 - (i as f32 - 10.0).abs()).collect();
        let width = half_max_width(&env, 10, 0.0, 20).unwrap();
        assert!((width - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_half_max_width_respects_limit() {
        let env: Vec<f32> = (0..=20).map(|i| 10.0 - (i as f32 - 10.0).abs()).collect();
        assert!(half_max_width(&env, 10, 0.0, 3).is_none());
    }
}
