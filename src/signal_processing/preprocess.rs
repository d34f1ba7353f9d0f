use super::agc::AutomaticGainControl;
use super::filters::{HighpassFilter, LowpassFilter};
use crate::config::{AgcConfig, FilterConfig};
use crate::error::Result;

/// Band-limiting and level normalisation ahead of transient detection
///
/// Highpass (rumble) → lowpass (hiss) → AGC, applied in place.
pub struct Preprocessor {
    highpass: HighpassFilter,
    lowpass: LowpassFilter,
    agc: AutomaticGainControl,
    filter_config: FilterConfig,
    sample_rate: f32,
}

impl Preprocessor {
    /// # Arguments
    /// * `filter` - Band edges and order of the highpass/lowpass pair
    /// * `agc` - Gain control settings
    /// * `sample_rate` - Audio sample rate in Hz
    pub fn new(filter: &FilterConfig, agc: &AgcConfig, sample_rate: f32) -> Result<Self> {
        Ok(Self {
            highpass: HighpassFilter::new(filter.highpass_cutoff, sample_rate, filter.order)?,
            lowpass: LowpassFilter::new(filter.lowpass_cutoff, sample_rate, filter.order)?,
            agc: AutomaticGainControl::new(agc, sample_rate),
            filter_config: filter.clone(),
            sample_rate,
        })
    }

    /// Filter and normalise `block` in place
    ///
    /// # Arguments
    /// * `block` - Consecutive raw samples; state carries over to the next call
    pub fn process(&mut self, block: &mut [f32]) {
        self.highpass.process_buffer(block);
        self.lowpass.process_buffer(block);
        self.agc.process_buffer(block);
    }

    pub fn gain(&self) -> f32 {
        self.agc.gain()
    }

    /// Clear filter state and return the AGC to unity gain
    pub fn reset(&mut self) -> Result<()> {
        let f = &self.filter_config;
        self.highpass = HighpassFilter::new(f.highpass_cutoff, self.sample_rate, f.order)?;
        self.lowpass = LowpassFilter::new(f.lowpass_cutoff, self.sample_rate, f.order)?;
        self.agc.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_removes_dc_and_rumble() {
        let mut pre =
            Preprocessor::new(&FilterConfig::default(), &AgcConfig::default(), 48000.0).unwrap();

        let mut block: Vec<f32> = (0..48000)
            .map(|i| 0.5 + 0.3 * (2.0 * PI * 30.0 * i as f32 / 48000.0).sin())
            .collect();
        pre.process(&mut block);

        let tail_peak = block[24000..].iter().fold(0.0_f32, |m, x| m.max(x.abs()));
        assert!(tail_peak < 0.05 * pre.gain().max(1.0), "residual {}", tail_peak);
    }

    #[test]
    fn test_output_stays_finite() {
        let mut pre =
            Preprocessor::new(&FilterConfig::default(), &AgcConfig::default(), 48000.0).unwrap();
        let mut block = vec![0.0_f32; 4800];
        block[100] = 1.0;
        block[2000] = -1.0;
        pre.process(&mut block);
        assert!(block.iter().all(|x| x.is_finite()));
    }
}
