use crate::error::{Result, TimegrapherError};
use iir_filters::filter::{DirectForm2Transposed, Filter};
use iir_filters::filter_design::{FilterType, butter};
use iir_filters::sos::zpk2sos;

fn design(order: usize, filter_type: FilterType, sample_rate: f32) -> Result<DirectForm2Transposed> {
    let zpk = butter(order as u32, filter_type, sample_rate as f64)
        .map_err(|e| TimegrapherError::FilterDesign(format!("{:?}", e)))?;

    // Second-order sections keep the cascade stable at low cutoffs
    let sos =
        zpk2sos(&zpk, None).map_err(|e| TimegrapherError::FilterDesign(format!("{:?}", e)))?;

    Ok(DirectForm2Transposed::new(&sos))
}

/// Butterworth highpass filter removing sub-audio rumble and handling noise
pub struct HighpassFilter {
    filter: DirectForm2Transposed,
}

impl HighpassFilter {
    /// Design a highpass filter
    ///
    /// # Arguments
    /// * `cutoff_hz` - -3 dB corner frequency in Hz
    /// * `sample_rate` - Audio sample rate in Hz
    /// * `order` - Butterworth order
    ///
    /// # Returns
    /// An error if the cutoff is outside the design range of the filter
    pub fn new(cutoff_hz: f32, sample_rate: f32, order: usize) -> Result<Self> {
        Ok(Self {
            filter: design(order, FilterType::HighPass(cutoff_hz as f64), sample_rate)?,
        })
    }

    pub fn process(&mut self, sample: f32) -> f32 {
        self.filter.filter(sample as f64) as f32
    }

    pub fn process_buffer(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process(*sample);
        }
    }
}

/// Butterworth lowpass filter removing hiss above the tick band
pub struct LowpassFilter {
    filter: DirectForm2Transposed,
}

impl LowpassFilter {
    /// Design a lowpass filter
    ///
    /// # Arguments
    /// * `cutoff_hz` - -3 dB corner frequency in Hz
    /// * `sample_rate` - Audio sample rate in Hz
    /// * `order` - Butterworth order
    pub fn new(cutoff_hz: f32, sample_rate: f32, order: usize) -> Result<Self> {
        Ok(Self {
            filter: design(order, FilterType::LowPass(cutoff_hz as f64), sample_rate)?,
        })
    }

    pub fn process(&mut self, sample: f32) -> f32 {
        self.filter.filter(sample as f64) as f32
    }

    pub fn process_buffer(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process(*sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(freq_hz: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq_hz * i as f32 / sample_rate).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|x| x * x).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_filter_design() {
        assert!(HighpassFilter::new(200.0, 48000.0, 2).is_ok());
        assert!(LowpassFilter::new(5000.0, 48000.0, 2).is_ok());
    }

    #[test]
    fn test_highpass_rejects_rumble() {
        let mut filter = HighpassFilter::new(200.0, 48000.0, 2).unwrap();
        let mut signal = tone(20.0, 48000.0, 48000);
        filter.process_buffer(&mut signal);

        let attenuation_db = 20.0 * (rms(&signal[24000..]) / (1.0 / 2.0_f32.sqrt())).log10();
        assert!(
            attenuation_db < -30.0,
            "20 Hz rumble not attenuated: {} dB",
            attenuation_db
        );
    }

    #[test]
    fn test_lowpass_passes_tick_band() {
        let mut filter = LowpassFilter::new(5000.0, 48000.0, 2).unwrap();
        let mut signal = tone(2500.0, 48000.0, 9600);
        filter.process_buffer(&mut signal);

        let attenuation_db = 20.0 * (rms(&signal[4800..]) / (1.0 / 2.0_f32.sqrt())).log10();
        assert!(
            attenuation_db > -3.0,
            "Passband too attenuated: {} dB",
            attenuation_db
        );
    }

    #[test]
    fn test_filters_stay_bounded() {
        let mut hp = HighpassFilter::new(200.0, 48000.0, 2).unwrap();
        let mut lp = LowpassFilter::new(5000.0, 48000.0, 2).unwrap();

        // Full-scale square wave is the worst bounded input for overshoot
        for i in 0..96000 {
            let x = if (i / 37) % 2 == 0 { 1.0 } else { -1.0 };
            let y = lp.process(hp.process(x));
            assert!(y.is_finite() && y.abs() < 4.0);
        }
    }
}
