use crate::config::AgcConfig;
use crate::constants::MIN_RMS_THRESHOLD;

/// Automatic gain control for the tick signal
///
/// Measures RMS over fixed windows and moves a target gain towards
/// `target_rms / rms` by exponential smoothing. Target gain falls with the
/// attack time constant and rises with the (slower) release time constant.
///
/// The applied gain never steps: after each window it ramps linearly,
/// sample by sample, to the new target over the following window. A step
/// in gain would show up as a transient in the envelope.
///
/// The target is clamped to `[min_gain, max_gain]` and held unchanged while
/// the measured RMS is below [`MIN_RMS_THRESHOLD`].
pub struct AutomaticGainControl {
    target_rms: f32,
    attack_coeff: f32,
    release_coeff: f32,
    min_gain: f32,
    max_gain: f32,
    gain: f32,
    target_gain: f32,
    step: f32,
    ramp_remaining: usize,
    window_size: usize,
    energy: f64,
    count: usize,
}

impl AutomaticGainControl {
    /// Create a gain control starting at unity gain
    ///
    /// # Arguments
    /// * `config` - Target level, time constants, measurement window and gain range
    /// * `sample_rate` - Sample rate in Hz, used to size the measurement window
    pub fn new(config: &AgcConfig, sample_rate: f32) -> Self {
        let window_size = ((sample_rate * config.measurement_window_ms / 1000.0) as usize).max(1);

        Self {
            target_rms: config.target_rms,
            attack_coeff: smoothing_coeff(config.attack_time_ms, config.measurement_window_ms),
            release_coeff: smoothing_coeff(config.release_time_ms, config.measurement_window_ms),
            min_gain: config.min_gain,
            max_gain: config.max_gain,
            gain: 1.0,
            target_gain: 1.0,
            step: 0.0,
            ramp_remaining: 0,
            window_size,
            energy: 0.0,
            count: 0,
        }
    }

    /// Scale a block in place
    ///
    /// The RMS is measured on the unscaled input. Gain state carries over
    /// between calls, so a stream may be fed in blocks of any size.
    pub fn process_buffer(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            self.energy += (*sample as f64) * (*sample as f64);
            self.count += 1;

            if self.ramp_remaining > 0 {
                self.ramp_remaining -= 1;
                self.gain = if self.ramp_remaining == 0 {
                    self.target_gain
                } else {
                    self.gain + self.step
                };
            }
            *sample *= self.gain;

            if self.count >= self.window_size {
                let rms = (self.energy / self.count as f64).sqrt() as f32;
                self.energy = 0.0;
                self.count = 0;
                self.update_target(rms);
            }
        }
    }

    fn update_target(&mut self, rms: f32) {
        if rms <= MIN_RMS_THRESHOLD {
            return;
        }

        let desired = self.target_rms / rms;
        let coeff = if desired < self.target_gain {
            self.attack_coeff
        } else {
            self.release_coeff
        };

        self.target_gain = (coeff * self.target_gain + (1.0 - coeff) * desired)
            .clamp(self.min_gain, self.max_gain);
        self.ramp_remaining = self.window_size;
        self.step = (self.target_gain - self.gain) / self.window_size as f32;
    }

    /// Gain applied to the most recent sample
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Gain the ramp is heading for
    pub fn target_gain(&self) -> f32 {
        self.target_gain
    }

    pub fn reset(&mut self) {
        self.gain = 1.0;
        self.target_gain = 1.0;
        self.step = 0.0;
        self.ramp_remaining = 0;
        self.energy = 0.0;
        self.count = 0;
    }
}

fn smoothing_coeff(time_constant_ms: f32, window_ms: f32) -> f32 {
    (-window_ms / time_constant_ms).exp()
}
