use std::f32::consts::PI;

use rand::RngExt;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

use super::signal::{WatchSignalConfig, generate_watch_signal};

/// Impairments applied to a clean beat train
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NoiseConfig {
    pub seed: Option<u64>,
    pub additive: Option<AdditiveNoiseConfig>,
    pub rumble: Option<RumbleConfig>,
    pub impulse: Option<ImpulseNoiseConfig>,
    #[serde(default)]
    pub dropouts: Vec<DropoutConfig>,
}

impl NoiseConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_white_noise(mut self, rms: f32) -> Self {
        self.additive = Some(AdditiveNoiseConfig { rms });
        self
    }

    pub fn with_rumble(mut self, frequency_hz: f32, amplitude: f32) -> Self {
        self.rumble = Some(RumbleConfig {
            frequency_hz,
            amplitude,
        });
        self
    }

    pub fn with_impulse(mut self, rate_hz: f32, amplitude: f32, duration_samples: usize) -> Self {
        self.impulse = Some(ImpulseNoiseConfig {
            rate_hz,
            amplitude,
            duration_samples,
        });
        self
    }

    pub fn with_dropout(mut self, start_secs: f64, duration_secs: f64) -> Self {
        self.dropouts.push(DropoutConfig {
            start_secs,
            duration_secs,
        });
        self
    }
}

/// Gaussian white noise of fixed RMS
#[derive(Clone, Debug, Deserialize)]
pub struct AdditiveNoiseConfig {
    pub rms: f32,
}

/// Low-frequency hum, e.g. mains or handling noise
#[derive(Clone, Debug, Deserialize)]
pub struct RumbleConfig {
    pub frequency_hz: f32,
    pub amplitude: f32,
}

/// Random clicks at an average rate
#[derive(Clone, Debug, Deserialize)]
pub struct ImpulseNoiseConfig {
    pub rate_hz: f32,
    pub amplitude: f32,
    pub duration_samples: usize,
}

/// Interval of digital silence, as when the microphone loses contact
#[derive(Clone, Debug, Deserialize)]
pub struct DropoutConfig {
    pub start_secs: f64,
    pub duration_secs: f64,
}

fn create_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => rand::make_rng(),
    }
}

fn apply_additive_noise(signal: &mut [f32], config: &AdditiveNoiseConfig, rng: &mut ChaCha8Rng) {
    let Ok(normal) = Normal::new(0.0, config.rms as f64) else {
        return;
    };
    for sample in signal.iter_mut() {
        *sample += normal.sample(rng) as f32;
    }
}

fn apply_rumble(signal: &mut [f32], config: &RumbleConfig, sample_rate: f32) {
    for (i, sample) in signal.iter_mut().enumerate() {
        let t = i as f32 / sample_rate;
        *sample += config.amplitude * (2.0 * PI * config.frequency_hz * t).sin();
    }
}

fn apply_impulse_noise(
    signal: &mut [f32],
    config: &ImpulseNoiseConfig,
    sample_rate: f32,
    rng: &mut ChaCha8Rng,
) {
    let n = signal.len();
    if n == 0 || config.rate_hz <= 0.0 {
        return;
    }

    let avg_samples_between_impulses = sample_rate / config.rate_hz;

    let mut pos = 0usize;
    loop {
        let interval = (rng.random::<f32>() * 2.0 * avg_samples_between_impulses) as usize;
        pos += interval.max(1);

        if pos >= n {
            break;
        }

        let sign = if rng.random::<bool>() { 1.0 } else { -1.0 };
        let end = (pos + config.duration_samples).min(n);

        for sample in signal[pos..end].iter_mut() {
            *sample += sign * config.amplitude;
        }
    }
}

fn apply_dropout(signal: &mut [f32], config: &DropoutConfig, sample_rate: f32) {
    let fs = sample_rate as f64;
    let start = ((config.start_secs * fs) as usize).min(signal.len());
    let end = (((config.start_secs + config.duration_secs) * fs) as usize).min(signal.len());
    signal[start..end].fill(0.0);
}

/// Apply every configured impairment; dropouts are applied last so they
/// stay silent
pub fn apply_noise(clean_signal: &[f32], config: &NoiseConfig, sample_rate: f32) -> Vec<f32> {
    let mut signal = clean_signal.to_vec();
    let mut rng = create_rng(config.seed);

    if let Some(ref rumble) = config.rumble {
        apply_rumble(&mut signal, rumble, sample_rate);
    }

    if let Some(ref additive) = config.additive {
        apply_additive_noise(&mut signal, additive, &mut rng);
    }

    if let Some(ref impulse) = config.impulse {
        apply_impulse_noise(&mut signal, impulse, sample_rate, &mut rng);
    }

    for dropout in &config.dropouts {
        apply_dropout(&mut signal, dropout, sample_rate);
    }

    signal
}

pub fn generate_noisy_watch_signal(watch: &WatchSignalConfig, noise: &NoiseConfig) -> Vec<f32> {
    let clean = generate_watch_signal(watch);
    apply_noise(&clean, noise, watch.sample_rate as f32)
}
