#![allow(dead_code)]

use timegrapher::TimegrapherConfig;
use timegrapher::simulation::{
    Measurement, NoiseConfig, WatchSignalConfig, generate_noisy_watch_signal, measure_watch,
};

/// A 28800 bph watch with a little background hiss
pub fn watch(duration_secs: f64) -> WatchSignalConfig {
    WatchSignalConfig {
        duration_secs,
        ..Default::default()
    }
}

pub fn hiss(seed: u64) -> NoiseConfig {
    NoiseConfig::default().with_seed(seed).with_white_noise(0.005)
}

/// Processor settings matching `watch`, with a short settle delay
pub fn config_for(watch: &WatchSignalConfig) -> TimegrapherConfig {
    let mut config = TimegrapherConfig::default();
    config.audio.sample_rate = watch.sample_rate;
    config.movement.expected_beats_per_hour = watch.beats_per_hour;
    config.posture.settle_secs = 1.0;
    config
}

pub fn measure(watch: &WatchSignalConfig, noise: &NoiseConfig) -> Measurement {
    let signal = generate_noisy_watch_signal(watch, noise);
    measure_watch(&signal, &config_for(watch)).expect("processor should accept the config")
}
