use std::f64::consts::PI;

use serde::Deserialize;

use crate::constants::SECONDS_PER_DAY;

/// Synthetic escapement recording
///
/// Beats alternate tick, tock. Each beat is a Gaussian-windowed sine burst
/// plus a weaker echo burst; a tick's echo trails the main burst and a
/// tock's echo leads it. Odd (tock) beats are displaced by the beat error.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WatchSignalConfig {
    pub sample_rate: u32,
    pub beats_per_hour: f64,
    /// Rate error relative to `beats_per_hour`, positive for a fast watch
    pub rate_seconds_per_day: f64,
    pub beat_error_ms: f64,
    pub duration_secs: f64,
    pub amplitude: f32,
    pub carrier_hz: f64,
    pub burst_sigma_ms: f64,
    pub echo_delay_ms: f64,
    pub echo_ratio: f32,
    /// Time of the first beat
    pub start_secs: f64,
}

impl Default for WatchSignalConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            beats_per_hour: 28800.0,
            rate_seconds_per_day: 0.0,
            beat_error_ms: 0.0,
            duration_secs: 10.0,
            amplitude: 0.5,
            carrier_hz: 2500.0,
            burst_sigma_ms: 1.0,
            echo_delay_ms: 5.0,
            echo_ratio: 0.6,
            start_secs: 0.05,
        }
    }
}

/// A beat placed in the synthetic signal
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyntheticBeat {
    pub time: f64,
    pub is_tick: bool,
}

impl WatchSignalConfig {
    /// Seconds between consecutive beats, including the rate error
    pub fn beat_interval(&self) -> f64 {
        3600.0 / (self.beats_per_hour * (1.0 + self.rate_seconds_per_day / SECONDS_PER_DAY))
    }

    pub fn beats(&self) -> Vec<SyntheticBeat> {
        let interval = self.beat_interval();
        (0..)
            .map(|k: usize| {
                let offset = if k % 2 == 1 { self.beat_error_ms / 1000.0 } else { 0.0 };
                SyntheticBeat {
                    time: self.start_secs + k as f64 * interval + offset,
                    is_tick: k % 2 == 0,
                }
            })
            .take_while(|b| b.time < self.duration_secs)
            .collect()
    }
}

fn add_burst(samples: &mut [f32], config: &WatchSignalConfig, center: f64, amplitude: f32) {
    let fs = config.sample_rate as f64;
    let sigma = config.burst_sigma_ms / 1000.0;
    let reach = 4.0 * sigma;

    let first = ((center - reach) * fs).floor().max(0.0) as usize;
    let last = (((center + reach) * fs).ceil() as usize).min(samples.len());

    for (i, sample) in samples.iter_mut().enumerate().take(last).skip(first) {
        let dt = i as f64 / fs - center;
        let window = (-dt * dt / (2.0 * sigma * sigma)).exp();
        *sample += amplitude * (window * (2.0 * PI * config.carrier_hz * dt).sin()) as f32;
    }
}

/// Render the clean beat train described by `config`
pub fn generate_watch_signal(config: &WatchSignalConfig) -> Vec<f32> {
    let len = (config.duration_secs * config.sample_rate as f64) as usize;
    let mut samples = vec![0.0; len];
    let echo = config.echo_delay_ms / 1000.0;

    for beat in config.beats() {
        let echo_time = if beat.is_tick {
            beat.time + echo
        } else {
            beat.time - echo
        };
        add_burst(&mut samples, config, beat.time, config.amplitude);
        add_burst(&mut samples, config, echo_time, config.amplitude * config.echo_ratio);
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_length() {
        let config = WatchSignalConfig {
            duration_secs: 1.5,
            ..Default::default()
        };
        assert_eq!(generate_watch_signal(&config).len(), 72000);
    }

    #[test]
    fn test_beats_alternate_and_shift() {
        let config = WatchSignalConfig {
            beat_error_ms: 2.0,
            duration_secs: 1.0,
            ..Default::default()
        };
        let beats = config.beats();

        assert_eq!(beats.len(), 8);
        assert!(beats[0].is_tick && !beats[1].is_tick);
        assert!((beats[1].time - beats[0].time - 0.127).abs() < 1e-12);
        assert!((beats[2].time - beats[0].time - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_rate_error_shortens_interval() {
        let config = WatchSignalConfig {
            rate_seconds_per_day: 1728.0,
            ..Default::default()
        };
        assert!((config.beat_interval() - 0.125 / 1.02).abs() < 1e-12);
    }

    #[test]
    fn test_bursts_are_bounded() {
        let signal = generate_watch_signal(&WatchSignalConfig::default());
        let peak = signal.iter().fold(0.0_f32, |m, x| m.max(x.abs()));
        assert!(peak > 0.4 && peak <= 0.5 * 1.6 + 1e-3);
    }
}
