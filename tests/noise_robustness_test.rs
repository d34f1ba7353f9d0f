mod common;

use timegrapher::simulation::{
    NoiseConfig, generate_noisy_watch_signal, measure_watch, polarity_accuracy,
};

use common::{config_for, hiss, measure, watch};

fn final_rate_and_beat_error(m: &timegrapher::simulation::Measurement) -> (f64, f64) {
    let snapshot = m.final_estimate().expect("no estimate");
    (
        snapshot.rate_seconds_per_day.unwrap(),
        snapshot.beat_error_ms.unwrap(),
    )
}

#[test]
fn test_white_noise() {
    let config = watch(8.0);
    for rms in [0.02, 0.05] {
        let noise = NoiseConfig::default().with_seed(11).with_white_noise(rms);
        let m = measure(&config, &noise);
        let (rate, beat_error) = final_rate_and_beat_error(&m);

        assert!(rate.abs() < 3.0, "rms {}: rate {} s/d", rms, rate);
        assert!(beat_error.abs() < 0.3, "rms {}: beat error {} ms", rms, beat_error);

        let accuracy = polarity_accuracy(&m.events, &config.beats(), 1e-3);
        assert!(accuracy > 0.9, "rms {}: polarity accuracy {}", rms, accuracy);
    }
}

#[test]
fn test_rumble_rejected() {
    let config = watch(8.0);
    let noise = hiss(12).with_rumble(50.0, 0.5);
    let m = measure(&config, &noise);
    let (rate, beat_error) = final_rate_and_beat_error(&m);

    assert!(rate.abs() < 2.0, "rate {} s/d under mains hum", rate);
    assert!(beat_error.abs() < 0.2, "beat error {} ms", beat_error);
    let accuracy = polarity_accuracy(&m.events, &config.beats(), 1e-3);
    assert!(accuracy > 0.98, "polarity accuracy {}", accuracy);
}

#[test]
fn test_single_click_is_trimmed() {
    let config = watch(8.0);
    let mut signal = generate_noisy_watch_signal(&config, &hiss(13));

    // Between a tick at 3.05 s and the following tock
    let at = (3.11 * config.sample_rate as f64) as usize;
    for sample in &mut signal[at..at + 3] {
        *sample += 0.8;
    }

    let m = measure_watch(&signal, &config_for(&config)).unwrap();
    let (rate, beat_error) = final_rate_and_beat_error(&m);

    assert!(rate.abs() < 2.0, "rate {} s/d after a click", rate);
    assert!(beat_error.abs() < 0.2, "beat error {} ms after a click", beat_error);
}

#[test]
fn test_sparse_impulses() {
    let config = watch(8.0);
    let noise = hiss(14).with_impulse(0.5, 1.0, 5);
    let m = measure(&config, &noise);
    let (rate, beat_error) = final_rate_and_beat_error(&m);

    assert!(rate.abs() < 10.0, "rate {} s/d with impulses", rate);
    assert!(beat_error.abs() < 1.0, "beat error {} ms with impulses", beat_error);
}

#[test]
fn test_quiet_recording_still_measured() {
    let config = timegrapher::simulation::WatchSignalConfig {
        amplitude: 0.01,
        ..watch(8.0)
    };
    let noise = NoiseConfig::default().with_seed(15).with_white_noise(0.0005);
    let m = measure(&config, &noise);
    let (rate, _) = final_rate_and_beat_error(&m);

    assert!(rate.abs() < 2.0, "rate {} s/d for a quiet watch", rate);
    assert!(m.last().unwrap().snr_ok);
}
