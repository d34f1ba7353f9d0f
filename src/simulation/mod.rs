mod measure;
mod noise;
mod signal;

pub use measure::{Measurement, max_timing_error, measure_watch, polarity_accuracy};
pub use noise::{
    AdditiveNoiseConfig, DropoutConfig, ImpulseNoiseConfig, NoiseConfig, RumbleConfig,
    apply_noise, generate_noisy_watch_signal,
};
pub use signal::{SyntheticBeat, WatchSignalConfig, generate_watch_signal};
