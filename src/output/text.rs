use super::{Formatter, fixed};
use crate::processing::MetricsSnapshot;

pub struct TextFormatter {
    verbose: bool,
}

impl TextFormatter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

fn status(snapshot: &MetricsSnapshot) -> &'static str {
    if snapshot.settling {
        "settling"
    } else if snapshot.insufficient_data {
        "no data"
    } else if !snapshot.dropouts_ok {
        "dropouts"
    } else if !snapshot.stability_ok {
        "unstable"
    } else {
        "ok"
    }
}

impl Formatter for TextFormatter {
    fn format(&self, s: &MetricsSnapshot) -> String {
        let rate = s
            .rate_seconds_per_day
            .map_or("   ---".to_string(), |r| format!("{:>+6.1}", r));
        let line = format!(
            "[{}] Rate: {} s/d  Beat error: {} ms  Amplitude: {}°  BPH: {}  ({})",
            s.posture_label,
            rate,
            fixed(s.beat_error_ms, 1, "---"),
            fixed(s.amplitude_deg, 0, "---"),
            fixed(s.observed_beats_per_hour, 0, "---"),
            status(s)
        );

        if self.verbose {
            format!(
                "{} [t: {:.1} s, beats: {}, cycles: {}, σ: {} s/d, dropouts: {}, SNR: {} dB, lift: {} ms]",
                line,
                s.timestamp,
                s.beats,
                s.cycles,
                fixed(s.rate_std_dev, 2, "-"),
                s.dropouts,
                fixed(s.snr_db, 1, "-"),
                fixed(s.lift_time_ms, 2, "-")
            )
        } else {
            line
        }
    }
}
