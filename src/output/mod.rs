mod csv;
mod json;
mod text;

use chrono::Utc;

pub use self::csv::CsvFormatter;
pub use self::json::JsonFormatter;
pub use self::text::TextFormatter;

use crate::processing::MetricsSnapshot;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

/// Renders published snapshots as one line each
pub trait Formatter: Send {
    fn format(&self, snapshot: &MetricsSnapshot) -> String;

    fn header(&self) -> Option<&'static str> {
        None
    }
}

pub fn create_formatter(format: OutputFormat, verbose: bool) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter::new(verbose)),
        OutputFormat::Json => Box::new(JsonFormatter::new(verbose)),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

pub fn iso8601_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn fixed(value: Option<f64>, precision: usize, missing: &str) -> String {
    value.map_or(missing.to_string(), |v| format!("{:.*}", precision, v))
}

#[cfg(test)]
pub(crate) fn sample_snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        timestamp: 12.5,
        rate_seconds_per_day: Some(4.3),
        beat_error_ms: Some(0.4),
        amplitude_deg: None,
        observed_beats_per_hour: Some(28801.4),
        lift_time_ms: Some(3.1),
        expected_beats_per_hour: 28800.0,
        lift_angle: 52.0,
        stability_ok: true,
        rate_std_dev: Some(0.2),
        dropouts: 0,
        dropouts_ok: true,
        snr_db: Some(31.0),
        snr_ok: true,
        beats: 96,
        cycles: 47,
        posture: 1,
        posture_label: "Dial down".to_string(),
        posture_reading: None,
        valid: true,
        settling: false,
        insufficient_data: false,
        residuals: Vec::new(),
    }
}
