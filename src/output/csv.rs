use super::{Formatter, fixed, iso8601_timestamp};
use crate::processing::MetricsSnapshot;

pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format(&self, s: &MetricsSnapshot) -> String {
        format!(
            "{},{:.3},{},{},{},{},{},{},{},{},{},{},{},{}",
            iso8601_timestamp(),
            s.timestamp,
            s.posture,
            fixed(s.rate_seconds_per_day, 2, ""),
            fixed(s.beat_error_ms, 2, ""),
            fixed(s.amplitude_deg, 1, ""),
            fixed(s.observed_beats_per_hour, 1, ""),
            fixed(s.lift_time_ms, 3, ""),
            s.stability_ok,
            s.dropouts_ok,
            fixed(s.snr_db, 1, ""),
            s.cycles,
            s.valid,
            s.insufficient_data
        )
    }

    fn header(&self) -> Option<&'static str> {
        Some(
            "ts,stream_time,posture,rate_s_per_day,beat_error_ms,amplitude_deg,observed_bph,lift_time_ms,stability_ok,dropouts_ok,snr_db,cycles,valid,insufficient_data",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::sample_snapshot;

    #[test]
    fn test_csv_matches_header() {
        let f = CsvFormatter;
        let line = f.format(&sample_snapshot());
        let columns = f.header().unwrap().split(',').count();
        assert_eq!(line.split(',').count(), columns);
        assert!(line.contains(",12.500,1,4.30,0.40,,28801.4,"));
    }
}
