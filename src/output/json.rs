use serde::Serialize;

use super::{Formatter, iso8601_timestamp};
use crate::processing::MetricsSnapshot;

/// One JSON object per line; the residual series is only included when
/// verbose
pub struct JsonFormatter {
    verbose: bool,
}

impl JsonFormatter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

#[derive(Serialize)]
struct Line<'a> {
    ts: String,
    #[serde(flatten)]
    snapshot: &'a MetricsSnapshot,
}

impl Formatter for JsonFormatter {
    fn format(&self, snapshot: &MetricsSnapshot) -> String {
        let trimmed;
        let snapshot = if self.verbose {
            snapshot
        } else {
            trimmed = MetricsSnapshot {
                residuals: Vec::new(),
                ..snapshot.clone()
            };
            &trimmed
        };

        let line = Line {
            ts: iso8601_timestamp(),
            snapshot,
        };
        serde_json::to_string(&line).unwrap_or_else(|e| format!(r#"{{"error":"{}"}}"#, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::sample_snapshot;

    #[test]
    fn test_json_fields() {
        let line = JsonFormatter::new(false).format(&sample_snapshot());
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["rate_seconds_per_day"], 4.3);
        assert_eq!(value["posture_label"], "Dial down");
        assert!(value["amplitude_deg"].is_null());
        assert!(value["ts"].is_string());
        assert_eq!(value["residuals"].as_array().unwrap().len(), 0);
    }
}
