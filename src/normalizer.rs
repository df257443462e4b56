//! Field normalization
//!
//! Per-field transforms shared by every export adapter:
//! - locale decimal cleanup (comma → period, stray quotes removed)
//! - lenient numeric and timestamp coercion (unparseable → `None`)
//! - glucose sentinel substitution and clipping
//! - chronological sort with first-wins or last-wins dedup on timestamp

use crate::types::Timestamped;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Clean a numeric field written with a comma decimal separator
pub fn normalize_decimal(raw: &str) -> String {
    raw.trim().replace('"', "").replace(',', ".")
}

/// Parse a possibly comma-decimal number; empty, NaN and infinite values are `None`
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned = normalize_decimal(raw);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a number and truncate it toward zero
pub fn parse_integer(raw: &str) -> Option<i64> {
    parse_decimal(raw).map(|v| v.trunc() as i64)
}

/// Parse a timestamp with the first format that matches
pub fn parse_timestamp(raw: &str, formats: &[String]) -> Option<NaiveDateTime> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Glucose value substitution for textual out-of-range labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlucoseLabels {
    pub high_labels: Vec<String>,
    pub high_value: f64,
    pub low_labels: Vec<String>,
    pub low_value: f64,
}

impl Default for GlucoseLabels {
    fn default() -> Self {
        Self {
            high_labels: vec!["Nivel alto".to_string(), "High".to_string()],
            high_value: 400.0,
            low_labels: vec!["Nivel bajo".to_string(), "Low".to_string()],
            low_value: 40.0,
        }
    }
}

impl GlucoseLabels {
    /// Resolve a raw glucose cell, mapping labels to their fixed values
    pub fn resolve(&self, raw: &str) -> Option<f64> {
        let value = raw.trim();
        if self.high_labels.iter().any(|l| l.eq_ignore_ascii_case(value)) {
            return Some(self.high_value);
        }
        if self.low_labels.iter().any(|l| l.eq_ignore_ascii_case(value)) {
            return Some(self.low_value);
        }
        parse_decimal(value)
    }
}

/// Clip a glucose value to an upper bound and truncate to whole mg/dL
pub fn clip_glucose(value: f64, upper: f64) -> i64 {
    value.min(upper).trunc() as i64
}

/// Which record survives when several share a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupPolicy {
    FirstWins,
    LastWins,
}

/// Sort records chronologically and drop timestamp duplicates.
///
/// The sort is stable, so "first" and "last" refer to the input order among
/// records with equal timestamps.
pub fn sort_and_dedup<T: Timestamped>(records: &mut Vec<T>, policy: DedupPolicy) {
    records.sort_by_key(|r| r.timestamp());
    match policy {
        DedupPolicy::FirstWins => records.dedup_by_key(|r| r.timestamp()),
        DedupPolicy::LastWins => {
            records.reverse();
            records.dedup_by_key(|r| r.timestamp());
            records.reverse();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BasalEvent, GlucoseReading};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 2)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_decimal_handles_locale() {
        assert_eq!(parse_decimal("0,85"), Some(0.85));
        assert_eq!(parse_decimal("\"1,2\""), Some(1.2));
        assert_eq!(parse_decimal(" 30 "), Some(30.0));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("nan"), None);
        assert_eq!(parse_decimal("abc"), None);
    }

    #[test]
    fn test_parse_integer_truncates() {
        assert_eq!(parse_integer("123,9"), Some(123));
        assert_eq!(parse_integer("-"), None);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let formats = vec!["%d/%m/%Y %H:%M".to_string(), "%Y-%m-%dT%H:%M:%S".to_string()];
        assert_eq!(parse_timestamp("02/03/2024 08:05", &formats), Some(at(8, 5)));
        assert_eq!(parse_timestamp("2024-03-02T08:05:00", &formats), Some(at(8, 5)));
        assert_eq!(parse_timestamp("yesterday", &formats), None);
        assert_eq!(parse_timestamp("", &formats), None);
    }

    #[test]
    fn test_glucose_labels() {
        let labels = GlucoseLabels::default();
        assert_eq!(labels.resolve("Nivel alto"), Some(400.0));
        assert_eq!(labels.resolve("LOW"), Some(40.0));
        assert_eq!(labels.resolve("112"), Some(112.0));
        assert_eq!(labels.resolve(""), None);
    }

    #[test]
    fn test_clip_glucose() {
        assert_eq!(clip_glucose(512.0, 400.0), 400);
        assert_eq!(clip_glucose(99.7, 400.0), 99);
    }

    #[test]
    fn test_first_wins_dedup() {
        let mut readings = vec![
            GlucoseReading { time: at(8, 5), glucose: 110 },
            GlucoseReading { time: at(8, 0), glucose: 100 },
            GlucoseReading { time: at(8, 5), glucose: 999 },
        ];
        sort_and_dedup(&mut readings, DedupPolicy::FirstWins);

        assert_eq!(
            readings,
            vec![
                GlucoseReading { time: at(8, 0), glucose: 100 },
                GlucoseReading { time: at(8, 5), glucose: 110 },
            ]
        );
    }

    #[test]
    fn test_last_wins_dedup() {
        let mut events = vec![
            BasalEvent::new(at(8, 0), 30.0, 0.8),
            BasalEvent::new(at(7, 0), 60.0, 0.5),
            BasalEvent::new(at(8, 0), 15.0, 1.1),
        ];
        sort_and_dedup(&mut events, DedupPolicy::LastWins);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start_time, at(7, 0));
        assert_eq!(events[1].rate_u_per_h, 1.1);
    }
}
