//! Polar Flow adapter
//!
//! Polar session exports are two tables in one file: a one-row session summary
//! (lines 1-2) carrying the session date and start time, followed by per-sample
//! rows whose `Time` column is an offset from the session start.

use crate::config::{delimiter_byte, PolarLayout};
use crate::error::IngestError;
use crate::logging::LogSink;
use crate::normalizer::parse_integer;
use crate::table::CsvTable;
use crate::types::{HeartRateSample, Source};
use chrono::{Duration, NaiveDateTime};

use super::{ExportAdapter, RowStats};

/// Polar Flow session export adapter
#[derive(Debug, Clone, Default)]
pub struct PolarAdapter {
    layout: PolarLayout,
}

impl PolarAdapter {
    pub fn new(layout: PolarLayout) -> Self {
        Self { layout }
    }

    fn session_start(&self, summary: &CsvTable) -> Result<NaiveDateTime, IngestError> {
        let date_col = summary.column(&self.layout.date_column)?;
        let start_col = summary.column(&self.layout.start_column)?;
        let row = summary
            .rows()
            .first()
            .ok_or_else(|| IngestError::MalformedHeader("session summary row is missing".to_string()))?;

        let stamp = format!("{} {}", row.get(date_col).trim(), row.get(start_col).trim());
        NaiveDateTime::parse_from_str(&stamp, &self.layout.start_format)
            .map_err(|e| IngestError::DateParseError(format!("session start {stamp:?}: {e}")))
    }
}

impl ExportAdapter for PolarAdapter {
    type Record = HeartRateSample;

    fn source(&self) -> Source {
        Source::Polar
    }

    fn stage(&self) -> &'static str {
        "heart_rate"
    }

    fn parse(&self, text: &str, log: &mut dyn LogSink) -> Result<Vec<HeartRateSample>, IngestError> {
        let delimiter = delimiter_byte(self.layout.delimiter)?;
        let (summary_text, samples_text) = split_sections(text)?;

        let summary = CsvTable::parse(summary_text, delimiter, 0)?;
        let start = self.session_start(&summary)?;

        let samples = CsvTable::parse(samples_text, delimiter, 0)?;
        let offset_col = samples.column(&self.layout.offset_column)?;
        let hr_col = samples.column(&self.layout.heart_rate_column)?;

        let mut stats = RowStats {
            read: samples.len(),
            dropped: samples.unreadable_rows,
            ..Default::default()
        };
        let mut out = Vec::with_capacity(samples.len());

        for row in samples.rows() {
            let time = parse_offset(row.get(offset_col)).and_then(|o| start.checked_add_signed(o));
            let heart_rate = parse_integer(row.get(hr_col));
            match (time, heart_rate) {
                (Some(time), Some(heart_rate)) => out.push(HeartRateSample { time, heart_rate }),
                _ => stats.dropped += 1,
            }
        }

        stats.kept = out.len();
        stats.report(self.stage(), self.source(), log);

        Ok(out)
    }
}

/// Split the file after its second line
fn split_sections(text: &str) -> Result<(&str, &str), IngestError> {
    let mut newlines = text.match_indices('\n').map(|(idx, _)| idx);
    let _ = newlines.next();
    let cut = newlines
        .next()
        .ok_or_else(|| IngestError::MalformedHeader("expected a two-line session header".to_string()))?;
    Ok((&text[..cut], &text[cut + 1..]))
}

/// Parse a `[-]HH:MM:SS[.fff]` offset (hours may exceed 23)
fn parse_offset(raw: &str) -> Option<Duration> {
    let value = raw.trim();
    let (negative, value) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };

    let mut parts = value.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !(0..60).contains(&minutes) || !(0.0..60.0).contains(&seconds) {
        return None;
    }

    let micros = hours
        .checked_mul(3600)?
        .checked_add(minutes * 60)?
        .checked_mul(1_000_000)?
        .checked_add((seconds * 1_000_000.0).round() as i64)?;
    let offset = Duration::microseconds(micros);
    Some(if negative { -offset } else { offset })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    const SESSION: &str = "Name,Sport,Date,Start time,Duration\n\
Jane Doe,RUNNING,15-03-2024,07:30:00,00:00:04\n\
Sample rate,Time,HR (bpm),Speed (km/h)\n\
1,00:00:00,,\n\
1,00:00:01,92,8.1\n\
1,00:00:02,95,8.3\n\
1,00:00:03,bad,8.3\n";

    #[test]
    fn test_parse_polar_session() {
        let mut log = MemorySink::new();
        let samples = PolarAdapter::default().parse(SESSION, &mut log).unwrap();

        let start = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(7, 30, 0)
            .unwrap();
        assert_eq!(
            samples,
            vec![
                HeartRateSample { time: start + Duration::seconds(1), heart_rate: 92 },
                HeartRateSample { time: start + Duration::seconds(2), heart_rate: 95 },
            ]
        );
        assert_eq!(log.stage("heart_rate")[0].get("dropped"), Some("2"));
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("01:02:03"), Some(Duration::seconds(3723)));
        assert_eq!(parse_offset("25:00:00"), Some(Duration::hours(25)));
        assert_eq!(parse_offset("00:00:01.5"), Some(Duration::milliseconds(1500)));
        assert_eq!(parse_offset("00:61:00"), None);
        assert_eq!(parse_offset("12:00"), None);
        assert_eq!(parse_offset("9999999999999:00:00"), None);
    }

    #[test]
    fn test_out_of_range_offset_drops_row() {
        let text = "Date,Start time\n15-03-2024,07:30:00\nTime,HR (bpm)\n2500000000:00:00,90\n00:00:01,91\n";
        let mut log = MemorySink::new();
        let samples = PolarAdapter::default().parse(text, &mut log).unwrap();

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].heart_rate, 91);
        assert_eq!(log.stage("heart_rate")[0].get("dropped"), Some("1"));
    }

    #[test]
    fn test_missing_session_header() {
        let mut log = MemorySink::new();
        let result = PolarAdapter::default().parse("Date,Start time\n", &mut log);
        assert!(matches!(result, Err(IngestError::MalformedHeader(_))));
    }

    #[test]
    fn test_bad_session_start() {
        let text = "Date,Start time\nyesterday,07:30:00\nTime,HR (bpm)\n00:00:01,90\n";
        let mut log = MemorySink::new();
        let result = PolarAdapter::default().parse(text, &mut log);
        assert!(matches!(result, Err(IngestError::DateParseError(_))));
    }
}
