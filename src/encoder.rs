//! Table encoding
//!
//! This module serializes canonical tables to CSV (with a header row, even for
//! empty tables) or JSON arrays. Timestamps are written as ISO-8601 text.

use crate::basal::BasalSeries;
use crate::error::IngestError;
use crate::types::{BasalInterval, BolusRecord, GlucoseReading, HeartRateSample};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Output table format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
    JsonPretty,
}

impl OutputFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json | OutputFormat::JsonPretty => "json",
        }
    }
}

/// Column layout of an output table
pub trait Columns {
    const COLUMNS: &'static [&'static str];
}

impl Columns for GlucoseReading {
    const COLUMNS: &'static [&'static str] = &["time", "glucose"];
}

impl Columns for BasalInterval {
    const COLUMNS: &'static [&'static str] = &[
        "time",
        "insulin_basal_u",
        "rate_uh",
        "duration_minutes",
        "end_timestamp",
    ];
}

impl Columns for BolusRecord {
    const COLUMNS: &'static [&'static str] = &[
        "time",
        "bolus_type",
        "glucose",
        "CHO(g)",
        "carb_ratio",
        "total_insulin",
        "initial_bolus",
        "extended_bolus",
    ];
}

impl Columns for HeartRateSample {
    const COLUMNS: &'static [&'static str] = &["time", "heart_rate"];
}

/// Encoder for canonical tables
#[derive(Debug, Clone, Copy, Default)]
pub struct TableEncoder {
    format: OutputFormat,
}

impl TableEncoder {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Encode rows to a string
    pub fn encode<'a, T, I>(&self, rows: I) -> Result<String, IngestError>
    where
        T: Serialize + Columns + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        match self.format {
            OutputFormat::Csv => encode_csv(rows),
            OutputFormat::Json => {
                let rows: Vec<&T> = rows.into_iter().collect();
                Ok(serde_json::to_string(&rows)?)
            }
            OutputFormat::JsonPretty => {
                let rows: Vec<&T> = rows.into_iter().collect();
                Ok(serde_json::to_string_pretty(&rows)?)
            }
        }
    }

    /// Encode a basal series in time order
    pub fn encode_basal(&self, series: &BasalSeries) -> Result<String, IngestError> {
        self.encode(series.values())
    }

    /// Encode rows and write them to `path`
    pub fn write<'a, T, I>(&self, rows: I, path: &Path) -> Result<(), IngestError>
    where
        T: Serialize + Columns + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let encoded = self.encode(rows)?;
        fs::write(path, encoded)?;
        Ok(())
    }
}

fn encode_csv<'a, T, I>(rows: I) -> Result<String, IngestError>
where
    T: Serialize + Columns + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(T::COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }

    let bytes = writer.into_inner()?;
    String::from_utf8(bytes).map_err(|e| IngestError::EncodingError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basal::split;
    use crate::types::BasalEvent;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn start() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_basal_csv() {
        let series = split(&[BasalEvent::new(start(), 10.0, 6.0)]);
        let csv = TableEncoder::new(OutputFormat::Csv).encode_basal(&series).unwrap();

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "time,insulin_basal_u,rate_uh,duration_minutes,end_timestamp");
        assert_eq!(lines[1], "2024-01-01T08:00:00,0.5,6.0,5.0,2024-01-01T08:05:00");
        assert_eq!(lines[2], "2024-01-01T08:05:00,0.5,6.0,5.0,2024-01-01T08:10:00");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_empty_table_keeps_header() {
        let rows: Vec<HeartRateSample> = Vec::new();
        let csv = TableEncoder::default().encode(&rows).unwrap();
        assert_eq!(csv, "time,heart_rate\n");
    }

    #[test]
    fn test_bolus_optional_fields() {
        let rows = vec![BolusRecord {
            time: start(),
            bolus_type: "Estándar".to_string(),
            glucose: None,
            carbs_g: Some(45.0),
            carb_ratio: None,
            total_insulin: 4.5,
            initial_bolus: Some(4.5),
            extended_bolus: None,
        }];
        let csv = TableEncoder::default().encode(&rows).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "time,bolus_type,glucose,CHO(g),carb_ratio,total_insulin,initial_bolus,extended_bolus");
        assert_eq!(lines[1], "2024-01-01T08:00:00,Estándar,,45.0,,4.5,4.5,");
    }

    #[test]
    fn test_json_output() {
        let rows = vec![GlucoseReading { time: start(), glucose: 101 }];
        let json = TableEncoder::new(OutputFormat::Json).encode(&rows).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["time"], "2024-01-01T08:00:00");
        assert_eq!(value[0]["glucose"], 101);
    }
}
