//! Dexcom Clarity adapter
//!
//! Parses Clarity CSV exports (semicolon separated, ISO-like timestamps). Event
//! rows without a glucose value are skipped; "high"/"low" labels are replaced by
//! fixed values instead of being clipped.

use crate::config::{delimiter_byte, DexcomLayout};
use crate::error::IngestError;
use crate::logging::LogSink;
use crate::normalizer::{parse_timestamp, sort_and_dedup, DedupPolicy};
use crate::table::CsvTable;
use crate::types::{GlucoseReading, Source};

use super::{ExportAdapter, RowStats};

/// Dexcom Clarity export adapter
#[derive(Debug, Clone, Default)]
pub struct DexcomAdapter {
    layout: DexcomLayout,
}

impl DexcomAdapter {
    pub fn new(layout: DexcomLayout) -> Self {
        Self { layout }
    }
}

impl ExportAdapter for DexcomAdapter {
    type Record = GlucoseReading;

    fn source(&self) -> Source {
        Source::Dexcom
    }

    fn stage(&self) -> &'static str {
        "glucose"
    }

    fn parse(&self, text: &str, log: &mut dyn LogSink) -> Result<Vec<GlucoseReading>, IngestError> {
        let layout = &self.layout;
        let table = CsvTable::parse(text, delimiter_byte(layout.delimiter)?, layout.header_row)?;
        let time_col = table.column(&layout.time_column)?;
        let glucose_col = table.column(&layout.glucose_column)?;

        let mut stats = RowStats {
            read: table.len(),
            dropped: table.unreadable_rows,
            ..Default::default()
        };
        let mut readings = Vec::with_capacity(table.len());

        for row in table.rows() {
            let time = parse_timestamp(row.get(time_col), &layout.time_formats);
            let glucose = layout.labels.resolve(row.get(glucose_col));
            match (time, glucose) {
                (Some(time), Some(value)) => readings.push(GlucoseReading {
                    time,
                    glucose: value.trunc() as i64,
                }),
                _ => stats.dropped += 1,
            }
        }

        let before = readings.len();
        sort_and_dedup(&mut readings, DedupPolicy::FirstWins);
        stats.duplicates = before - readings.len();
        stats.kept = readings.len();
        stats.report(self.stage(), self.source(), log);

        Ok(readings)
    }
}
