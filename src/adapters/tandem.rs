//! Tandem pump adapters
//!
//! Parses the three Tandem t:connect exports: CGM readings, basal
//! administrations and boluses. All three start with a reporting-period line
//! above the real header and use `DD/MM/YYYY HH:MM` timestamps with comma
//! decimals.

use crate::config::{delimiter_byte, BasalLayout, BolusLayout, TandemCgmLayout};
use crate::error::IngestError;
use crate::logging::{LogEvent, LogSink};
use crate::normalizer::{
    clip_glucose, parse_decimal, parse_timestamp, sort_and_dedup, DedupPolicy,
};
use crate::table::{CsvTable, Row};
use crate::types::{BasalEvent, BolusRecord, GlucoseReading, Source};

use super::{ExportAdapter, RowStats};

/// Tandem CGM export adapter
#[derive(Debug, Clone, Default)]
pub struct TandemCgmAdapter {
    layout: TandemCgmLayout,
}

impl TandemCgmAdapter {
    pub fn new(layout: TandemCgmLayout) -> Self {
        Self { layout }
    }
}

impl ExportAdapter for TandemCgmAdapter {
    type Record = GlucoseReading;

    fn source(&self) -> Source {
        Source::Tandem
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
            let glucose = parse_decimal(row.get(glucose_col));
            match (time, glucose) {
                (Some(time), Some(value)) => readings.push(GlucoseReading {
                    time,
                    glucose: clip_glucose(value, layout.glucose_upper),
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

/// Tandem basal administration log adapter
#[derive(Debug, Clone, Default)]
pub struct BasalLogAdapter {
    layout: BasalLayout,
}

impl BasalLogAdapter {
    pub fn new(layout: BasalLayout) -> Self {
        Self { layout }
    }

    fn is_suspension(&self, insulin_type: &str) -> bool {
        let value = insulin_type.trim();
        self.layout
            .suspension_labels
            .iter()
            .any(|label| label == value)
    }
}

impl ExportAdapter for BasalLogAdapter {
    type Record = BasalEvent;

    fn source(&self) -> Source {
        Source::Tandem
    }

    fn stage(&self) -> &'static str {
        "basal"
    }

    fn parse(&self, text: &str, log: &mut dyn LogSink) -> Result<Vec<BasalEvent>, IngestError> {
        let layout = &self.layout;
        let table = CsvTable::parse(text, delimiter_byte(layout.delimiter)?, layout.header_row)?;
        let time_col = table.column(&layout.time_column)?;
        let duration_col = table.column(&layout.duration_column)?;
        let rate_col = table.column(&layout.rate_column)?;
        let type_col = table.column(&layout.insulin_type_column)?;

        let mut stats = RowStats {
            read: table.len(),
            dropped: table.unreadable_rows,
            ..Default::default()
        };
        let mut rejected = 0usize;
        let mut events = Vec::with_capacity(table.len());

        for row in table.rows() {
            let Some(start_time) = parse_timestamp(row.get(time_col), &layout.time_formats) else {
                drop_row(log, self.stage(), row, "unparseable timestamp", &mut stats);
                continue;
            };
            let Some(duration) = parse_decimal(row.get(duration_col)) else {
                drop_row(log, self.stage(), row, "missing duration", &mut stats);
                continue;
            };

            let event = if self.is_suspension(row.get(type_col)) {
                BasalEvent::suspension(start_time, duration)
            } else {
                match parse_decimal(row.get(rate_col)) {
                    Some(rate) => BasalEvent::new(start_time, duration, rate),
                    None => {
                        drop_row(log, self.stage(), row, "missing rate", &mut stats);
                        continue;
                    }
                }
            };

            if event.duration_minutes < 0.0 || event.rate_u_per_h < 0.0 {
                rejected += 1;
                drop_row(log, self.stage(), row, "negative value", &mut stats);
                continue;
            }
            if event.duration_minutes > layout.max_duration_minutes {
                rejected += 1;
                drop_row(log, self.stage(), row, "duration out of range", &mut stats);
                continue;
            }
            events.push(event);
        }

        let before = events.len();
        sort_and_dedup(&mut events, DedupPolicy::LastWins);
        stats.duplicates = before - events.len();
        stats.kept = events.len();
        stats.report(self.stage(), self.source(), log);

        if rejected > 0 {
            log.emit(
                LogEvent::warn(self.stage(), "dropped basal rows with out-of-range values")
                    .field("rows", rejected)
                    .field("max_duration_minutes", layout.max_duration_minutes),
            );
        }

        let suspensions = events.iter().filter(|e| e.suspended).count();
        let mut summary = LogEvent::info(self.stage(), "basal administrations loaded")
            .field("events", events.len())
            .field("suspensions", suspensions);
        if let (Some(first), Some(last)) = (events.first(), events.last()) {
            summary = summary
                .field("from", first.start_time)
                .field("to", last.start_time);
        }
        log.emit(summary);

        Ok(events)
    }
}

fn drop_row(log: &mut dyn LogSink, stage: &'static str, row: &Row, reason: &str, stats: &mut RowStats) {
    stats.dropped += 1;
    log.emit(
        LogEvent::debug(stage, "dropped row")
            .field("line", row.line)
            .field("reason", reason),
    );
}

/// Tandem bolus log adapter
#[derive(Debug, Clone, Default)]
pub struct BolusLogAdapter {
    layout: BolusLayout,
}

impl BolusLogAdapter {
    pub fn new(layout: BolusLayout) -> Self {
        Self { layout }
    }
}

impl ExportAdapter for BolusLogAdapter {
    type Record = BolusRecord;

    fn source(&self) -> Source {
        Source::Tandem
    }

    fn stage(&self) -> &'static str {
        "bolus"
    }

    fn parse(&self, text: &str, log: &mut dyn LogSink) -> Result<Vec<BolusRecord>, IngestError> {
        let layout = &self.layout;
        let table = CsvTable::parse(text, delimiter_byte(layout.delimiter)?, layout.header_row)?;
        let time_col = table.column(&layout.time_column)?;
        let total_col = table.column(&layout.total_column)?;
        let type_col = table.column(&layout.type_column)?;
        let glucose_col = table.optional_column(&layout.glucose_column);
        let carbs_col = table.optional_column(&layout.carbs_column);
        let ratio_col = table.optional_column(&layout.carb_ratio_column);
        let initial_col = table.optional_column(&layout.initial_column);
        let extended_col = table.optional_column(&layout.extended_column);

        let optional = |row: &Row, col: Option<usize>| {
            col.and_then(|c| parse_decimal(row.get(c)))
        };

        let mut stats = RowStats {
            read: table.len(),
            dropped: table.unreadable_rows,
            ..Default::default()
        };
        let mut records = Vec::with_capacity(table.len());

        for row in table.rows() {
            let time = parse_timestamp(row.get(time_col), &layout.time_formats);
            let total = parse_decimal(row.get(total_col));
            let (Some(time), Some(total_insulin)) = (time, total) else {
                stats.dropped += 1;
                continue;
            };

            records.push(BolusRecord {
                time,
                bolus_type: row.get(type_col).trim().to_string(),
                glucose: optional(row, glucose_col),
                carbs_g: optional(row, carbs_col),
                carb_ratio: optional(row, ratio_col),
                total_insulin,
                initial_bolus: optional(row, initial_col),
                extended_bolus: optional(row, extended_col),
            });
        }

        records.sort_by_key(|r| r.time);
        stats.kept = records.len();
        stats.report(self.stage(), self.source(), log);

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{Level, MemorySink};
    use chrono::{NaiveDate, NaiveDateTime};
    use pretty_assertions::assert_eq;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    const CGM: &str = "Periodo del informe: 01/01/2024 - 02/01/2024\n\
Marca de tiempo,Valor de glucosa del MCG (mg/dl),Dispositivo\n\
01/01/2024 08:05,120,G6\n\
01/01/2024 08:00,455,G6\n\
01/01/2024 08:05,130,G6\n\
,99,G6\n\
01/01/2024 08:10,,G6\n";

    const BASAL: &str = "Periodo del informe: 01/01/2024 - 02/01/2024\n\
Marca de tiempo,Tipo de insulina,Duración (minutos),Tasa\n\
01/01/2024 08:00,Basal,30,\"0,8\"\n\
01/01/2024 08:30,Suspensión,15,\"1,5\"\n\
01/01/2024 08:00,Basal,10,\"1,2\"\n\
01/01/2024 09:00,Basal,,\"1,0\"\n\
01/01/2024 09:30,Basal,20,-1\n\
not a date,Basal,5,1\n";

    const BOLUS: &str = "Periodo del informe: 01/01/2024 - 02/01/2024\n\
Marca de tiempo,Tipo de insulina,Entrada valor de glucemia (mg/dl),Ingesta de carbohidratos (g),Índice de carbohidratos,Insulina administrada (U),Administración inicial (U),Administración extendida (U)\n\
01/01/2024 13:00,Estándar,145,60,\"10,0\",\"6,5\",\"6,5\",\n\
01/01/2024 08:00,Extendido,,30,\"10,0\",\"3,0\",\"1,5\",\"1,5\"\n\
01/01/2024 19:00,Estándar,,,,,,\n";

    #[test]
    fn test_parse_tandem_cgm() {
        let mut log = MemorySink::new();
        let readings = TandemCgmAdapter::default().parse(CGM, &mut log).unwrap();

        assert_eq!(
            readings,
            vec![
                GlucoseReading { time: at(1, 8, 0), glucose: 400 },
                GlucoseReading { time: at(1, 8, 5), glucose: 120 },
            ]
        );
        let summary = &log.stage("glucose")[0];
        assert_eq!(summary.get("dropped"), Some("2"));
        assert_eq!(summary.get("duplicates"), Some("1"));
    }

    #[test]
    fn test_parse_basal_log() {
        let mut log = MemorySink::new();
        let events = BasalLogAdapter::default().parse(BASAL, &mut log).unwrap();

        assert_eq!(events.len(), 2);
        // Last row for 08:00 wins
        assert_eq!(events[0], BasalEvent::new(at(1, 8, 0), 10.0, 1.2));
        assert_eq!(events[1], BasalEvent::suspension(at(1, 8, 30), 15.0));
        assert_eq!(log.count(Level::Warn), 1);

        let dropped: Vec<&str> = log
            .stage("basal")
            .iter()
            .filter(|e| e.message == "dropped row")
            .filter_map(|e| e.get("line"))
            .collect();
        assert_eq!(dropped, vec!["6", "7", "8"]);
    }

    #[test]
    fn test_basal_rejects_oversized_duration() {
        let text = "meta\n\
Marca de tiempo,Tipo de insulina,Duración (minutos),Tasa\n\
01/01/2024 08:00,Basal,1e12,1\n\
01/01/2024 09:00,Basal,1441,1\n\
01/01/2024 10:00,Basal,1440,1\n";
        let mut log = MemorySink::new();
        let events = BasalLogAdapter::default().parse(text, &mut log).unwrap();

        assert_eq!(events, vec![BasalEvent::new(at(1, 10, 0), 1440.0, 1.0)]);
        let warning = log.events().iter().find(|e| e.level == Level::Warn).unwrap();
        assert_eq!(warning.get("rows"), Some("2"));
    }

    #[test]
    fn test_basal_missing_column() {
        let text = "meta\nMarca de tiempo,Tasa\n01/01/2024 08:00,1\n";
        let mut log = MemorySink::new();
        let result = BasalLogAdapter::default().parse(text, &mut log);
        assert!(matches!(result, Err(IngestError::MissingColumn(c)) if c == "Duración (minutos)"));
    }

    #[test]
    fn test_parse_bolus_log() {
        let mut log = MemorySink::new();
        let records = BolusLogAdapter::default().parse(BOLUS, &mut log).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].time, at(1, 8, 0));
        assert_eq!(records[0].bolus_type, "Extendido");
        assert_eq!(records[0].glucose, None);
        assert_eq!(records[0].extended_bolus, Some(1.5));
        assert_eq!(records[1].total_insulin, 6.5);
        assert_eq!(records[1].carbs_g, Some(60.0));
        assert_eq!(records[1].carb_ratio, Some(10.0));
        assert_eq!(records[1].extended_bolus, None);
    }
}
