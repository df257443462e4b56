//! Pipeline orchestration
//!
//! This module provides the batch entry points. Files are processed one after
//! another; each file yields a [`FileOutcome`] so a bad export only removes its
//! own contribution and the rest of the batch carries on.

use crate::adapters::{
    BasalLogAdapter, BolusLogAdapter, DexcomAdapter, ExportAdapter, PolarAdapter, TandemCgmAdapter,
};
use crate::basal::{total_insulin, BasalSeries, BasalSplitter};
use crate::config::IngestConfig;
use crate::logging::{LogEvent, LogSink};
use crate::normalizer::{sort_and_dedup, DedupPolicy};
use crate::table::read_export;
use crate::types::{BolusRecord, GlucoseReading, HeartRateSample};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Kind of export a file was read as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    TandemCgm,
    TandemBasal,
    TandemBolus,
    Dexcom,
    Polar,
}

/// Result of processing a single file
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome<T> {
    Loaded { path: PathBuf, records: Vec<T> },
    Failed { path: PathBuf, reason: String },
}

impl<T> FileOutcome<T> {
    pub fn path(&self) -> &Path {
        match self {
            FileOutcome::Loaded { path, .. } | FileOutcome::Failed { path, .. } => path,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, FileOutcome::Loaded { .. })
    }

    /// Records of a loaded file; a failed file contributes nothing
    pub fn into_records(self) -> Vec<T> {
        match self {
            FileOutcome::Loaded { records, .. } => records,
            FileOutcome::Failed { .. } => Vec::new(),
        }
    }

    /// Summary of this outcome for batch reports
    pub fn status(&self, kind: FileKind) -> FileStatus {
        match self {
            FileOutcome::Loaded { path, records } => FileStatus {
                path: path.clone(),
                kind,
                loaded: true,
                records: records.len(),
                reason: None,
            },
            FileOutcome::Failed { path, reason } => FileStatus {
                path: path.clone(),
                kind,
                loaded: false,
                records: 0,
                reason: Some(reason.clone()),
            },
        }
    }
}

/// Per-file line of a batch report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileStatus {
    pub path: PathBuf,
    pub kind: FileKind,
    pub loaded: bool,
    pub records: usize,
    pub reason: Option<String>,
}

/// Read and parse one export file with the given adapter
pub fn load_file<A: ExportAdapter>(
    adapter: &A,
    path: &Path,
    log: &mut dyn LogSink,
) -> FileOutcome<A::Record> {
    log.emit(LogEvent::info(adapter.stage(), "processing file").field("path", path.display()));

    let parsed = read_export(path).and_then(|text| adapter.parse(&text, log));
    match parsed {
        Ok(records) => {
            if records.is_empty() {
                log.emit(
                    LogEvent::warn(adapter.stage(), "file is empty after processing")
                        .field("path", path.display()),
                );
            }
            FileOutcome::Loaded {
                path: path.to_path_buf(),
                records,
            }
        }
        Err(e) => {
            log.emit(
                LogEvent::error(adapter.stage(), "failed to process file")
                    .field("path", path.display())
                    .field("error", &e),
            );
            FileOutcome::Failed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        }
    }
}

/// Load several files of one kind, keeping every outcome
pub fn load_files<A: ExportAdapter>(
    adapter: &A,
    kind: FileKind,
    paths: &[PathBuf],
    log: &mut dyn LogSink,
) -> (Vec<A::Record>, Vec<FileStatus>) {
    let mut records = Vec::new();
    let mut statuses = Vec::with_capacity(paths.len());

    for path in paths {
        let outcome = load_file(adapter, path, log);
        statuses.push(outcome.status(kind));
        records.extend(outcome.into_records());
    }

    (records, statuses)
}

/// Tandem export files found in a folder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TandemFiles {
    pub cgm: Vec<PathBuf>,
    pub basal: Vec<PathBuf>,
    pub bolus: Vec<PathBuf>,
}

/// Normalized tables from one Tandem folder
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TandemReport {
    pub glucose: Vec<GlucoseReading>,
    #[serde(serialize_with = "serialize_series")]
    pub basal: BasalSeries,
    pub bolus: Vec<BolusRecord>,
    pub files: Vec<FileStatus>,
}

impl TandemReport {
    /// Files that could not be processed
    pub fn failures(&self) -> impl Iterator<Item = &FileStatus> {
        self.files.iter().filter(|f| !f.loaded)
    }
}

fn serialize_series<S: serde::Serializer>(series: &BasalSeries, s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(series.values())
}

/// Processor for Tandem export folders
#[derive(Debug, Clone, Default)]
pub struct TandemProcessor {
    config: IngestConfig,
}

impl TandemProcessor {
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    /// Find CGM exports in `folder` and insulin exports in its insulin subfolder
    pub fn discover(&self, folder: &Path, log: &mut dyn LogSink) -> TandemFiles {
        let layout = &self.config.tandem;
        let insulin_dir = folder.join(&layout.insulin_dir);

        let files = TandemFiles {
            cgm: find_exports(folder, &layout.cgm_prefix, log),
            basal: find_exports(&insulin_dir, &layout.basal_prefix, log),
            bolus: find_exports(&insulin_dir, &layout.bolus_prefix, log),
        };

        for (kind, paths) in [
            ("cgm", &files.cgm),
            ("basal", &files.basal),
            ("bolus", &files.bolus),
        ] {
            let mut event = LogEvent::info("discovery", "export files found")
                .field("kind", kind)
                .field("count", paths.len());
            for path in paths {
                if let Some(name) = path.file_name() {
                    event = event.field("file", name.to_string_lossy());
                }
            }
            if paths.is_empty() {
                event = LogEvent::warn("discovery", "no export files found").field("kind", kind);
            }
            log.emit(event);
        }

        files
    }

    /// Process every Tandem export in `folder`
    pub fn process(&self, folder: &Path, log: &mut dyn LogSink) -> TandemReport {
        log.emit(LogEvent::info("batch", "processing Tandem folder").field("folder", folder.display()));

        if !folder.is_dir() {
            log.emit(
                LogEvent::error("batch", "folder does not exist").field("folder", folder.display()),
            );
            return TandemReport::default();
        }

        let files = self.discover(folder, log);
        let mut statuses = Vec::new();

        let cgm = TandemCgmAdapter::new(self.config.tandem.cgm.clone());
        let (mut glucose, cgm_status) = load_files(&cgm, FileKind::TandemCgm, &files.cgm, log);
        sort_and_dedup(&mut glucose, DedupPolicy::FirstWins);
        statuses.extend(cgm_status);
        if !files.cgm.is_empty() {
            log.emit(LogEvent::info("glucose", "combined glucose readings").field("rows", glucose.len()));
        }

        let basal_adapter = BasalLogAdapter::new(self.config.tandem.basal.clone());
        let (events, basal_status) = load_files(&basal_adapter, FileKind::TandemBasal, &files.basal, log);
        statuses.extend(basal_status);
        let splitter = BasalSplitter::with_bucket_minutes(self.config.bucket_minutes());
        let basal = splitter.split(&events);
        if !files.basal.is_empty() {
            log.emit(
                LogEvent::info("basal", "split basal administrations")
                    .field("events", events.len())
                    .field("intervals", basal.len())
                    .field("bucket_minutes", splitter.bucket_minutes())
                    .field("total_units", format!("{:.2}", total_insulin(&basal))),
            );
        }

        let bolus_adapter = BolusLogAdapter::new(self.config.tandem.bolus.clone());
        let (mut bolus, bolus_status) = load_files(&bolus_adapter, FileKind::TandemBolus, &files.bolus, log);
        bolus.sort_by_key(|r| r.time);
        statuses.extend(bolus_status);

        let report = TandemReport {
            glucose,
            basal,
            bolus,
            files: statuses,
        };

        log.emit(
            LogEvent::info("batch", "Tandem folder processed")
                .field("glucose", report.glucose.len())
                .field("basal_intervals", report.basal.len())
                .field("bolus", report.bolus.len())
                .field("failed_files", report.failures().count()),
        );

        report
    }
}

/// Process a Dexcom Clarity export
pub fn process_dexcom(
    path: &Path,
    config: &IngestConfig,
    log: &mut dyn LogSink,
) -> FileOutcome<GlucoseReading> {
    load_file(&DexcomAdapter::new(config.dexcom.clone()), path, log)
}

/// Process a Polar Flow session export
pub fn process_polar(
    path: &Path,
    config: &IngestConfig,
    log: &mut dyn LogSink,
) -> FileOutcome<HeartRateSample> {
    load_file(&PolarAdapter::new(config.polar.clone()), path, log)
}

/// List `<prefix>*.csv` files in `dir`, sorted by name
fn find_exports(dir: &Path, prefix: &str, log: &mut dyn LogSink) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log.emit(
                LogEvent::warn("discovery", "cannot read directory")
                    .field("dir", dir.display())
                    .field("error", e),
            );
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(prefix) && name.ends_with(".csv"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{Level, MemorySink};
    use std::fs;
    use tempfile::TempDir;

    const BASAL: &str = "Periodo\n\
Marca de tiempo,Tipo de insulina,Duración (minutos),Tasa\n\
01/01/2024 08:00,Basal,10,\"1,2\"\n";

    #[test]
    fn test_missing_file_becomes_failed_outcome() {
        let mut log = MemorySink::new();
        let outcome = load_file(
            &BasalLogAdapter::default(),
            Path::new("/nonexistent/basal_data_1.csv"),
            &mut log,
        );

        assert!(!outcome.is_loaded());
        let status = outcome.status(FileKind::TandemBasal);
        assert!(status.reason.is_some());
        assert!(outcome.into_records().is_empty());
        assert_eq!(log.count(Level::Error), 1);
    }

    #[test]
    fn test_find_exports_filters_by_prefix() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("cgm_data_2.csv"), "x").unwrap();
        fs::write(dir.path().join("cgm_data_1.csv"), "x").unwrap();
        fs::write(dir.path().join("cgm_data_1.txt"), "x").unwrap();
        fs::write(dir.path().join("other.csv"), "x").unwrap();

        let mut log = MemorySink::new();
        let found = find_exports(dir.path(), "cgm_data_", &mut log);
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["cgm_data_1.csv", "cgm_data_2.csv"]);
    }

    #[test]
    fn test_missing_folder_yields_empty_report() {
        let mut log = MemorySink::new();
        let report = TandemProcessor::default().process(Path::new("/nonexistent/tandem"), &mut log);
        assert_eq!(report, TandemReport::default());
        assert_eq!(log.count(Level::Error), 1);
    }

    #[test]
    fn test_bad_file_does_not_abort_siblings() {
        let dir = TempDir::new().unwrap();
        let insulin = dir.path().join("Insulin data");
        fs::create_dir(&insulin).unwrap();
        fs::write(insulin.join("basal_data_1.csv"), BASAL).unwrap();
        fs::write(insulin.join("basal_data_2.csv"), "Periodo\nwrong,header\n1,2\n").unwrap();

        let mut log = MemorySink::new();
        let report = TandemProcessor::default().process(dir.path(), &mut log);

        assert_eq!(report.basal.len(), 2);
        assert_eq!(report.failures().count(), 1);
        assert!(report.files.iter().any(|f| f.loaded && f.records == 1));
    }

    #[test]
    fn test_dexcom_outcome() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clarity.csv");
        fs::write(
            &path,
            "Marca temporal (AAAA-MM-DDThh:mm:ss);Nivel de glucosa (mg/dL)\n2024-01-01T08:00:00;110\n",
        )
        .unwrap();

        let mut log = MemorySink::new();
        let outcome = process_dexcom(&path, &IngestConfig::default(), &mut log);
        assert!(outcome.is_loaded());
        assert_eq!(outcome.into_records().len(), 1);
    }
}
