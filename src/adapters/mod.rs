//! Export adapters
//!
//! This module provides adapters that parse raw vendor CSV exports and map them
//! to canonical, vendor-agnostic records. Rows that cannot be coerced are dropped
//! and counted; only problems with the file as a whole are errors.

mod dexcom;
mod polar;
mod tandem;

pub use dexcom::DexcomAdapter;
pub use polar::PolarAdapter;
pub use tandem::{BasalLogAdapter, BolusLogAdapter, TandemCgmAdapter};

use crate::error::IngestError;
use crate::logging::{LogEvent, LogSink};
use crate::types::Source;

/// Trait for vendor export adapters
pub trait ExportAdapter {
    /// Canonical record produced by this adapter
    type Record;

    /// Device vendor of the export
    fn source(&self) -> Source;

    /// Log stage name
    fn stage(&self) -> &'static str;

    /// Parse raw export text into canonical records
    fn parse(&self, text: &str, log: &mut dyn LogSink) -> Result<Vec<Self::Record>, IngestError>;
}

/// Row accounting for one parsed export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowStats {
    pub read: usize,
    pub kept: usize,
    pub dropped: usize,
    pub duplicates: usize,
}

impl RowStats {
    pub(crate) fn report(&self, stage: &'static str, source: Source, log: &mut dyn LogSink) {
        log.emit(
            LogEvent::info(stage, "parsed export rows")
                .field("source", source.as_str())
                .field("read", self.read)
                .field("kept", self.kept)
                .field("dropped", self.dropped)
                .field("duplicates", self.duplicates),
        );
        if self.read > 0 && self.kept == 0 {
            log.emit(
                LogEvent::warn(stage, "export contained no usable rows")
                    .field("source", source.as_str()),
            );
        }
    }
}
