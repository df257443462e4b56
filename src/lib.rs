//! Synheart Ingest - Normalizes biometric device exports into canonical time series
//!
//! Ingest turns messy vendor exports into clean tables through a deterministic
//! pipeline: file discovery → export adaptation → field normalization →
//! basal interval splitting → table encoding.
//!
//! ## Modules
//!
//! - **Export adapters**: Tandem (CGM, basal, bolus), Dexcom Clarity, Polar Flow
//! - **Basal splitter**: decomposes basal administrations into 5 minute buckets
//! - **Cloud**: HRV measurement service client (`cloud` feature)

pub mod adapters;
pub mod basal;
pub mod cloud;
pub mod config;
pub mod encoder;
pub mod error;
pub mod logging;
pub mod normalizer;
pub mod pipeline;
pub mod table;
pub mod types;

pub use basal::{split, BasalSeries, BasalSplitter};
pub use config::IngestConfig;
pub use error::IngestError;
pub use logging::{LogEvent, LogSink, MemorySink, TracingSink};
pub use pipeline::{process_dexcom, process_polar, FileOutcome, TandemProcessor, TandemReport};
pub use types::{BasalEvent, BasalInterval, BolusRecord, GlucoseReading, HeartRateSample};

/// Ingest version
pub const INGEST_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name used in reports and the HTTP user agent
pub const PRODUCER_NAME: &str = "synheart-ingest";
