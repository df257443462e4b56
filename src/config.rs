//! Ingest configuration
//!
//! Every vendor export layout is described by data rather than code: column
//! names, the row holding the header, the delimiter, and accepted timestamp
//! formats. Defaults reproduce the Spanish-locale exports the devices produce;
//! a JSON file can override any subset of fields.

use crate::basal::BUCKET_MINUTES;
use crate::error::IngestError;
use crate::normalizer::GlucoseLabels;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Longest basal administration accepted from a pump log (one day)
pub const MAX_BASAL_MINUTES: f64 = 1440.0;

/// Top-level configuration for a batch run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub tandem: TandemLayout,
    pub dexcom: DexcomLayout,
    pub polar: PolarLayout,
    /// Basal bucket width (minutes)
    pub bucket_minutes: Option<f64>,
}

impl IngestConfig {
    /// Parse configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, IngestError> {
        let config: IngestConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, IngestError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn bucket_minutes(&self) -> f64 {
        self.bucket_minutes.unwrap_or(BUCKET_MINUTES)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), IngestError> {
        delimiter_byte(self.tandem.cgm.delimiter)?;
        delimiter_byte(self.tandem.basal.delimiter)?;
        delimiter_byte(self.tandem.bolus.delimiter)?;
        delimiter_byte(self.dexcom.delimiter)?;
        delimiter_byte(self.polar.delimiter)?;

        if let Some(width) = self.bucket_minutes {
            if !(width.is_finite() && width > 0.0) {
                return Err(IngestError::ConfigError(format!(
                    "bucket_minutes must be positive, got {width}"
                )));
            }
        }

        let max = self.tandem.basal.max_duration_minutes;
        if !(max.is_finite() && max > 0.0) {
            return Err(IngestError::ConfigError(format!(
                "max_duration_minutes must be positive, got {max}"
            )));
        }

        for formats in [
            &self.tandem.cgm.time_formats,
            &self.tandem.basal.time_formats,
            &self.tandem.bolus.time_formats,
            &self.dexcom.time_formats,
        ] {
            if formats.is_empty() {
                return Err(IngestError::ConfigError(
                    "at least one timestamp format is required".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Convert a configured delimiter into the byte the CSV reader expects
pub fn delimiter_byte(delimiter: char) -> Result<u8, IngestError> {
    if delimiter.is_ascii() {
        Ok(delimiter as u8)
    } else {
        Err(IngestError::ConfigError(format!(
            "delimiter must be a single ASCII character, got {delimiter:?}"
        )))
    }
}

fn tandem_time_formats() -> Vec<String> {
    vec!["%d/%m/%Y %H:%M".to_string(), "%d/%m/%Y %H:%M:%S".to_string()]
}

/// Tandem pump export folder layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TandemLayout {
    /// Filename prefix of CGM exports in the folder root
    pub cgm_prefix: String,
    /// Subdirectory holding insulin exports
    pub insulin_dir: String,
    pub basal_prefix: String,
    pub bolus_prefix: String,
    pub cgm: TandemCgmLayout,
    pub basal: BasalLayout,
    pub bolus: BolusLayout,
}

impl Default for TandemLayout {
    fn default() -> Self {
        Self {
            cgm_prefix: "cgm_data_".to_string(),
            insulin_dir: "Insulin data".to_string(),
            basal_prefix: "basal_data_".to_string(),
            bolus_prefix: "bolus_data_".to_string(),
            cgm: TandemCgmLayout::default(),
            basal: BasalLayout::default(),
            bolus: BolusLayout::default(),
        }
    }
}

/// Tandem CGM CSV layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TandemCgmLayout {
    /// Zero-based index of the header row
    pub header_row: usize,
    pub delimiter: char,
    pub time_column: String,
    pub glucose_column: String,
    pub time_formats: Vec<String>,
    /// Readings above this value are clipped to it (mg/dL)
    pub glucose_upper: f64,
}

impl Default for TandemCgmLayout {
    fn default() -> Self {
        Self {
            header_row: 1,
            delimiter: ',',
            time_column: "Marca de tiempo".to_string(),
            glucose_column: "Valor de glucosa del MCG (mg/dl)".to_string(),
            time_formats: tandem_time_formats(),
            glucose_upper: 400.0,
        }
    }
}

/// Tandem basal log layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasalLayout {
    pub header_row: usize,
    pub delimiter: char,
    pub time_column: String,
    pub duration_column: String,
    pub rate_column: String,
    pub insulin_type_column: String,
    /// Insulin type values that mark a delivery suspension
    pub suspension_labels: Vec<String>,
    pub time_formats: Vec<String>,
    /// Rows with a longer duration are rejected
    pub max_duration_minutes: f64,
}

impl Default for BasalLayout {
    fn default() -> Self {
        Self {
            header_row: 1,
            delimiter: ',',
            time_column: "Marca de tiempo".to_string(),
            duration_column: "Duración (minutos)".to_string(),
            rate_column: "Tasa".to_string(),
            insulin_type_column: "Tipo de insulina".to_string(),
            suspension_labels: vec!["Suspensión".to_string(), "Suspension".to_string()],
            time_formats: tandem_time_formats(),
            max_duration_minutes: MAX_BASAL_MINUTES,
        }
    }
}

/// Tandem bolus log layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BolusLayout {
    pub header_row: usize,
    pub delimiter: char,
    pub time_column: String,
    pub type_column: String,
    pub glucose_column: String,
    pub carbs_column: String,
    pub carb_ratio_column: String,
    pub total_column: String,
    pub initial_column: String,
    pub extended_column: String,
    pub time_formats: Vec<String>,
}

impl Default for BolusLayout {
    fn default() -> Self {
        Self {
            header_row: 1,
            delimiter: ',',
            time_column: "Marca de tiempo".to_string(),
            type_column: "Tipo de insulina".to_string(),
            glucose_column: "Entrada valor de glucemia (mg/dl)".to_string(),
            carbs_column: "Ingesta de carbohidratos (g)".to_string(),
            carb_ratio_column: "Índice de carbohidratos".to_string(),
            total_column: "Insulina administrada (U)".to_string(),
            initial_column: "Administración inicial (U)".to_string(),
            extended_column: "Administración extendida (U)".to_string(),
            time_formats: tandem_time_formats(),
        }
    }
}

/// Dexcom Clarity export layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DexcomLayout {
    pub header_row: usize,
    pub delimiter: char,
    pub time_column: String,
    pub glucose_column: String,
    pub time_formats: Vec<String>,
    pub labels: GlucoseLabels,
}

impl Default for DexcomLayout {
    fn default() -> Self {
        Self {
            header_row: 0,
            delimiter: ';',
            time_column: "Marca temporal (AAAA-MM-DDThh:mm:ss)".to_string(),
            glucose_column: "Nivel de glucosa (mg/dL)".to_string(),
            time_formats: vec![
                "%Y-%m-%dT%H:%M:%S".to_string(),
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M".to_string(),
                "%Y-%m-%d %H:%M".to_string(),
            ],
            labels: GlucoseLabels::default(),
        }
    }
}

/// Polar Flow session export layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolarLayout {
    pub delimiter: char,
    pub date_column: String,
    pub start_column: String,
    /// Format of "<date> <start time>"
    pub start_format: String,
    pub offset_column: String,
    pub heart_rate_column: String,
}

impl Default for PolarLayout {
    fn default() -> Self {
        Self {
            delimiter: ',',
            date_column: "Date".to_string(),
            start_column: "Start time".to_string(),
            start_format: "%d-%m-%Y %H:%M:%S".to_string(),
            offset_column: "Time".to_string(),
            heart_rate_column: "HR (bpm)".to_string(),
        }
    }
}
