//! Core types for the Synheart Ingest pipeline
//!
//! This module defines the canonical records every export adapter produces and
//! the basal interval series produced by the splitter.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Export source identifier for provenance tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Tandem,
    Dexcom,
    Polar,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Tandem => "tandem",
            Source::Dexcom => "dexcom",
            Source::Polar => "polar",
        }
    }
}

/// A single continuous glucose monitor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlucoseReading {
    /// Reading time (device wall clock)
    pub time: NaiveDateTime,
    /// Glucose level (mg/dL)
    pub glucose: i64,
}

/// A raw basal administration record from an insulin pump log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasalEvent {
    /// Start of the administration
    pub start_time: NaiveDateTime,
    /// Length of the administration (minutes)
    pub duration_minutes: f64,
    /// Delivery rate (U/h), zero for suspensions
    pub rate_u_per_h: f64,
    /// Whether the pump recorded this administration as a suspension
    pub suspended: bool,
}

impl BasalEvent {
    /// Create a regular basal event
    pub fn new(start_time: NaiveDateTime, duration_minutes: f64, rate_u_per_h: f64) -> Self {
        Self {
            start_time,
            duration_minutes,
            rate_u_per_h,
            suspended: false,
        }
    }

    /// Create a suspension; the rate is always zero
    pub fn suspension(start_time: NaiveDateTime, duration_minutes: f64) -> Self {
        Self {
            start_time,
            duration_minutes,
            rate_u_per_h: 0.0,
            suspended: true,
        }
    }
}

/// One bucket of the basal interval series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasalInterval {
    /// Bucket start
    pub time: NaiveDateTime,
    /// Insulin delivered during the bucket (U)
    #[serde(rename = "insulin_basal_u")]
    pub insulin_units: f64,
    /// Rate in force (U/h), mean of all contributions
    #[serde(rename = "rate_uh")]
    pub rate_u_per_h: f64,
    /// Summed duration of all contributions (minutes)
    pub duration_minutes: f64,
    /// Latest end among all contributions
    pub end_timestamp: NaiveDateTime,
}

/// A bolus administration record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BolusRecord {
    pub time: NaiveDateTime,
    /// Pump-reported bolus kind (e.g. "Estándar", "Extendido")
    pub bolus_type: String,
    /// Blood glucose entered with the bolus (mg/dL)
    pub glucose: Option<f64>,
    /// Carbohydrate intake (g)
    #[serde(rename = "CHO(g)")]
    pub carbs_g: Option<f64>,
    /// Insulin-to-carbohydrate ratio
    pub carb_ratio: Option<f64>,
    /// Total delivered insulin (U)
    pub total_insulin: f64,
    /// Immediate part of the bolus (U)
    pub initial_bolus: Option<f64>,
    /// Extended part of the bolus (U)
    pub extended_bolus: Option<f64>,
}

/// A heart-rate sample from a training session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSample {
    pub time: NaiveDateTime,
    /// Heart rate (bpm)
    pub heart_rate: i64,
}

/// Anything that sits on a timeline
pub trait Timestamped {
    fn timestamp(&self) -> NaiveDateTime;
}

impl Timestamped for GlucoseReading {
    fn timestamp(&self) -> NaiveDateTime {
        self.time
    }
}

impl Timestamped for BasalEvent {
    fn timestamp(&self) -> NaiveDateTime {
        self.start_time
    }
}

impl Timestamped for BasalInterval {
    fn timestamp(&self) -> NaiveDateTime {
        self.time
    }
}

impl Timestamped for BolusRecord {
    fn timestamp(&self) -> NaiveDateTime {
        self.time
    }
}

impl Timestamped for HeartRateSample {
    fn timestamp(&self) -> NaiveDateTime {
        self.time
    }
}
