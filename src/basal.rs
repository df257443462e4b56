//! Basal interval splitting
//!
//! Pump logs record basal delivery as administrations of arbitrary length. This
//! module breaks each administration into consecutive buckets of at most
//! `bucket_minutes` (5 by default), starting at the administration's own start
//! time, and merges buckets from different administrations that share a start:
//!
//! - insulin and duration are summed
//! - the rate is the plain mean of the contributing rates
//! - the end is the latest contributing end
//!
//! Uncovered time is left uncovered; no zero-dose buckets are synthesized.

use crate::types::{BasalEvent, BasalInterval};
use chrono::{Duration, NaiveDateTime};
use std::collections::BTreeMap;

/// Default bucket width (minutes)
pub const BUCKET_MINUTES: f64 = 5.0;

/// Basal series keyed by bucket start
pub type BasalSeries = BTreeMap<NaiveDateTime, BasalInterval>;

/// Splits basal events into a bucketed interval series
#[derive(Debug, Clone, Copy)]
pub struct BasalSplitter {
    bucket_minutes: f64,
}

impl Default for BasalSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl BasalSplitter {
    /// Create a splitter with 5 minute buckets
    pub fn new() -> Self {
        Self {
            bucket_minutes: BUCKET_MINUTES,
        }
    }

    /// Create a splitter with a custom bucket width.
    ///
    /// Widths that are not strictly positive fall back to the default.
    pub fn with_bucket_minutes(bucket_minutes: f64) -> Self {
        if bucket_minutes.is_finite() && bucket_minutes > 0.0 {
            Self { bucket_minutes }
        } else {
            Self::new()
        }
    }

    pub fn bucket_minutes(&self) -> f64 {
        self.bucket_minutes
    }

    /// Split one event into its provisional sub-intervals.
    ///
    /// The sub-intervals tile `[start, start + duration)`; all but the last are
    /// exactly one bucket wide. Zero or negative durations yield nothing and
    /// negative rates are treated as zero.
    pub fn decompose(&self, event: &BasalEvent) -> Vec<BasalInterval> {
        let rate = effective_rate(event);
        let mut intervals = Vec::new();
        let mut remaining = event.duration_minutes;
        let mut current = event.start_time;

        while remaining > 0.0 {
            let chunk = self.bucket_minutes.min(remaining);
            let end = current + minutes(chunk);

            intervals.push(BasalInterval {
                time: current,
                insulin_units: rate * chunk / 60.0,
                rate_u_per_h: rate,
                duration_minutes: chunk,
                end_timestamp: end,
            });

            current = end;
            remaining -= chunk;
        }

        intervals
    }

    /// Split all events and merge buckets that share a start time
    pub fn split<'a, I>(&self, events: I) -> BasalSeries
    where
        I: IntoIterator<Item = &'a BasalEvent>,
    {
        let mut buckets: BTreeMap<NaiveDateTime, Accumulator> = BTreeMap::new();

        for event in events {
            for interval in self.decompose(event) {
                buckets
                    .entry(interval.time)
                    .and_modify(|acc| acc.add(&interval))
                    .or_insert_with(|| Accumulator::from(&interval));
            }
        }

        buckets
            .into_iter()
            .map(|(time, acc)| (time, acc.finish(time)))
            .collect()
    }
}

/// Split events into 5 minute buckets
pub fn split(events: &[BasalEvent]) -> BasalSeries {
    BasalSplitter::new().split(events)
}

/// Running totals for one bucket start
#[derive(Debug, Clone, Copy)]
struct Accumulator {
    insulin_units: f64,
    duration_minutes: f64,
    rate_sum: f64,
    contributions: u32,
    end_timestamp: NaiveDateTime,
}

impl From<&BasalInterval> for Accumulator {
    fn from(interval: &BasalInterval) -> Self {
        Self {
            insulin_units: interval.insulin_units,
            duration_minutes: interval.duration_minutes,
            rate_sum: interval.rate_u_per_h,
            contributions: 1,
            end_timestamp: interval.end_timestamp,
        }
    }
}

impl Accumulator {
    fn add(&mut self, interval: &BasalInterval) {
        self.insulin_units += interval.insulin_units;
        self.duration_minutes += interval.duration_minutes;
        self.rate_sum += interval.rate_u_per_h;
        self.contributions += 1;
        self.end_timestamp = self.end_timestamp.max(interval.end_timestamp);
    }

    fn finish(self, time: NaiveDateTime) -> BasalInterval {
        BasalInterval {
            time,
            insulin_units: self.insulin_units,
            rate_u_per_h: self.rate_sum / f64::from(self.contributions),
            duration_minutes: self.duration_minutes,
            end_timestamp: self.end_timestamp,
        }
    }
}

fn effective_rate(event: &BasalEvent) -> f64 {
    if event.suspended || !event.rate_u_per_h.is_finite() {
        return 0.0;
    }
    event.rate_u_per_h.max(0.0)
}

/// Fractional minutes as a duration, at microsecond resolution
fn minutes(value: f64) -> Duration {
    Duration::microseconds((value * 60_000_000.0).round() as i64)
}

/// Total insulin across a series (U)
pub fn total_insulin(series: &BasalSeries) -> f64 {
    series.values().map(|i| i.insulin_units).sum()
}
