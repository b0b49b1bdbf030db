//! Time-bucket aggregation over stored records.
//!
//! Pure, stateless computation: given a record set and a bucket
//! specification, produce evenly spaced numeric series. Two addressing modes
//! are supported:
//!
//! - **Absolute time**: bucket centers span `[start, end)` in epoch seconds.
//! - **Time of day**: the date is discarded and each record maps to an hour
//!   of day in `[0, 24)`, optionally split into seven per-weekday series.
//!
//! Bucket edges are **centers**: a record with timestamp `t` belongs to the
//! bucket at `edge` when `edge - width/2 <= t < edge + width/2`. When the
//! spacing between centers is smaller than the width, buckets overlap and a
//! record contributes to several of them (a running window, not double
//! counting).
//!
//! Empty-bucket policy: non-per-post aggregates are `0.0`; per-post
//! aggregates are `f64::NAN`, uniformly across all metrics and modes. NaN is
//! the sentinel callers must check for, never a panic.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

use crate::error::AppError;
use crate::record::Record;

/// Aggregation metric computed per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Number of records.
    Count,
    /// Sum of `num_comments`.
    Comments,
    /// Sum of `2*ups - ups/upvote_ratio` (net score derived from the ratio).
    Score,
    /// Sum of `ups/upvote_ratio` (total votes cast).
    Interactions,
}

impl Metric {
    /// Returns the string representation for logging and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Count => "count",
            Metric::Comments => "comments",
            Metric::Score => "score",
            Metric::Interactions => "interactions",
        }
    }

    /// One record's contribution to a bucket's sum.
    fn contribution(&self, record: &Record) -> f64 {
        match self {
            Metric::Count => 1.0,
            Metric::Comments => record.num_comments as f64,
            Metric::Score => record.score(),
            Metric::Interactions => record.interactions(),
        }
    }
}

/// Specification for one aggregation call.
///
/// `step` is the distance between bucket centers and defaults to `bin_size`
/// (non-overlapping buckets). A smaller `step` yields a sliding window.
#[derive(Debug, Clone)]
pub struct BucketSpec {
    pub start: f64,
    pub end: f64,
    pub bin_size: f64,
    pub step: Option<f64>,
}

impl BucketSpec {
    /// Creates a spec with non-overlapping buckets.
    pub fn new(start: f64, end: f64, bin_size: f64) -> Self {
        Self {
            start,
            end,
            bin_size,
            step: None,
        }
    }

    /// Sets the distance between bucket centers.
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    /// Creates a spec covering one day of hours, for time-of-day mode.
    pub fn time_of_day(bin_size_hours: f64) -> Self {
        Self::new(0.0, 24.0, bin_size_hours)
    }

    fn step(&self) -> f64 {
        self.step.unwrap_or(self.bin_size)
    }

    fn validate(&self) -> Result<(), AppError> {
        if !(self.start < self.end) || self.bin_size <= 0.0 || self.step() <= 0.0 {
            return Err(AppError::InvalidTimeRange {
                start: self.start as i64,
                end: self.end as i64,
            });
        }
        Ok(())
    }
}

/// Bucket layout constructed once per aggregation call, never mutated.
#[derive(Debug, Clone)]
pub struct Bucket {
    edges: Vec<f64>,
    width: f64,
}

impl Bucket {
    /// Builds the bucket layout for a spec.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidTimeRange`] when the range is empty or a
    /// size is non-positive.
    pub fn from_spec(spec: &BucketSpec) -> Result<Self, AppError> {
        spec.validate()?;
        let step = spec.step();

        let mut edges = Vec::new();
        let mut i = 0u64;
        loop {
            // Indexed generation avoids accumulating float error over the range
            let edge = spec.start + i as f64 * step;
            if edge >= spec.end {
                break;
            }
            edges.push(edge);
            i += 1;
        }

        Ok(Self {
            edges,
            width: spec.bin_size,
        })
    }

    /// Bucket centers, ascending.
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// Aggregates pre-extracted `(timestamp, contribution)` samples.
    ///
    /// Samples must be sorted by timestamp; centers ascend, so a sliding
    /// lower-bound pointer replaces the per-record scan over every bucket.
    fn aggregate(&self, samples: &[(f64, f64)], per_post: bool) -> Vec<f64> {
        let half = self.width / 2.0;
        let mut values = vec![0.0f64; self.edges.len()];
        let mut counts = vec![0u64; self.edges.len()];

        let mut lower = 0usize;
        for (i, &edge) in self.edges.iter().enumerate() {
            while lower < samples.len() && samples[lower].0 < edge - half {
                lower += 1;
            }
            let mut j = lower;
            while j < samples.len() && samples[j].0 < edge + half {
                values[i] += samples[j].1;
                counts[i] += 1;
                j += 1;
            }
        }

        if per_post {
            for (value, &count) in values.iter_mut().zip(counts.iter()) {
                // Empty bucket: NaN sentinel, stable across reruns
                *value = if count == 0 {
                    f64::NAN
                } else {
                    *value / count as f64
                };
            }
        }

        values
    }
}

/// One aggregation result: parallel centers and values of equal length.
#[derive(Debug, Clone)]
pub struct BucketSeries {
    pub edges: Vec<f64>,
    pub values: Vec<f64>,
}

/// Which creation timestamp an aggregation reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBasis {
    /// `created_utc`.
    Utc,
    /// `created` (submitter-local epoch as reported upstream).
    Local,
}

fn timestamp(record: &Record, basis: TimeBasis) -> i64 {
    match basis {
        TimeBasis::Utc => record.created_utc,
        TimeBasis::Local => record.created,
    }
}

/// Sorted `(timestamp, contribution)` samples for the metric.
fn extract_samples<F>(records: &[Record], metric: Metric, map_time: F) -> Vec<(f64, f64)>
where
    F: Fn(&Record) -> f64,
{
    let mut samples: Vec<(f64, f64)> = records
        .iter()
        .map(|r| (map_time(r), metric.contribution(r)))
        .collect();
    samples.sort_by(|a, b| a.0.total_cmp(&b.0));
    samples
}

/// Aggregates records over absolute time.
///
/// # Errors
///
/// Returns [`AppError::InvalidTimeRange`] for an invalid spec.
pub fn aggregate_absolute(
    records: &[Record],
    spec: &BucketSpec,
    metric: Metric,
    per_post: bool,
    basis: TimeBasis,
) -> Result<BucketSeries, AppError> {
    let bucket = Bucket::from_spec(spec)?;
    let samples = extract_samples(records, metric, |r| timestamp(r, basis) as f64);
    let values = bucket.aggregate(&samples, per_post);
    Ok(BucketSeries {
        edges: bucket.edges,
        values,
    })
}

/// Hour of day as a real number in `[0, 24)`.
fn hour_of_day(dt: &DateTime<Utc>) -> f64 {
    dt.hour() as f64 + dt.minute() as f64 / 60.0 + dt.second() as f64 / 3600.0
}

fn to_datetime(epoch: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(epoch, 0)
}

/// Aggregates records over hour of day, all weekdays combined.
///
/// The `spec` argument's range is in hours; [`BucketSpec::time_of_day`] covers the full
/// day. Records whose timestamp does not map to a valid datetime are dropped.
///
/// # Errors
///
/// Returns [`AppError::InvalidTimeRange`] for an invalid spec.
pub fn aggregate_time_of_day(
    records: &[Record],
    spec: &BucketSpec,
    metric: Metric,
    per_post: bool,
    basis: TimeBasis,
) -> Result<BucketSeries, AppError> {
    let bucket = Bucket::from_spec(spec)?;
    let mut samples: Vec<(f64, f64)> = records
        .iter()
        .filter_map(|r| {
            to_datetime(timestamp(r, basis)).map(|dt| (hour_of_day(&dt), metric.contribution(r)))
        })
        .collect();
    samples.sort_by(|a, b| a.0.total_cmp(&b.0));
    let values = bucket.aggregate(&samples, per_post);
    Ok(BucketSeries {
        edges: bucket.edges,
        values,
    })
}

/// Weekdays in series order, Monday first.
pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Aggregates records over hour of day, one independent series per weekday.
///
/// Always returns exactly seven `(Weekday, series)` pairs in Monday..Sunday
/// order; a weekday with no records yields an all-zero (or all-NaN for
/// per-post) series.
///
/// # Errors
///
/// Returns [`AppError::InvalidTimeRange`] for an invalid spec.
pub fn aggregate_week_separated(
    records: &[Record],
    spec: &BucketSpec,
    metric: Metric,
    per_post: bool,
    basis: TimeBasis,
) -> Result<Vec<(Weekday, BucketSeries)>, AppError> {
    let bucket = Bucket::from_spec(spec)?;

    let mut per_day: [Vec<(f64, f64)>; 7] = Default::default();
    for record in records {
        if let Some(dt) = to_datetime(timestamp(record, basis)) {
            let day = dt.weekday().num_days_from_monday() as usize;
            per_day[day].push((hour_of_day(&dt), metric.contribution(record)));
        }
    }

    let mut series = Vec::with_capacity(7);
    for (day, samples) in WEEKDAYS.iter().zip(per_day.iter_mut()) {
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));
        let values = bucket.aggregate(samples, per_post);
        series.push((
            *day,
            BucketSeries {
                edges: bucket.edges.clone(),
                values,
            },
        ));
    }

    Ok(series)
}
