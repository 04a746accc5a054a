//! Time alignment: timezone normalization, windowing, bucketed resampling.
//!
//! Bucket grids are anchored at local midnight (canonical zone) of the window
//! start's day, so every series resampled with the same window and width shares
//! identical bucket boundaries. Empty buckets carry `None`, never a fill value.

use crate::domain::{
    local_midnight, Cadence, CadenceError, Observation, ObservationSeries, Quantity, TimeWindow,
    WindowError,
};
use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Refuse grids larger than this many buckets (about 1 year at 3s).
pub const MAX_BUCKETS: usize = 10_000_000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AlignError {
    #[error("window {start} .. {end} contains no {quantity} samples")]
    EmptyWindow {
        quantity: Quantity,
        start: DateTime<chrono::Utc>,
        end: DateTime<chrono::Utc>,
    },

    #[error(transparent)]
    InvalidWindow(#[from] WindowError),

    #[error(transparent)]
    InvalidCadence(#[from] CadenceError),

    #[error("bucket grid of {buckets} buckets exceeds limit of {limit}")]
    GridTooLarge { buckets: usize, limit: usize },

    #[error("cannot coarsen by a factor of zero")]
    ZeroFactor,
}

/// How samples sharing one timestamp are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the sample that appears last in source order.
    #[default]
    LastWins,
    /// Average all samples at that timestamp.
    Mean,
}

/// One fixed-width interval `[start, start + width)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bucket {
    pub start: DateTime<Tz>,
    /// Mean of the samples inside, `None` when there were none.
    pub value: Option<f64>,
    pub count: usize,
}

impl Bucket {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// A resampled series on a regular grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketedSeries {
    pub quantity: Quantity,
    pub width: Cadence,
    /// Grid anchor; every bucket start is `origin + k * width`.
    pub origin: DateTime<Tz>,
    pub buckets: Vec<Bucket>,
}

impl BucketedSeries {
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of buckets holding at least one sample.
    pub fn filled(&self) -> usize {
        self.buckets.iter().filter(|b| !b.is_empty()).count()
    }

    pub fn starts(&self) -> impl Iterator<Item = DateTime<Tz>> + '_ {
        self.buckets.iter().map(|b| b.start)
    }

    /// `(start, value)` for every non-empty bucket.
    pub fn samples(&self) -> Vec<(DateTime<Tz>, f64)> {
        self.buckets
            .iter()
            .filter_map(|b| b.value.map(|v| (b.start, v)))
            .collect()
    }

    pub fn timezone(&self) -> Tz {
        self.origin.timezone()
    }
}

/// Convert every timestamp to `tz` and sort ascending (stable, so source order
/// survives among equal timestamps).
pub fn normalize(series: &ObservationSeries, tz: Tz) -> ObservationSeries {
    let mut observations: Vec<Observation> = series
        .observations
        .iter()
        .map(|o| Observation::new(o.timestamp.with_timezone(&tz), o.value))
        .collect();
    observations.sort_by_key(|o| o.timestamp);
    ObservationSeries::new(series.quantity, observations)
}

/// Collapse runs of equal timestamps. Input must be sorted (see [`normalize`]).
pub fn dedupe(series: &ObservationSeries, policy: DuplicatePolicy) -> ObservationSeries {
    let mut out: Vec<Observation> = Vec::with_capacity(series.len());
    let mut run = 0usize;
    let mut sum = 0.0;

    for obs in &series.observations {
        match out.last_mut() {
            Some(last) if last.timestamp == obs.timestamp => {
                run += 1;
                sum += obs.value;
                last.value = match policy {
                    DuplicatePolicy::LastWins => obs.value,
                    DuplicatePolicy::Mean => sum / run as f64,
                };
            }
            _ => {
                out.push(*obs);
                run = 1;
                sum = obs.value;
            }
        }
    }

    ObservationSeries::new(series.quantity, out)
}

/// Keep only samples inside the inclusive window.
pub fn restrict(series: &ObservationSeries, window: &TimeWindow) -> ObservationSeries {
    let observations = series
        .observations
        .iter()
        .filter(|o| window.contains(&o.timestamp))
        .copied()
        .collect();
    ObservationSeries::new(series.quantity, observations)
}

/// Grid origin for a window: local midnight in `tz` of the window start's day.
pub fn grid_origin(window: &TimeWindow, tz: Tz) -> Result<DateTime<Tz>, AlignError> {
    let day = window.start().with_timezone(&tz).date_naive();
    Ok(local_midnight(day, tz)?)
}

fn bucket_index(origin: &DateTime<Tz>, t: &DateTime<Tz>, width_ms: i64) -> i64 {
    (t.timestamp_millis() - origin.timestamp_millis()).div_euclid(width_ms)
}

fn bucket_start(origin: &DateTime<Tz>, index: i64, width_ms: i64) -> DateTime<Tz> {
    *origin + Duration::milliseconds(index * width_ms)
}

/// Average samples into `width` buckets covering the whole window.
///
/// Bucket boundaries follow the grid from [`grid_origin`], but every label
/// lies inside the window: a bucket that opens before the window start is
/// labelled with the window start. Samples outside the window are ignored.
/// Fails with `EmptyWindow` if no sample falls inside it.
pub fn resample(
    series: &ObservationSeries,
    window: &TimeWindow,
    width: Cadence,
    tz: Tz,
) -> Result<BucketedSeries, AlignError> {
    let origin = grid_origin(window, tz)?;
    let width_ms = width.as_millis();
    let start = window.start().with_timezone(&tz);
    let end = window.end().with_timezone(&tz);

    let first = bucket_index(&origin, &start, width_ms);
    let last = bucket_index(&origin, &end, width_ms);
    let len = usize::try_from(last - first + 1).unwrap_or(usize::MAX);
    if len > MAX_BUCKETS {
        return Err(AlignError::GridTooLarge {
            buckets: len,
            limit: MAX_BUCKETS,
        });
    }

    let mut sums = vec![0.0f64; len];
    let mut counts = vec![0usize; len];
    for obs in &series.observations {
        if !window.contains(&obs.timestamp) {
            continue;
        }
        let slot = (bucket_index(&origin, &obs.timestamp, width_ms) - first) as usize;
        sums[slot] += obs.value;
        counts[slot] += 1;
    }

    let used: usize = counts.iter().sum();
    if used == 0 {
        return Err(AlignError::EmptyWindow {
            quantity: series.quantity,
            start: window.start(),
            end: window.end(),
        });
    }

    let buckets: Vec<Bucket> = sums
        .into_iter()
        .zip(counts)
        .enumerate()
        .map(|(i, (sum, count))| Bucket {
            // the first bucket usually opens before the window; label it at the window start
            start: bucket_start(&origin, first + i as i64, width_ms).max(start),
            value: (count > 0).then(|| sum / count as f64),
            count,
        })
        .collect();

    debug!(
        quantity = %series.quantity,
        width = %width,
        buckets = buckets.len(),
        samples = used,
        "resampled series"
    );

    Ok(BucketedSeries {
        quantity: series.quantity,
        width,
        origin,
        buckets,
    })
}

/// Merge groups of `factor` adjacent buckets with a count-weighted mean.
///
/// Groups are aligned to the series origin, so coarsening a half-width grid
/// by 2 yields the same buckets as resampling at full width.
pub fn coarsen(series: &BucketedSeries, factor: usize) -> Result<BucketedSeries, AlignError> {
    if factor == 0 {
        return Err(AlignError::ZeroFactor);
    }
    let width = series.width.times(factor)?;
    let old_ms = series.width.as_millis();
    let new_ms = width.as_millis();

    // (group index, label of the first child, weighted sum, count)
    type Group = (i64, DateTime<Tz>, f64, usize);
    let mut buckets: Vec<Bucket> = Vec::new();
    let mut current: Option<Group> = None;

    let flush = |buckets: &mut Vec<Bucket>, (index, first, sum, count): Group| {
        buckets.push(Bucket {
            start: bucket_start(&series.origin, index, new_ms).max(first),
            value: (count > 0).then(|| sum / count as f64),
            count,
        });
    };

    for b in &series.buckets {
        let index = bucket_index(&series.origin, &b.start, old_ms)
            .checked_mul(old_ms)
            .map(|offset| offset.div_euclid(new_ms))
            .unwrap_or_default();
        let weighted = b.value.map_or(0.0, |v| v * b.count as f64);

        current = match current {
            Some((i, first, sum, count)) if i == index => {
                Some((i, first, sum + weighted, count + b.count))
            }
            Some(done) => {
                flush(&mut buckets, done);
                Some((index, b.start, weighted, b.count))
            }
            None => Some((index, b.start, weighted, b.count)),
        };
    }
    if let Some(done) = current {
        flush(&mut buckets, done);
    }

    Ok(BucketedSeries {
        quantity: series.quantity,
        width,
        origin: series.origin,
        buckets,
    })
}

/// Full alignment for one canonical zone, window, and duplicate policy.
#[derive(Debug, Clone, Copy)]
pub struct Aligner {
    tz: Tz,
    window: TimeWindow,
    policy: DuplicatePolicy,
}

impl Aligner {
    pub fn new(tz: Tz, window: TimeWindow) -> Self {
        Self {
            tz,
            window,
            policy: DuplicatePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    /// Normalize, dedupe, restrict, and resample.
    pub fn align(
        &self,
        series: &ObservationSeries,
        width: Cadence,
    ) -> Result<BucketedSeries, AlignError> {
        let normalized = normalize(series, self.tz);
        let unique = dedupe(&normalized, self.policy);
        let inside = restrict(&unique, &self.window);
        debug!(
            quantity = %series.quantity,
            input = series.len(),
            duplicates = normalized.len() - unique.len(),
            outside = unique.len() - inside.len(),
            "aligning series"
        );
        resample(&inside, &self.window, width, self.tz)
    }
}
