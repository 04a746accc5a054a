//! Linear interpolation of one series onto another series' time grid.
//!
//! Query points before the first or after the last sample yield `None`.

use super::align::BucketedSeries;
use crate::domain::{ObservationSeries, Quantity};
use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;

/// Values of one quantity evaluated at arbitrary instants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterpolatedSeries {
    pub quantity: Quantity,
    pub points: Vec<(DateTime<Tz>, Option<f64>)>,
}

impl InterpolatedSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of points with a value.
    pub fn defined(&self) -> usize {
        self.points.iter().filter(|(_, v)| v.is_some()).count()
    }
}

/// Value at `t` from samples sorted by time.
pub fn interpolate_at(samples: &[(DateTime<Tz>, f64)], t: DateTime<Tz>) -> Option<f64> {
    let (first, last) = (samples.first()?, samples.last()?);
    if t < first.0 || t > last.0 {
        return None;
    }

    // First sample strictly after t; t lies in [samples[i-1], samples[i])
    let i = samples.partition_point(|(ts, _)| *ts <= t);
    if i == samples.len() {
        return Some(last.1);
    }
    let (t0, v0) = samples[i - 1];
    let (t1, v1) = samples[i];
    if t0 == t {
        return Some(v0);
    }

    let span = (t1 - t0).num_milliseconds() as f64;
    let offset = (t - t0).num_milliseconds() as f64;
    Some(v0 + (v1 - v0) * offset / span)
}

/// Evaluate an observation series at each grid instant.
pub fn interpolate_observations(
    series: &ObservationSeries,
    grid: impl IntoIterator<Item = DateTime<Tz>>,
) -> InterpolatedSeries {
    let mut samples: Vec<(DateTime<Tz>, f64)> = series
        .observations
        .iter()
        .map(|o| (o.timestamp, o.value))
        .collect();
    samples.sort_by_key(|(t, _)| *t);
    evaluate(series.quantity, &samples, grid)
}

/// Evaluate `series` at every bucket start of `grid`. Empty buckets of
/// `series` are not used as samples.
pub fn align_onto(grid: &BucketedSeries, series: &BucketedSeries) -> InterpolatedSeries {
    evaluate(series.quantity, &series.samples(), grid.starts())
}

fn evaluate(
    quantity: Quantity,
    samples: &[(DateTime<Tz>, f64)],
    grid: impl IntoIterator<Item = DateTime<Tz>>,
) -> InterpolatedSeries {
    let points = grid
        .into_iter()
        .map(|t| (t, interpolate_at(samples, t)))
        .collect();
    InterpolatedSeries { quantity, points }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::align::resample;
    use crate::domain::{Cadence, Observation, TimeWindow};
    use chrono::{TimeZone, Utc};

    fn at(h: u32) -> DateTime<Tz> {
        Tz::UTC.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn linear_between_samples() {
        let samples = vec![(at(0), 0.0), (at(3), 3.0), (at(6), 0.0)];
        assert_eq!(interpolate_at(&samples, at(0)), Some(0.0));
        assert!((interpolate_at(&samples, at(1)).unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(interpolate_at(&samples, at(3)), Some(3.0));
        assert!((interpolate_at(&samples, at(4)).unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(interpolate_at(&samples, at(6)), Some(0.0));
    }

    #[test]
    fn never_extrapolates() {
        let samples = vec![(at(2), 1.0), (at(4), 2.0)];
        assert_eq!(interpolate_at(&samples, at(1)), None);
        assert_eq!(interpolate_at(&samples, at(5)), None);
        assert_eq!(interpolate_at(&[], at(3)), None);
    }

    #[test]
    fn align_wind_onto_hourly_grid() {
        let w = TimeWindow::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
        )
        .unwrap();
        let aod = ObservationSeries::new(
            Quantity::Aod { wavelength_nm: 500 },
            (0..=8).map(|h| Observation::new(at(h), 0.1)).collect(),
        );
        let wind = ObservationSeries::new(
            Quantity::WindEast,
            vec![Observation::new(at(0), 0.0), Observation::new(at(3), 3.0)],
        );

        let aod_grid = resample(&aod, &w, Cadence::hours(1).unwrap(), Tz::UTC).unwrap();
        let wind_3h = resample(&wind, &w, Cadence::hours(3).unwrap(), Tz::UTC).unwrap();
        let onto = align_onto(&aod_grid, &wind_3h);

        assert_eq!(onto.quantity, Quantity::WindEast);
        assert_eq!(onto.len(), 9);
        assert!((onto.points[2].1.unwrap() - 2.0).abs() < 1e-9);
        // No wind sample after 03:00
        assert_eq!(onto.points[4].1, None);
        assert_eq!(onto.defined(), 4);
    }

    #[test]
    fn unsorted_observations_are_sorted_first() {
        let s = ObservationSeries::new(
            Quantity::Temperature,
            vec![Observation::new(at(4), 4.0), Observation::new(at(0), 0.0)],
        );
        let out = interpolate_observations(&s, [at(2)]);
        assert!((out.points[0].1.unwrap() - 2.0).abs() < 1e-9);
    }
}
