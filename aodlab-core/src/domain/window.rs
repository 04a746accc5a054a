//! Inclusive time window used to slice every series before resampling.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("window start {start} is after end {end}")]
    StartAfterEnd {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("local midnight of {date} does not exist in {timezone}")]
    NonexistentLocalTime { date: NaiveDate, timezone: String },
}

/// `[start, end]`, both bounds inclusive. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, WindowError> {
        if start > end {
            return Err(WindowError::StartAfterEnd { start, end });
        }
        Ok(Self { start, end })
    }

    /// Whole calendar days in `tz`: from local midnight of `start` through the
    /// last instant of `end`. Mirrors slicing a zoned index by date labels.
    pub fn from_dates(start: NaiveDate, end: NaiveDate, tz: Tz) -> Result<Self, WindowError> {
        let open = local_midnight(start, tz)?;
        let after_end = end
            .succ_opt()
            .ok_or_else(|| WindowError::NonexistentLocalTime {
                date: end,
                timezone: tz.name().to_string(),
            })?;
        let close = local_midnight(after_end, tz)? - Duration::nanoseconds(1);
        Self::new(open.with_timezone(&Utc), close.with_timezone(&Utc))
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains<Z: TimeZone>(&self, t: &DateTime<Z>) -> bool {
        let t = t.with_timezone(&Utc);
        self.start <= t && t <= self.end
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }
}

/// Earliest instant of `date` in `tz`.
///
/// A handful of zones skip midnight on DST change days; the first existing
/// minute of that day is used instead.
pub fn local_midnight(date: NaiveDate, tz: Tz) -> Result<DateTime<Tz>, WindowError> {
    (0..=120)
        .filter_map(|minute| date.and_hms_opt(minute / 60, minute % 60, 0))
        .find_map(|naive| tz.from_local_datetime(&naive).earliest())
        .ok_or_else(|| WindowError::NonexistentLocalTime {
            date,
            timezone: tz.name().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn rejects_inverted_window() {
        let a = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            TimeWindow::new(a, b),
            Err(WindowError::StartAfterEnd { .. })
        ));
        assert!(TimeWindow::new(b, b).is_ok());
    }

    #[test]
    fn bounds_are_inclusive() {
        let a = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
        let w = TimeWindow::new(a, b).unwrap();
        assert!(w.contains(&a));
        assert!(w.contains(&b));
        assert!(!w.contains(&(b + Duration::seconds(1))));
        assert!(!w.contains(&(a - Duration::seconds(1))));
    }

    #[test]
    fn from_dates_covers_whole_local_days() {
        let w = TimeWindow::from_dates(date(2024, 7, 1), date(2024, 7, 2), chrono_tz::US::Pacific)
            .unwrap();
        // PDT is UTC-7
        assert_eq!(w.start(), Utc.with_ymd_and_hms(2024, 7, 1, 7, 0, 0).unwrap());
        let last = Utc.with_ymd_and_hms(2024, 7, 3, 6, 59, 59).unwrap();
        assert!(w.contains(&last));
        assert!(!w.contains(&Utc.with_ymd_and_hms(2024, 7, 3, 7, 0, 0).unwrap()));
    }

    #[test]
    fn single_day_window() {
        let w = TimeWindow::from_dates(date(2024, 1, 1), date(2024, 1, 1), Tz::UTC).unwrap();
        assert_eq!(w.span(), Duration::days(1) - Duration::nanoseconds(1));
    }

    #[test]
    fn midnight_in_dst_gap_falls_forward() {
        // Santiago springs forward at local midnight
        let m = local_midnight(date(2024, 9, 8), chrono_tz::America::Santiago).unwrap();
        assert_eq!(m.date_naive(), date(2024, 9, 8));
    }
}
