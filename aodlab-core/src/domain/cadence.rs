//! Resampling cadence (bucket width).
//!
//! Parsed from pandas-style offset strings: `1h`, `3H`, `30min`, `15T`, `1d`, `90s`.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CadenceError {
    #[error("empty cadence string")]
    Empty,

    #[error("invalid cadence '{0}': expected <count><unit>, unit one of s, min, T, h, H, d, D")]
    Invalid(String),

    #[error("cadence must be positive, got '{0}'")]
    NonPositive(String),

    #[error("cadence '{0}' is longer than the 366-day limit")]
    TooLong(String),
}

/// Fixed bucket width, between one second and [`Cadence::MAX_SECONDS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cadence {
    seconds: i64,
}

impl Cadence {
    pub const ONE_HOUR: Self = Self { seconds: 3600 };
    pub const THREE_HOURS: Self = Self { seconds: 3 * 3600 };

    /// Longest accepted width. Keeps millisecond arithmetic on the grid in range.
    pub const MAX_SECONDS: i64 = 366 * 86_400;

    pub fn from_seconds(seconds: i64) -> Result<Self, CadenceError> {
        if seconds <= 0 {
            return Err(CadenceError::NonPositive(format!("{seconds}s")));
        }
        if seconds > Self::MAX_SECONDS {
            return Err(CadenceError::TooLong(format!("{seconds}s")));
        }
        Ok(Self { seconds })
    }

    pub fn hours(hours: i64) -> Result<Self, CadenceError> {
        let seconds = hours
            .checked_mul(3600)
            .ok_or_else(|| CadenceError::TooLong(format!("{hours}h")))?;
        Self::from_seconds(seconds)
    }

    pub fn minutes(minutes: i64) -> Result<Self, CadenceError> {
        let seconds = minutes
            .checked_mul(60)
            .ok_or_else(|| CadenceError::TooLong(format!("{minutes}min")))?;
        Self::from_seconds(seconds)
    }

    pub fn as_seconds(&self) -> i64 {
        self.seconds
    }

    pub fn as_millis(&self) -> i64 {
        self.seconds * 1000
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.seconds)
    }

    /// This cadence multiplied by `factor` (used when coarsening buckets).
    pub fn times(&self, factor: usize) -> Result<Self, CadenceError> {
        let seconds = i64::try_from(factor)
            .ok()
            .and_then(|f| self.seconds.checked_mul(f))
            .ok_or_else(|| CadenceError::Invalid(format!("{self} x {factor}")))?;
        Self::from_seconds(seconds)
    }

    /// Half this cadence, if it divides evenly into whole seconds.
    pub fn halved(&self) -> Option<Self> {
        (self.seconds % 2 == 0 && self.seconds > 1).then(|| Self {
            seconds: self.seconds / 2,
        })
    }
}

impl FromStr for Cadence {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CadenceError::Empty);
        }

        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (count, unit) = s.split_at(split);
        // pandas allows a bare unit ("h" == "1h")
        let count: i64 = if count.is_empty() {
            1
        } else {
            count
                .parse()
                .map_err(|_| CadenceError::Invalid(s.to_string()))?
        };

        let unit_seconds = match unit {
            "s" | "S" => 1,
            "min" | "T" => 60,
            "h" | "H" => 3600,
            "d" | "D" => 86_400,
            _ => return Err(CadenceError::Invalid(s.to_string())),
        };

        if count == 0 {
            return Err(CadenceError::NonPositive(s.to_string()));
        }
        let seconds = count
            .checked_mul(unit_seconds)
            .ok_or_else(|| CadenceError::TooLong(s.to_string()))?;
        Self::from_seconds(seconds).map_err(|e| match e {
            CadenceError::TooLong(_) => CadenceError::TooLong(s.to_string()),
            other => other,
        })
    }
}

impl TryFrom<String> for Cadence {
    type Error = CadenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cadence> for String {
    fn from(value: Cadence) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.seconds;
        if s % 86_400 == 0 {
            write!(f, "{}d", s / 86_400)
        } else if s % 3600 == 0 {
            write!(f, "{}h", s / 3600)
        } else if s % 60 == 0 {
            write!(f, "{}min", s / 60)
        } else {
            write!(f, "{s}s")
        }
    }
}
