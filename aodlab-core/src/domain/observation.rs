//! Observation: the fundamental measurement unit.

use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What an observation measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Quantity {
    /// Aerosol optical depth at a wavelength (unitless).
    Aod { wavelength_nm: u32 },
    /// Air temperature in degrees Celsius.
    Temperature,
    /// Wind speed in m/s.
    WindSpeed,
    /// Eastward wind component in m/s (direction the air moves to).
    WindEast,
    /// Northward wind component in m/s (direction the air moves to).
    WindNorth,
}

impl Quantity {
    /// Stable snake_case key, used for cache file names and export columns.
    pub fn key(&self) -> String {
        match self {
            Quantity::Aod { wavelength_nm } => format!("aod_{wavelength_nm}nm"),
            Quantity::Temperature => "temperature".into(),
            Quantity::WindSpeed => "wind_speed".into(),
            Quantity::WindEast => "wind_east".into(),
            Quantity::WindNorth => "wind_north".into(),
        }
    }

    /// Inverse of [`Quantity::key`].
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "temperature" => Some(Quantity::Temperature),
            "wind_speed" => Some(Quantity::WindSpeed),
            "wind_east" => Some(Quantity::WindEast),
            "wind_north" => Some(Quantity::WindNorth),
            other => other
                .strip_prefix("aod_")
                .and_then(|s| s.strip_suffix("nm"))
                .and_then(|wl| wl.parse().ok())
                .map(|wavelength_nm| Quantity::Aod { wavelength_nm }),
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Quantity::Aod { .. } => "",
            Quantity::Temperature => "°C",
            Quantity::WindSpeed | Quantity::WindEast | Quantity::WindNorth => "m/s",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A single cleaned measurement.
///
/// The timestamp carries the zone it was recorded in; the aligner converts it
/// to the canonical zone before bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observation {
    pub timestamp: DateTime<Tz>,
    pub value: f64,
}

impl Observation {
    pub fn new(timestamp: DateTime<Tz>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Ordered observations of one quantity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationSeries {
    pub quantity: Quantity,
    pub observations: Vec<Observation>,
}

impl ObservationSeries {
    pub fn new(quantity: Quantity, observations: Vec<Observation>) -> Self {
        Self {
            quantity,
            observations,
        }
    }

    pub fn empty(quantity: Quantity) -> Self {
        Self::new(quantity, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.observations.iter().map(|o| o.value)
    }

    /// Earliest and latest timestamps, if any (does not assume sorted input).
    pub fn time_range(&self) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
        let first = self.observations.iter().map(|o| o.timestamp).min()?;
        let last = self.observations.iter().map(|o| o.timestamp).max()?;
        Some((first, last))
    }
}
