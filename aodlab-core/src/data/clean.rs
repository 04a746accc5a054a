//! Cleaner: sentinel replacement, numeric conversion, plausibility filtering.
//!
//! Every source family has a `ValueProfile` with documented constants. The
//! plausibility check is a hard cutoff, never a statistical test.

use super::parse::{AodRecord, MetRecord};
use crate::domain::{Meteorology, Observation, ObservationSeries, Quantity};
use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// AERONET/flat AOD missing-value code.
pub const AOD_SENTINEL: f64 = -999.0;
/// AOD at or above this is treated as an outlier (cloud contamination, bad fits).
pub const AOD_CEILING: f64 = 2.0;
/// ISD temperature missing-value code (`+9999`).
pub const ISD_TEMPERATURE_SENTINEL: f64 = 9999.0;
/// ISD wind speed missing-value code.
pub const ISD_WIND_SPEED_SENTINEL: f64 = 9999.0;
/// ISD wind direction missing-value code.
pub const ISD_WIND_DIRECTION_SENTINEL: f64 = 999.0;
/// ISD stores temperature and wind speed in tenths.
pub const ISD_TENTHS: f64 = 0.1;
/// Offset from Kelvin to Celsius.
pub const KELVIN_TO_CELSIUS: f64 = -273.15;
/// Plausible near-surface air temperature, °C.
pub const TEMPERATURE_RANGE: (f64, f64) = (-90.0, 60.0);
/// Plausible sustained wind speed, m/s.
pub const WIND_SPEED_RANGE: (f64, f64) = (0.0, 90.0);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CleanError {
    #[error("invalid profile: floor {floor} is above ceiling {ceiling}")]
    InvertedRange { floor: f64, ceiling: f64 },

    #[error("invalid profile: scale must be finite and non-zero, got {0}")]
    BadScale(f64),
}

/// How to turn one textual field into a physical value.
///
/// `value = parsed * scale + offset`; sentinels are compared against the parsed
/// number before scaling, so `"+9999"`, `"9999"` and `"9999.0"` all match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueProfile {
    pub sentinels: Vec<f64>,
    pub scale: f64,
    pub offset: f64,
    /// Inclusive lower bound after scaling.
    pub floor: f64,
    pub ceiling: f64,
    /// Whether `value == ceiling` is still plausible.
    pub ceiling_inclusive: bool,
}

impl ValueProfile {
    /// AERONET level 1.5/2.0 AOD.
    pub fn aeronet_aod() -> Self {
        Self {
            sentinels: vec![AOD_SENTINEL],
            scale: 1.0,
            offset: 0.0,
            floor: 0.0,
            ceiling: AOD_CEILING,
            ceiling_inclusive: false,
        }
    }

    /// Flat `Date`/`AOD` files use the AERONET conventions.
    pub fn flat_aod() -> Self {
        Self::aeronet_aod()
    }

    /// ISD `TMP` in tenths of °C.
    pub fn isd_temperature() -> Self {
        Self {
            sentinels: vec![ISD_TEMPERATURE_SENTINEL],
            scale: ISD_TENTHS,
            offset: 0.0,
            floor: TEMPERATURE_RANGE.0,
            ceiling: TEMPERATURE_RANGE.1,
            ceiling_inclusive: true,
        }
    }

    /// ISD `WND` speed in tenths of m/s.
    pub fn isd_wind_speed() -> Self {
        Self {
            sentinels: vec![ISD_WIND_SPEED_SENTINEL],
            scale: ISD_TENTHS,
            offset: 0.0,
            floor: WIND_SPEED_RANGE.0,
            ceiling: WIND_SPEED_RANGE.1,
            ceiling_inclusive: true,
        }
    }

    /// ISD `WND` direction in degrees.
    pub fn isd_wind_direction() -> Self {
        Self {
            sentinels: vec![ISD_WIND_DIRECTION_SENTINEL],
            scale: 1.0,
            offset: 0.0,
            floor: 0.0,
            ceiling: 360.0,
            ceiling_inclusive: true,
        }
    }

    /// Temperature reported in Kelvin, converted to °C.
    pub fn kelvin_temperature() -> Self {
        Self {
            sentinels: vec![ISD_TEMPERATURE_SENTINEL],
            scale: 1.0,
            offset: KELVIN_TO_CELSIUS,
            floor: TEMPERATURE_RANGE.0,
            ceiling: TEMPERATURE_RANGE.1,
            ceiling_inclusive: true,
        }
    }

    pub fn with_ceiling(mut self, ceiling: f64) -> Self {
        self.ceiling = ceiling;
        self
    }

    pub fn validate(&self) -> Result<(), CleanError> {
        if !self.scale.is_finite() || self.scale == 0.0 {
            return Err(CleanError::BadScale(self.scale));
        }
        if self.floor > self.ceiling {
            return Err(CleanError::InvertedRange {
                floor: self.floor,
                ceiling: self.ceiling,
            });
        }
        Ok(())
    }

    /// Text → scaled value; `None` for blanks, sentinels, and unparseable text.
    pub fn convert(&self, raw: &str) -> Option<f64> {
        let parsed: f64 = raw.trim().parse().ok()?;
        if !parsed.is_finite() || self.sentinels.contains(&parsed) {
            return None;
        }
        Some(parsed * self.scale + self.offset)
    }

    pub fn is_plausible(&self, value: f64) -> bool {
        let below_ceiling = if self.ceiling_inclusive {
            value <= self.ceiling
        } else {
            value < self.ceiling
        };
        value >= self.floor && below_ceiling
    }

    /// Convert and range-check in one step.
    pub fn clean(&self, raw: &str) -> Cleaned {
        match self.convert(raw) {
            None => Cleaned::Absent,
            Some(v) if self.is_plausible(v) => Cleaned::Value(v),
            Some(v) => Cleaned::Outlier(v),
        }
    }
}

/// Outcome of cleaning one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cleaned {
    Value(f64),
    /// Blank, sentinel, or not a number.
    Absent,
    /// Parsed fine but outside the plausible range.
    Outlier(f64),
}

impl Cleaned {
    pub fn value(self) -> Option<f64> {
        match self {
            Cleaned::Value(v) => Some(v),
            Cleaned::Absent | Cleaned::Outlier(_) => None,
        }
    }
}

/// Row counts from one cleaning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanStats {
    pub kept: usize,
    pub absent: usize,
    pub outliers: usize,
}

impl CleanStats {
    fn record(&mut self, c: Cleaned) {
        match c {
            Cleaned::Value(_) => self.kept += 1,
            Cleaned::Absent => self.absent += 1,
            Cleaned::Outlier(_) => self.outliers += 1,
        }
    }
}

/// Clean `(timestamp, text)` pairs into a series, dropping absent values and outliers.
pub fn clean_values<'a, I>(
    quantity: Quantity,
    rows: I,
    profile: &ValueProfile,
) -> Result<(ObservationSeries, CleanStats), CleanError>
where
    I: IntoIterator<Item = (DateTime<Tz>, &'a str)>,
{
    profile.validate()?;
    let mut stats = CleanStats::default();
    let observations = rows
        .into_iter()
        .filter_map(|(timestamp, raw)| {
            let cleaned = profile.clean(raw);
            stats.record(cleaned);
            cleaned.value().map(|v| Observation::new(timestamp, v))
        })
        .collect();

    debug!(
        quantity = %quantity,
        kept = stats.kept,
        absent = stats.absent,
        outliers = stats.outliers,
        "cleaned series"
    );
    Ok((ObservationSeries::new(quantity, observations), stats))
}

/// Clean AOD records. Rows whose AOD is absent or out of range are dropped.
pub fn clean_aod(
    records: &[AodRecord],
    quantity: Quantity,
    profile: &ValueProfile,
) -> Result<ObservationSeries, CleanError> {
    let rows = records.iter().map(|r| (r.timestamp, r.aod.as_str()));
    clean_values(quantity, rows, profile).map(|(series, _)| series)
}

/// Profiles for each ISD sub-measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetProfiles {
    pub temperature: ValueProfile,
    pub wind_speed: ValueProfile,
    pub wind_direction: ValueProfile,
}

impl Default for MetProfiles {
    fn default() -> Self {
        Self {
            temperature: ValueProfile::isd_temperature(),
            wind_speed: ValueProfile::isd_wind_speed(),
            wind_direction: ValueProfile::isd_wind_direction(),
        }
    }
}

/// Wind vector pointing where the air moves to, from the meteorological
/// "blowing from" direction in degrees.
pub fn wind_components(speed: f64, direction_deg: f64) -> (f64, f64) {
    let rad = direction_deg.to_radians();
    (-speed * rad.sin(), -speed * rad.cos())
}

/// Clean ISD records into temperature, speed, and east/north wind series.
///
/// A wind observation needs a valid speed and direction, except calm reports
/// (speed 0), which yield a zero vector without a direction.
pub fn clean_meteorology(
    records: &[MetRecord],
    profiles: &MetProfiles,
) -> Result<Meteorology, CleanError> {
    profiles.temperature.validate()?;
    profiles.wind_speed.validate()?;
    profiles.wind_direction.validate()?;

    let temps = records
        .iter()
        .filter_map(|r| r.temperature.as_deref().map(|t| (r.timestamp, t)));
    let (temperature, _) = clean_values(Quantity::Temperature, temps, &profiles.temperature)?;

    let mut met = Meteorology::empty();
    met.temperature = temperature;

    let mut dropped = 0usize;
    for r in records {
        let speed = r
            .wind_speed
            .as_deref()
            .and_then(|s| profiles.wind_speed.clean(s).value());
        let direction = r
            .wind_direction
            .as_deref()
            .and_then(|d| profiles.wind_direction.clean(d).value());

        let (speed, (east, north)) = match (speed, direction) {
            (Some(s), Some(d)) => (s, wind_components(s, d)),
            (Some(s), None) if s == 0.0 => (s, (0.0, 0.0)),
            _ => {
                dropped += 1;
                continue;
            }
        };

        met.wind_speed
            .observations
            .push(Observation::new(r.timestamp, speed));
        met.wind_east
            .observations
            .push(Observation::new(r.timestamp, east));
        met.wind_north
            .observations
            .push(Observation::new(r.timestamp, north));
    }

    debug!(
        temperature = met.temperature.len(),
        wind = met.wind_speed.len(),
        dropped,
        "cleaned meteorology"
    );
    Ok(met)
}
