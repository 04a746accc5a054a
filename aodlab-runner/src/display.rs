//! Axis bounds handed to the presenter.

use aodlab_core::data::BucketedSeries;
use serde::{Deserialize, Serialize};

/// User-chosen y-axis limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayBounds {
    pub aod_min: f64,
    pub aod_max: f64,
    /// Top of the wind magnitude axis, m/s.
    pub max_wind: f64,
}

impl Default for DisplayBounds {
    fn default() -> Self {
        Self {
            aod_min: 0.0,
            aod_max: 0.5,
            max_wind: 10.0,
        }
    }
}

impl DisplayBounds {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.aod_min.is_finite() && self.aod_max.is_finite()) || self.aod_min >= self.aod_max
        {
            return Err(format!(
                "display.aod_min ({}) must be below display.aod_max ({})",
                self.aod_min, self.aod_max
            ));
        }
        if !self.max_wind.is_finite() || self.max_wind <= 0.0 {
            return Err(format!("display.max_wind must be positive, got {}", self.max_wind));
        }
        Ok(())
    }

    pub fn aod_axis(&self) -> AxisRange {
        AxisRange {
            min: self.aod_min,
            max: self.aod_max,
        }
    }

    pub fn wind_axis(&self) -> AxisRange {
        AxisRange {
            min: 0.0,
            max: self.max_wind,
        }
    }

    /// Height at which wind arrows are drawn, one unit below the axis top.
    pub fn wind_arrow_height(&self) -> f64 {
        (self.max_wind - 1.0).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    /// `floor(min)` to `floor(max) + 3` over the non-empty buckets.
    pub fn temperature(series: &BucketedSeries) -> Option<Self> {
        let values = series.buckets.iter().filter_map(|b| b.value);
        let (lo, hi) = values.fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })?;
        Some(Self {
            min: lo.floor(),
            max: hi.floor() + 3.0,
        })
    }
}
