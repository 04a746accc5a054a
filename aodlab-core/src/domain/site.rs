//! Sites and the per-station meteorology bundle.

use super::observation::{ObservationSeries, Quantity};
use super::SiteName;
use serde::Serialize;

/// Cleaned meteorology for one station.
///
/// All four series come from the same source rows, so they share timestamps
/// where both wind sub-fields were valid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Meteorology {
    pub temperature: ObservationSeries,
    pub wind_speed: ObservationSeries,
    pub wind_east: ObservationSeries,
    pub wind_north: ObservationSeries,
}

impl Meteorology {
    pub fn empty() -> Self {
        Self {
            temperature: ObservationSeries::empty(Quantity::Temperature),
            wind_speed: ObservationSeries::empty(Quantity::WindSpeed),
            wind_east: ObservationSeries::empty(Quantity::WindEast),
            wind_north: ObservationSeries::empty(Quantity::WindNorth),
        }
    }

    pub fn series(&self) -> [&ObservationSeries; 4] {
        [
            &self.temperature,
            &self.wind_speed,
            &self.wind_east,
            &self.wind_north,
        ]
    }

    /// Reassemble from individually loaded series. Quantities not given stay
    /// empty; `None` if no meteorology quantity is given at all.
    pub fn from_series(series: Vec<ObservationSeries>) -> Option<Self> {
        let mut out = Self::empty();
        let mut seen = 0;
        for s in series {
            let slot = match s.quantity {
                Quantity::Temperature => &mut out.temperature,
                Quantity::WindSpeed => &mut out.wind_speed,
                Quantity::WindEast => &mut out.wind_east,
                Quantity::WindNorth => &mut out.wind_north,
                Quantity::Aod { .. } => continue,
            };
            *slot = s;
            seen += 1;
        }
        (seen > 0).then_some(out)
    }

    pub fn is_empty(&self) -> bool {
        self.series().iter().all(|s| s.is_empty())
    }
}

/// A named location with its cleaned AOD series.
///
/// Built once per fetch cycle and not mutated afterwards; a new query window
/// builds a new `Site`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Site {
    pub name: SiteName,
    pub aod: ObservationSeries,
}

impl Site {
    pub fn new(name: impl Into<SiteName>, aod: ObservationSeries) -> Self {
        Self {
            name: name.into(),
            aod,
        }
    }
}
