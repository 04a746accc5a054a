//! Domain types for AODLab

pub mod cadence;
pub mod observation;
pub mod site;
pub mod window;

pub use cadence::{Cadence, CadenceError};
pub use observation::{Observation, ObservationSeries, Quantity};
pub use site::{Meteorology, Site};
pub use window::{local_midnight, TimeWindow, WindowError};

/// Site name alias
pub type SiteName = String;
