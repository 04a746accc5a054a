//! Dashboard configuration (TOML).
//!
//! One immutable value describes a whole run: the query window, canonical
//! timezone, cadences, display bounds, the AOD sites, and the optional
//! meteorology station. The CLI overrides window and cadence fields before
//! handing it to the pipeline.

use aodlab_core::data::cache::site_slug;
use aodlab_core::data::layout::FLAT_TIMESTAMP_FORMAT;
use aodlab_core::data::{
    AeronetParser, CsvLayout, DuplicatePolicy, FlatAodParser, MetProfiles, ValueProfile,
};
use aodlab_core::domain::{Cadence, Quantity, TimeWindow, WindowError};
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::display::DisplayBounds;

/// AERONET wavelength plotted by default.
pub const DEFAULT_WAVELENGTH_NM: u32 = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("parse config TOML: {0}")]
    Parse(String),

    #[error("serialize config TOML: {0}")]
    Serialize(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Window(#[from] WindowError),
}

/// Calendar days in the canonical zone, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResampleConfig {
    /// Bucket width for AOD and temperature.
    pub aod: Cadence,
    /// Bucket width for wind components.
    pub wind: Cadence,
    #[serde(default)]
    pub duplicates: DuplicatePolicy,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            aod: Cadence::ONE_HOUR,
            wind: Cadence::THREE_HOURS,
            duplicates: DuplicatePolicy::default(),
        }
    }
}

/// Layout of an AOD source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteFormat {
    /// AERONET `.lev15` / `.lev20`.
    Aeronet,
    /// Two-column `Date`,`AOD` CSV.
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    pub url: String,
    pub format: SiteFormat,
    #[serde(default = "default_wavelength")]
    pub wavelength_nm: u32,
    /// chrono format string for `flat` files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_format: Option<String>,
    /// Zone the source writes timestamps in (defaults to UTC).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_timezone: Option<Tz>,
    /// Override for the outlier ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ceiling: Option<f64>,
    /// Plot color, passed through to the presenter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

fn default_wavelength() -> u32 {
    DEFAULT_WAVELENGTH_NM
}

/// Unit of the meteorology source's temperature field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    /// ISD tenths of °C.
    #[default]
    TenthsCelsius,
    Kelvin,
}

/// NOAA ISD global-hourly station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeteorologyConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub temperature_unit: TemperatureUnit,
}

impl MeteorologyConfig {
    pub fn profiles(&self) -> MetProfiles {
        let mut profiles = MetProfiles::default();
        if self.temperature_unit == TemperatureUnit::Kelvin {
            profiles.temperature = ValueProfile::kelvin_temperature();
        }
        profiles
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Everything one dashboard run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Canonical zone for bucketing and display.
    pub timezone: Tz,
    pub window: WindowConfig,
    #[serde(default)]
    pub resample: ResampleConfig,
    #[serde(default)]
    pub display: DisplayBounds,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub sites: Vec<SiteConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meteorology: Option<MeteorologyConfig>,
}

impl DashboardConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// The four Central Valley AERONET sites plus the Modesto ISD station.
    pub fn default_dashboard() -> Self {
        let site = |name: &str, url: &str, color: &str| SiteConfig {
            name: name.into(),
            url: url.into(),
            format: SiteFormat::Aeronet,
            wavelength_nm: DEFAULT_WAVELENGTH_NM,
            timestamp_format: None,
            source_timezone: None,
            ceiling: None,
            color: Some(color.into()),
        };

        Self {
            timezone: chrono_tz::US::Pacific,
            window: WindowConfig {
                start: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap_or_default(),
                end: NaiveDate::from_ymd_opt(2024, 5, 7).unwrap_or_default(),
            },
            resample: ResampleConfig::default(),
            display: DisplayBounds::default(),
            http: HttpConfig::default(),
            cache: CacheConfig::default(),
            sites: vec![
                site(
                    "Turlock",
                    "https://raw.githubusercontent.com/Rsaltos7/TurlockAOD2024/refs/heads/main/20240101_20241231_Turlock_CA_USA.lev15",
                    "k",
                ),
                site(
                    "Sacramento",
                    "https://raw.githubusercontent.com/Rsaltos7/SacromentoAOD/refs/heads/main/20240101_20241231_Sacramento_River.lev15",
                    "purple",
                ),
                site(
                    "Modesto",
                    "https://raw.githubusercontent.com/Rsaltos7/ModestoAOD/refs/heads/main/20240101_20241231_Modesto.lev15",
                    "orange",
                ),
                site(
                    "Fresno",
                    "https://raw.githubusercontent.com/Rsaltos7/FresnoAOD/refs/heads/main/20240101_20241231_Fresno_2.lev15",
                    "teal",
                ),
            ],
            meteorology: Some(MeteorologyConfig {
                name: "Modesto ISD".into(),
                url: "https://www.ncei.noaa.gov/data/global-hourly/access/2024/72492623258.csv"
                    .into(),
                temperature_unit: TemperatureUnit::TenthsCelsius,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sites.is_empty() {
            return Err(ConfigError::Invalid("at least one site is required".into()));
        }
        if self.window.start > self.window.end {
            return Err(ConfigError::Invalid(format!(
                "window start {} is after end {}",
                self.window.start, self.window.end
            )));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be positive".into()));
        }
        self.display.validate().map_err(ConfigError::Invalid)?;

        let mut names = HashSet::new();
        for site in &self.sites {
            if site.name.trim().is_empty() {
                return Err(ConfigError::Invalid("site name must not be empty".into()));
            }
            if !names.insert(site.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate site name '{}'",
                    site.name
                )));
            }
            if site.url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("site '{}' has no url", site.name)));
            }
            if site.wavelength_nm == 0 {
                return Err(ConfigError::Invalid(format!(
                    "site '{}': wavelength_nm must be positive",
                    site.name
                )));
            }
            if let Some(ceiling) = site.ceiling {
                if !ceiling.is_finite() || ceiling <= 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "site '{}': ceiling must be positive",
                        site.name
                    )));
                }
            }
        }

        if let Some(met) = &self.meteorology {
            if names.contains(met.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "meteorology name '{}' collides with a site",
                    met.name
                )));
            }
            if met.url.trim().is_empty() {
                return Err(ConfigError::Invalid("meteorology has no url".into()));
            }
        }

        // cache directories are keyed by slug
        let mut slugs: HashMap<String, &str> = HashMap::new();
        let all_names = self
            .sites
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.meteorology.as_ref().map(|m| m.name.as_str()));
        for name in all_names {
            if let Some(other) = slugs.insert(site_slug(name), name) {
                return Err(ConfigError::Invalid(format!(
                    "names '{other}' and '{name}' share the cache key '{}'",
                    site_slug(name)
                )));
            }
        }
        Ok(())
    }

    /// The query window as instants, whole days in the canonical zone.
    pub fn time_window(&self) -> Result<TimeWindow, ConfigError> {
        Ok(TimeWindow::from_dates(
            self.window.start,
            self.window.end,
            self.timezone,
        )?)
    }
}

impl SiteConfig {
    pub fn quantity(&self) -> Quantity {
        Quantity::Aod {
            wavelength_nm: self.wavelength_nm,
        }
    }

    pub fn profile(&self) -> ValueProfile {
        let base = match self.format {
            SiteFormat::Aeronet => ValueProfile::aeronet_aod(),
            SiteFormat::Flat => ValueProfile::flat_aod(),
        };
        match self.ceiling {
            Some(c) => base.with_ceiling(c),
            None => base,
        }
    }

    pub fn aeronet_parser(&self) -> AeronetParser {
        match self.source_timezone {
            Some(tz) => AeronetParser::with_layout(
                CsvLayout::aeronet(self.wavelength_nm).with_timezone(tz),
                self.wavelength_nm,
            ),
            None => AeronetParser::new(self.wavelength_nm),
        }
    }

    pub fn flat_parser(&self) -> FlatAodParser {
        let format = self
            .timestamp_format
            .as_deref()
            .unwrap_or(FLAT_TIMESTAMP_FORMAT);
        let layout = CsvLayout::flat_aod(format);
        let layout = match self.source_timezone {
            Some(tz) => layout.with_timezone(tz),
            None => layout,
        };
        FlatAodParser::with_layout(layout, self.wavelength_nm)
    }
}
