//! Multi-site dashboard pipeline.
//!
//! For every configured site: obtain the cleaned AOD series (cache or
//! fetch → parse → clean), then align it to the window and AOD cadence.
//! The meteorology station runs alongside the sites. Each source fails on
//! its own; the report carries whatever succeeded plus the failures.

use aodlab_core::data::{
    align_onto, clean_aod, clean_meteorology, AlignError, Aligner, BucketedSeries, CacheError,
    CleanError, FetchError, InterpolatedSeries, IsdParser, ParseError, RecordParser, SeriesCache,
    SourceFetcher,
};
use aodlab_core::domain::{
    Cadence, Meteorology, ObservationSeries, Quantity, Site, TimeWindow,
};
use chrono_tz::Tz;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{
    ConfigError, DashboardConfig, MeteorologyConfig, ResampleConfig, SiteConfig, SiteFormat,
};
use crate::display::{AxisRange, DisplayBounds};

/// How the pipeline treats the network and the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Never fetch; only cached series are used.
    pub offline: bool,
    /// Ignore cached series and fetch again (the cache is still refreshed).
    pub refresh: bool,
}

/// Errors for one site or the meteorology station.
#[derive(Debug, Error)]
pub enum SiteError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("clean failed: {0}")]
    Clean(#[from] CleanError),

    #[error("no {quantity} data in the requested window")]
    Empty { quantity: Quantity },

    #[error("align failed: {0}")]
    Align(AlignError),

    #[error("cache: {0}")]
    Cache(#[from] CacheError),
}

impl From<AlignError> for SiteError {
    fn from(e: AlignError) -> Self {
        match e {
            AlignError::EmptyWindow { quantity, .. } => SiteError::Empty { quantity },
            other => SiteError::Align(other),
        }
    }
}

/// Progress callbacks, invoked from worker threads.
pub trait PipelineProgress: Sync {
    fn on_source_start(&self, name: &str, index: usize, total: usize);
    fn on_source_complete(&self, name: &str, index: usize, total: usize, error: Option<&SiteError>);
}

/// Progress reporter that logs through `tracing`.
pub struct LogProgress;

impl PipelineProgress for LogProgress {
    fn on_source_start(&self, name: &str, index: usize, total: usize) {
        debug!(site = name, index = index + 1, total, "processing source");
    }

    fn on_source_complete(&self, name: &str, index: usize, total: usize, error: Option<&SiteError>) {
        match error {
            None => info!(site = name, index = index + 1, total, "source ready"),
            Some(e) => warn!(site = name, index = index + 1, total, error = %e, "source failed"),
        }
    }
}

/// Progress reporter that does nothing.
pub struct NoProgress;

impl PipelineProgress for NoProgress {
    fn on_source_start(&self, _name: &str, _index: usize, _total: usize) {}
    fn on_source_complete(&self, _: &str, _: usize, _: usize, _: Option<&SiteError>) {}
}

/// Where a cleaned series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesSource {
    Fetched,
    Cache,
}

/// Aligned AOD for one site.
#[derive(Debug, Clone, Serialize)]
pub struct SiteSeries {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub source: SeriesSource,
    /// Cleaned observations before windowing.
    pub observations: usize,
    pub aod: BucketedSeries,
}

/// Aligned meteorology for the station.
///
/// Each quantity is `None` when it had no valid value in the window; at
/// least one is always present.
#[derive(Debug, Clone, Serialize)]
pub struct MeteorologySeries {
    pub name: String,
    pub url: String,
    pub source: SeriesSource,
    /// At the AOD cadence.
    pub temperature: Option<BucketedSeries>,
    /// The following at the wind cadence.
    pub wind_speed: Option<BucketedSeries>,
    pub wind_east: Option<BucketedSeries>,
    pub wind_north: Option<BucketedSeries>,
    /// Wind components interpolated onto the AOD grid, for overlays.
    pub wind_east_on_aod_grid: Option<InterpolatedSeries>,
    pub wind_north_on_aod_grid: Option<InterpolatedSeries>,
    pub temperature_axis: Option<AxisRange>,
}

impl MeteorologySeries {
    /// The aligned quantities that are present, in a fixed order.
    pub fn series(&self) -> impl Iterator<Item = &BucketedSeries> {
        [
            &self.temperature,
            &self.wind_speed,
            &self.wind_east,
            &self.wind_north,
        ]
        .into_iter()
        .flatten()
    }
}

/// Everything one run produced.
#[derive(Debug)]
pub struct DashboardReport {
    pub window: TimeWindow,
    pub timezone: Tz,
    pub aod_cadence: Cadence,
    pub wind_cadence: Cadence,
    pub display: DisplayBounds,
    /// In configuration order.
    pub sites: Vec<SiteSeries>,
    pub meteorology: Option<MeteorologySeries>,
    pub failures: Vec<(String, SiteError)>,
}

impl DashboardReport {
    pub fn source_count(&self) -> usize {
        self.sites.len() + usize::from(self.meteorology.is_some()) + self.failures.len()
    }

    /// True when no source produced any series.
    pub fn all_failed(&self) -> bool {
        self.sites.is_empty() && self.meteorology.is_none()
    }
}

/// Shared, read-only state for one run.
struct RunContext<'a> {
    fetcher: &'a dyn SourceFetcher,
    cache: Option<&'a SeriesCache>,
    options: PipelineOptions,
    aligner: Aligner,
}

/// Run every configured source and collect the aligned series.
///
/// Only an invalid configuration is an error; source failures land in
/// [`DashboardReport::failures`].
pub fn run_dashboard(
    config: &DashboardConfig,
    fetcher: &dyn SourceFetcher,
    cache: Option<&SeriesCache>,
    options: PipelineOptions,
    progress: &dyn PipelineProgress,
) -> Result<DashboardReport, ConfigError> {
    config.validate()?;
    let window = config.time_window()?;
    let ctx = RunContext {
        fetcher,
        cache,
        options,
        aligner: Aligner::new(config.timezone, window).with_policy(config.resample.duplicates),
    };
    let total = config.sites.len() + usize::from(config.meteorology.is_some());

    info!(
        sites = config.sites.len(),
        start = %config.window.start,
        end = %config.window.end,
        timezone = %config.timezone.name(),
        offline = options.offline,
        "running dashboard pipeline"
    );

    let (site_results, met_result) = rayon::join(
        || {
            config
                .sites
                .par_iter()
                .enumerate()
                .map(|(i, site)| {
                    progress.on_source_start(&site.name, i, total);
                    let result = process_site(&ctx, site, config.resample.aod);
                    progress.on_source_complete(&site.name, i, total, result.as_ref().err());
                    (site.name.clone(), result)
                })
                .collect::<Vec<_>>()
        },
        || {
            config.meteorology.as_ref().map(|met| {
                let index = total - 1;
                progress.on_source_start(&met.name, index, total);
                let result = process_meteorology(&ctx, met, &config.resample);
                progress.on_source_complete(&met.name, index, total, result.as_ref().err());
                (met.name.clone(), result)
            })
        },
    );

    let mut sites = Vec::with_capacity(site_results.len());
    let mut failures = Vec::new();
    for (name, result) in site_results {
        match result {
            Ok(series) => sites.push(series),
            Err(e) => failures.push((name, e)),
        }
    }

    let meteorology = match met_result {
        Some((_, Ok(mut met))) => {
            if let Some(grid) = sites.first() {
                met.wind_east_on_aod_grid =
                    met.wind_east.as_ref().map(|w| align_onto(&grid.aod, w));
                met.wind_north_on_aod_grid =
                    met.wind_north.as_ref().map(|w| align_onto(&grid.aod, w));
            }
            Some(met)
        }
        Some((name, Err(e))) => {
            failures.push((name, e));
            None
        }
        None => None,
    };

    info!(
        succeeded = sites.len() + usize::from(meteorology.is_some()),
        failed = failures.len(),
        "dashboard pipeline finished"
    );

    Ok(DashboardReport {
        window,
        timezone: config.timezone,
        aod_cadence: config.resample.aod,
        wind_cadence: config.resample.wind,
        display: config.display,
        sites,
        meteorology,
        failures,
    })
}

fn process_site(
    ctx: &RunContext<'_>,
    config: &SiteConfig,
    cadence: Cadence,
) -> Result<SiteSeries, SiteError> {
    let quantity = config.quantity();
    let (aod, source) = match cached_series(ctx, &config.name, quantity, &config.url)? {
        Some(series) => (series, SeriesSource::Cache),
        None => {
            let body = ctx.fetcher.fetch(&config.url)?;
            let records = match config.format {
                SiteFormat::Aeronet => config.aeronet_parser().parse(body.as_bytes())?,
                SiteFormat::Flat => config.flat_parser().parse(body.as_bytes())?,
            };
            let cleaned = clean_aod(&records, quantity, &config.profile())?;
            debug!(
                site = %config.name,
                rows = records.len(),
                dropped = records.len() - cleaned.len(),
                "cleaned AOD"
            );
            store(ctx, &config.name, &cleaned, &config.url);
            (cleaned, SeriesSource::Fetched)
        }
    };

    let site = Site::new(config.name.clone(), aod);
    let aligned = ctx.aligner.align(&site.aod, cadence)?;
    debug!(site = %site.name, buckets = aligned.len(), filled = aligned.filled(), "aligned AOD");

    Ok(SiteSeries {
        name: site.name,
        url: config.url.clone(),
        color: config.color.clone(),
        source,
        observations: site.aod.len(),
        aod: aligned,
    })
}

fn process_meteorology(
    ctx: &RunContext<'_>,
    config: &MeteorologyConfig,
    resample: &ResampleConfig,
) -> Result<MeteorologySeries, SiteError> {
    let (met, source) = match cached_meteorology(ctx, config)? {
        Some(met) => (met, SeriesSource::Cache),
        None => {
            let body = ctx.fetcher.fetch(&config.url)?;
            let records = IsdParser::new().parse(body.as_bytes())?;
            let met = clean_meteorology(&records, &config.profiles())?;
            debug!(
                site = %config.name,
                rows = records.len(),
                temperature = met.temperature.len(),
                wind = met.wind_speed.len(),
                "cleaned meteorology"
            );
            for series in met.series() {
                store(ctx, &config.name, series, &config.url);
            }
            (met, SeriesSource::Fetched)
        }
    };

    // A quantity with nothing in the window drops out on its own; the
    // station fails only when every quantity does.
    let mut first_error: Option<SiteError> = None;
    let mut align = |series: &ObservationSeries, cadence: Cadence| {
        match ctx.aligner.align(series, cadence) {
            Ok(aligned) => Some(aligned),
            Err(e) => {
                let e = SiteError::from(e);
                warn!(
                    site = %config.name,
                    quantity = %series.quantity,
                    error = %e,
                    "quantity unavailable"
                );
                first_error.get_or_insert(e);
                None
            }
        }
    };
    let temperature = align(&met.temperature, resample.aod);
    let wind_speed = align(&met.wind_speed, resample.wind);
    let wind_east = align(&met.wind_east, resample.wind);
    let wind_north = align(&met.wind_north, resample.wind);

    if temperature.is_none() && wind_speed.is_none() && wind_east.is_none() && wind_north.is_none()
    {
        return Err(first_error.unwrap_or(SiteError::Empty {
            quantity: Quantity::Temperature,
        }));
    }

    Ok(MeteorologySeries {
        name: config.name.clone(),
        url: config.url.clone(),
        source,
        temperature_axis: temperature.as_ref().and_then(AxisRange::temperature),
        temperature,
        wind_speed,
        wind_east,
        wind_north,
        wind_east_on_aod_grid: None,
        wind_north_on_aod_grid: None,
    })
}

/// Cached series when allowed and present. Offline runs without a hit fail.
fn cached_series(
    ctx: &RunContext<'_>,
    name: &str,
    quantity: Quantity,
    url: &str,
) -> Result<Option<ObservationSeries>, SiteError> {
    let missing = || CacheError::NoCachedData {
        site: name.to_string(),
        quantity,
    };
    if ctx.options.offline {
        let cache = ctx.cache.ok_or_else(missing)?;
        return Ok(Some(cache.load(name, quantity)?));
    }
    if ctx.options.refresh {
        return Ok(None);
    }
    Ok(ctx.cache.and_then(|c| c.lookup(name, quantity, url)))
}

/// Online runs reuse the cache only when every quantity hits. Offline runs
/// take whatever quantities are cached and fail only when none is.
fn cached_meteorology(
    ctx: &RunContext<'_>,
    config: &MeteorologyConfig,
) -> Result<Option<Meteorology>, SiteError> {
    let quantities = [
        Quantity::Temperature,
        Quantity::WindSpeed,
        Quantity::WindEast,
        Quantity::WindNorth,
    ];
    let mut series = Vec::with_capacity(quantities.len());
    let mut first_error: Option<SiteError> = None;
    for quantity in quantities {
        match cached_series(ctx, &config.name, quantity, &config.url) {
            Ok(Some(s)) => series.push(s),
            Ok(None) => return Ok(None),
            Err(e) => {
                debug!(site = %config.name, %quantity, error = %e, "no cached quantity");
                first_error.get_or_insert(e);
            }
        }
    }
    match Meteorology::from_series(series) {
        Some(met) => Ok(Some(met)),
        None => Err(first_error.unwrap_or_else(|| {
            CacheError::NoCachedData {
                site: config.name.clone(),
                quantity: Quantity::Temperature,
            }
            .into()
        })),
    }
}

/// Best-effort cache write; a failure only costs the next run a fetch.
fn store(ctx: &RunContext<'_>, name: &str, series: &ObservationSeries, url: &str) {
    let Some(cache) = ctx.cache else {
        return;
    };
    if series.is_empty() {
        return;
    }
    if let Err(e) = cache.write(name, series, url) {
        warn!(site = name, quantity = %series.quantity, error = %e, "cache write failed");
    }
}
