//! Integration tests for the dashboard pipeline.
//!
//! Sources are served from the core crate's fixtures through an in-memory
//! fetcher, so nothing touches the network.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use aodlab_core::data::{CacheError, SeriesCache, SourceFetcher, StaticFetcher};
use aodlab_core::domain::Quantity;
use aodlab_runner::{
    run_dashboard, DashboardConfig, NoProgress, PipelineOptions, PipelineProgress, SeriesSource,
    SiteError, SiteFormat,
};

fn core_fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("aodlab-core/tests/fixtures")
        .join(name);
    std::fs::read_to_string(path).unwrap()
}

/// Four sites plus the ISD station, every URL served from memory.
/// The Sacramento URL is left unregistered.
fn fixture_setup() -> (DashboardConfig, StaticFetcher) {
    let mut config = DashboardConfig::default_dashboard();
    let turlock = core_fixture("turlock_sample.lev15");
    let mut fetcher = StaticFetcher::new();

    for site in &mut config.sites {
        site.url = format!("mem://{}", site.name.to_lowercase());
        if site.name != "Sacramento" {
            fetcher.insert(site.url.clone(), turlock.clone());
        }
    }
    if let Some(met) = config.meteorology.as_mut() {
        met.url = "mem://isd".into();
        fetcher.insert("mem://isd", core_fixture("modesto_isd_sample.csv"));
    }
    (config, fetcher)
}

// ── Partial failure ──────────────────────────────────────────────────

#[test]
fn one_failing_site_does_not_abort_the_run() {
    let (config, fetcher) = fixture_setup();
    let report =
        run_dashboard(&config, &fetcher, None, PipelineOptions::default(), &NoProgress).unwrap();

    let names: Vec<_> = report.sites.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["Turlock", "Modesto", "Fresno"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "Sacramento");
    assert!(matches!(report.failures[0].1, SiteError::Fetch(_)));
    assert!(report.meteorology.is_some());
    assert!(!report.all_failed());
    assert_eq!(report.source_count(), 5);
}

#[test]
fn every_source_failing_is_reported_not_raised() {
    let (config, _) = fixture_setup();
    let report = run_dashboard(
        &config,
        &StaticFetcher::new(),
        None,
        PipelineOptions::default(),
        &NoProgress,
    )
    .unwrap();
    assert!(report.all_failed());
    assert_eq!(report.failures.len(), 5);
}

#[test]
fn out_of_window_data_is_an_empty_site() {
    let (mut config, fetcher) = fixture_setup();
    config.window.start = chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    config.window.end = chrono::NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
    let report =
        run_dashboard(&config, &fetcher, None, PipelineOptions::default(), &NoProgress).unwrap();
    assert!(report.sites.is_empty());
    assert!(report
        .failures
        .iter()
        .any(|(name, e)| name == "Turlock" && matches!(e, SiteError::Empty { .. })));
}

#[test]
fn invalid_config_is_an_error() {
    let (mut config, fetcher) = fixture_setup();
    config.sites.clear();
    assert!(
        run_dashboard(&config, &fetcher, None, PipelineOptions::default(), &NoProgress).is_err()
    );
}

// ── Shared grid ──────────────────────────────────────────────────────

#[test]
fn sites_share_one_grid() {
    let (config, fetcher) = fixture_setup();
    let report =
        run_dashboard(&config, &fetcher, None, PipelineOptions::default(), &NoProgress).unwrap();

    let first: Vec<_> = report.sites[0].aod.starts().collect();
    assert_eq!(first.len(), 7 * 24);
    for site in &report.sites[1..] {
        assert_eq!(site.aod.starts().collect::<Vec<_>>(), first);
    }

    let met = report.meteorology.as_ref().unwrap();
    let temperature = met.temperature.as_ref().unwrap();
    assert_eq!(temperature.starts().collect::<Vec<_>>(), first);
    assert_eq!(met.wind_east.as_ref().unwrap().len(), 7 * 8);
    let overlay = met.wind_east_on_aod_grid.as_ref().unwrap();
    assert_eq!(overlay.len(), first.len());
    assert!(overlay.defined() > 0);
    assert!(met.temperature_axis.is_some());
}

#[test]
fn missing_temperature_keeps_the_wind_series() {
    let (config, mut fetcher) = fixture_setup();
    fetcher.insert("mem://isd", core_fixture("modesto_isd_no_temperature.csv"));
    let report =
        run_dashboard(&config, &fetcher, None, PipelineOptions::default(), &NoProgress).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "Sacramento");
    let met = report.meteorology.as_ref().unwrap();
    assert!(met.temperature.is_none());
    assert!(met.temperature_axis.is_none());
    assert!(met.wind_speed.is_some());
    assert_eq!(met.wind_east.as_ref().unwrap().len(), 7 * 8);
    assert!(met.wind_north_on_aod_grid.is_some());
    assert_eq!(met.series().count(), 3);
}

#[test]
fn station_with_nothing_in_the_window_fails() {
    let (mut config, fetcher) = fixture_setup();
    config.window.start = chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    config.window.end = chrono::NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
    let report =
        run_dashboard(&config, &fetcher, None, PipelineOptions::default(), &NoProgress).unwrap();

    assert!(report.meteorology.is_none());
    assert!(report
        .failures
        .iter()
        .any(|(name, e)| name == "Modesto ISD" && matches!(e, SiteError::Empty { .. })));
}

#[test]
fn flat_site_aligns_to_the_same_grid() {
    let (mut config, mut fetcher) = fixture_setup();
    config.sites[1].format = SiteFormat::Flat;
    config.sites[1].source_timezone = Some(chrono_tz::UTC);
    fetcher.insert(config.sites[1].url.clone(), core_fixture("flat_aod_sample.csv"));

    let report =
        run_dashboard(&config, &fetcher, None, PipelineOptions::default(), &NoProgress).unwrap();
    assert!(report.failures.is_empty());
    let flat = &report.sites[1];
    assert_eq!(flat.name, "Sacramento");
    assert_eq!(flat.observations, 4);
    assert_eq!(flat.aod.origin, report.sites[0].aod.origin);
}

// ── Cache modes ──────────────────────────────────────────────────────

#[test]
fn offline_run_reuses_cached_series() {
    let (config, fetcher) = fixture_setup();
    let dir = tempfile::tempdir().unwrap();
    let cache = SeriesCache::new(dir.path());

    let online = run_dashboard(
        &config,
        &fetcher,
        Some(&cache),
        PipelineOptions::default(),
        &NoProgress,
    )
    .unwrap();
    assert!(online.sites.iter().all(|s| s.source == SeriesSource::Fetched));

    let offline = run_dashboard(
        &config,
        &StaticFetcher::new(),
        Some(&cache),
        PipelineOptions {
            offline: true,
            refresh: false,
        },
        &NoProgress,
    )
    .unwrap();
    assert_eq!(offline.sites.len(), online.sites.len());
    for (a, b) in online.sites.iter().zip(&offline.sites) {
        assert_eq!(b.source, SeriesSource::Cache);
        assert_eq!(a.aod, b.aod);
    }
    let met = offline.meteorology.as_ref().unwrap();
    assert_eq!(met.source, SeriesSource::Cache);
    assert_eq!(met.wind_north, online.meteorology.as_ref().unwrap().wind_north);
    assert!(met.wind_north.is_some());

    // Sacramento never fetched, so it has nothing cached
    assert!(matches!(
        offline.failures[0].1,
        SiteError::Cache(CacheError::NoCachedData { .. })
    ));
}

#[test]
fn offline_run_serves_a_partially_cached_station() {
    let (config, mut fetcher) = fixture_setup();
    fetcher.insert("mem://isd", core_fixture("modesto_isd_no_temperature.csv"));
    let dir = tempfile::tempdir().unwrap();
    let cache = SeriesCache::new(dir.path());
    run_dashboard(
        &config,
        &fetcher,
        Some(&cache),
        PipelineOptions::default(),
        &NoProgress,
    )
    .unwrap();

    let offline = run_dashboard(
        &config,
        &StaticFetcher::new(),
        Some(&cache),
        PipelineOptions {
            offline: true,
            refresh: false,
        },
        &NoProgress,
    )
    .unwrap();
    let met = offline.meteorology.as_ref().unwrap();
    assert_eq!(met.source, SeriesSource::Cache);
    assert!(met.temperature.is_none());
    assert!(met.wind_east.is_some());
}

#[test]
fn offline_without_cache_fails_every_source() {
    let (config, fetcher) = fixture_setup();
    let report = run_dashboard(
        &config,
        &fetcher,
        None,
        PipelineOptions {
            offline: true,
            refresh: false,
        },
        &NoProgress,
    )
    .unwrap();
    assert!(report.all_failed());
    assert!(report
        .failures
        .iter()
        .all(|(_, e)| matches!(e, SiteError::Cache(CacheError::NoCachedData { .. }))));
}

struct CountingFetcher {
    inner: StaticFetcher,
    calls: AtomicUsize,
}

impl SourceFetcher for CountingFetcher {
    fn name(&self) -> &str {
        "counting"
    }

    fn fetch(&self, url: &str) -> Result<String, aodlab_core::data::FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(url)
    }
}

#[test]
fn cache_hit_skips_fetch_and_refresh_forces_it() {
    let (config, inner) = fixture_setup();
    let fetcher = CountingFetcher {
        inner,
        calls: AtomicUsize::new(0),
    };
    let dir = tempfile::tempdir().unwrap();
    let cache = SeriesCache::new(dir.path());
    let opts = PipelineOptions::default();

    run_dashboard(&config, &fetcher, Some(&cache), opts, &NoProgress).unwrap();
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 5);

    // only the uncached Sacramento is fetched again
    let second = run_dashboard(&config, &fetcher, Some(&cache), opts, &NoProgress).unwrap();
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 6);
    assert_eq!(second.sites[0].source, SeriesSource::Cache);

    let refresh = PipelineOptions {
        offline: false,
        refresh: true,
    };
    let third = run_dashboard(&config, &fetcher, Some(&cache), refresh, &NoProgress).unwrap();
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 11);
    assert_eq!(third.sites[0].source, SeriesSource::Fetched);
}

#[test]
fn changed_url_invalidates_cached_series() {
    let (mut config, mut fetcher) = fixture_setup();
    let dir = tempfile::tempdir().unwrap();
    let cache = SeriesCache::new(dir.path());
    run_dashboard(&config, &fetcher, Some(&cache), PipelineOptions::default(), &NoProgress)
        .unwrap();

    config.sites[0].url = "mem://turlock-v2".into();
    fetcher.insert("mem://turlock-v2", core_fixture("turlock_sample.lev15"));
    let report =
        run_dashboard(&config, &fetcher, Some(&cache), PipelineOptions::default(), &NoProgress)
            .unwrap();
    assert_eq!(report.sites[0].source, SeriesSource::Fetched);
    let meta = cache
        .get_meta("Turlock", Quantity::Aod { wavelength_nm: 500 })
        .unwrap();
    assert_eq!(meta.source_url, "mem://turlock-v2");
}

// ── Progress ─────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<(String, bool)>>,
}

impl PipelineProgress for RecordingProgress {
    fn on_source_start(&self, _name: &str, _index: usize, total: usize) {
        assert_eq!(total, 5);
    }

    fn on_source_complete(&self, name: &str, _: usize, _: usize, error: Option<&SiteError>) {
        self.events
            .lock()
            .unwrap()
            .push((name.to_string(), error.is_none()));
    }
}

#[test]
fn progress_sees_every_source_once() {
    let (config, fetcher) = fixture_setup();
    let progress = RecordingProgress::default();
    run_dashboard(&config, &fetcher, None, PipelineOptions::default(), &progress).unwrap();

    let mut events = progress.events.into_inner().unwrap();
    events.sort();
    assert_eq!(
        events,
        [
            ("Fresno".to_string(), true),
            ("Modesto".to_string(), true),
            ("Modesto ISD".to_string(), true),
            ("Sacramento".to_string(), false),
            ("Turlock".to_string(), true),
        ]
    );
}
