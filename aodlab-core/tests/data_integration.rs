//! Integration tests for the fetch → parse → clean → align pipeline using
//! frozen source fixtures.

use aodlab_core::data::{
    align_onto, clean_aod, clean_meteorology, AeronetParser, Aligner, CachingFetcher,
    FlatAodParser, HttpFetcher, IsdParser, MetProfiles, RecordParser, SeriesCache,
    SourceFetcher, ValueProfile, DEFAULT_TIMEOUT,
};
use aodlab_core::domain::{Cadence, Meteorology, ObservationSeries, Quantity, TimeWindow};
use chrono::{NaiveDate, TimeZone};
use chrono_tz::US::Pacific;
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn read_fixture(name: &str) -> Vec<u8> {
    std::fs::read(fixture(name)).unwrap()
}

fn may_first() -> TimeWindow {
    let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    TimeWindow::from_dates(day, day, Pacific).unwrap()
}

fn turlock_aod() -> ObservationSeries {
    let parser = AeronetParser::new(500);
    let records = parser.parse(&read_fixture("turlock_sample.lev15")).unwrap();
    clean_aod(&records, parser.quantity(), &ValueProfile::aeronet_aod()).unwrap()
}

fn modesto_met() -> Meteorology {
    let records = IsdParser::new()
        .parse(&read_fixture("modesto_isd_sample.csv"))
        .unwrap();
    clean_meteorology(&records, &MetProfiles::default()).unwrap()
}

#[test]
fn aeronet_fixture_drops_sentinels_and_outliers() {
    let parser = AeronetParser::new(500);
    let records = parser.parse(&read_fixture("turlock_sample.lev15")).unwrap();
    assert_eq!(records.len(), 9, "trailing blank lines must be ignored");

    let aod = turlock_aod();
    assert_eq!(aod.len(), 7);
    assert!(aod.values().all(|v| (0.0..2.0).contains(&v)));
}

#[test]
fn aeronet_fixture_aligns_to_pacific_hours() {
    let aligner = Aligner::new(Pacific, may_first());
    let hourly = aligner
        .align(&turlock_aod(), Cadence::hours(1).unwrap())
        .unwrap();

    assert_eq!(hourly.len(), 24);
    assert_eq!(
        hourly.buckets[0].start,
        Pacific.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    );

    // 15:02Z and 15:17Z are both 08:xx PDT
    let eight = hourly.buckets[8];
    assert_eq!(eight.count, 2);
    assert!((eight.value.unwrap() - 0.060144).abs() < 1e-9);

    // 17:32Z held the 2.31 outlier only
    assert_eq!(hourly.buckets[10].value, None);
    assert!((hourly.buckets[11].value.unwrap() - 0.071279).abs() < 1e-9);
    assert_eq!(hourly.filled(), 4);
}

#[test]
fn isd_fixture_cleans_meteorology() {
    let met = modesto_met();

    // 17:53 temperature carries quality 9
    assert_eq!(met.temperature.len(), 7);
    assert!((met.temperature.observations[0].value - 13.1).abs() < 1e-9);

    // 19:53 has neither a valid direction nor speed
    assert_eq!(met.wind_speed.len(), 7);
    assert_eq!(met.wind_east.len(), met.wind_north.len());

    // calm report at 16:53
    assert_eq!(met.wind_speed.observations[2].value, 0.0);
    assert_eq!(met.wind_east.observations[2].value, 0.0);
}

#[test]
fn wind_resampled_at_three_hours_and_interpolated_onto_aod_grid() {
    let aligner = Aligner::new(Pacific, may_first());
    let aod = aligner
        .align(&turlock_aod(), Cadence::hours(1).unwrap())
        .unwrap();
    let met = modesto_met();
    let east = aligner
        .align(&met.wind_east, Cadence::hours(3).unwrap())
        .unwrap();

    assert_eq!(east.len(), 8);
    assert_eq!(east.buckets[2].count, 2);
    assert_eq!(east.buckets[3].count, 3);
    assert_eq!(east.buckets[4].count, 1);

    let onto = align_onto(&aod, &east);
    assert_eq!(onto.quantity, Quantity::WindEast);
    assert_eq!(onto.len(), aod.len());
    // Wind samples sit at 06:00, 09:00, and 12:00 PDT
    assert_eq!(onto.points[5].1, None);
    assert!(onto.points[6].1.is_some());
    assert!(onto.points[12].1.is_some());
    assert_eq!(onto.points[13].1, None);
}

#[test]
fn flat_fixture_parses_and_cleans() {
    let parser = FlatAodParser::new(None, 500);
    let records = parser.parse(&read_fixture("flat_aod_sample.csv")).unwrap();
    assert_eq!(records.len(), 6);

    let aod = clean_aod(&records, parser.quantity(), &ValueProfile::flat_aod()).unwrap();
    assert_eq!(aod.values().collect::<Vec<_>>(), vec![0.052, 0.058, 0.061, 0.074]);
}

#[test]
fn local_fetch_goes_through_caching_fetcher() {
    let fetcher = CachingFetcher::new(HttpFetcher::new(DEFAULT_TIMEOUT).unwrap());
    let path = fixture("turlock_sample.lev15");
    let url = format!("file://{}", path.display());

    let first = fetcher.fetch(&url).unwrap();
    let second = fetcher.fetch(&url).unwrap();
    assert_eq!(first, second);
    assert_eq!(fetcher.cached_count(), 1);

    let records = AeronetParser::new(500).parse(first.as_bytes()).unwrap();
    assert_eq!(records.len(), 9);
}

#[test]
fn cleaned_fixture_survives_cache_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let cache = SeriesCache::new(dir.path());
    let aod = turlock_aod();

    cache.write("Turlock", &aod, "fixture").unwrap();
    let loaded = cache.lookup("Turlock", aod.quantity, "fixture").unwrap();
    assert_eq!(loaded, aod);

    let met = modesto_met();
    for series in met.series() {
        cache.write("Turlock", series, "isd").unwrap();
    }
    assert_eq!(cache.entries().unwrap().len(), 5);
}
