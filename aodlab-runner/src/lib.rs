//! AODLab Runner: dashboard configuration, the multi-site pipeline, export.
//!
//! This crate builds on `aodlab-core` to provide:
//! - TOML configuration of sites, meteorology, window, cadences, and display bounds
//! - Parallel per-site fetch → parse → clean → align with per-source failures
//! - Offline and refresh modes over the Parquet series cache
//! - JSON/CSV export of the aligned series and a text summary

pub mod config;
pub mod display;
pub mod export;
pub mod pipeline;

pub use config::{
    CacheConfig, ConfigError, DashboardConfig, HttpConfig, MeteorologyConfig, ResampleConfig,
    SiteConfig, SiteFormat, TemperatureUnit, WindowConfig,
};
pub use display::{AxisRange, DisplayBounds};
pub use export::{export_json, export_series_csv, format_summary, save_report};
pub use pipeline::{
    run_dashboard, DashboardReport, LogProgress, MeteorologySeries, NoProgress, PipelineOptions,
    PipelineProgress, SeriesSource, SiteError, SiteSeries,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<DashboardConfig>();
        assert_sync::<DashboardConfig>();
        assert_send::<SiteConfig>();
        assert_sync::<SiteConfig>();
    }

    #[test]
    fn series_types_are_send_sync() {
        assert_send::<SiteSeries>();
        assert_sync::<SiteSeries>();
        assert_send::<MeteorologySeries>();
        assert_sync::<MeteorologySeries>();
    }

    #[test]
    fn report_is_send() {
        assert_send::<DashboardReport>();
        assert_send::<SiteError>();
    }

    #[test]
    fn progress_reporters_are_sync() {
        assert_sync::<LogProgress>();
        assert_sync::<NoProgress>();
    }
}
