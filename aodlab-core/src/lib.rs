//! AODLab Core: fetch, parse, clean, and align aerosol and meteorology series.
//!
//! This crate contains the whole ingestion pipeline:
//! - Domain types (observations, quantities, time windows, cadences, sites)
//! - Fetchers for remote and local CSV sources
//! - Layout-driven CSV parsing into typed per-format records
//! - Sentinel replacement and plausibility filtering per source profile
//! - Timezone normalization, windowing, bucketed resampling, interpolation
//! - Parquet cache of cleaned series

pub mod data;
pub mod domain;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything handed between pipeline stages is Send + Sync,
    /// so sites can be processed on a thread pool.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Observation>();
        require_sync::<domain::Observation>();
        require_send::<domain::ObservationSeries>();
        require_sync::<domain::ObservationSeries>();
        require_send::<domain::Meteorology>();
        require_sync::<domain::Meteorology>();
        require_send::<domain::TimeWindow>();
        require_sync::<domain::TimeWindow>();

        require_send::<data::RawRecord>();
        require_sync::<data::RawRecord>();
        require_send::<data::AodRecord>();
        require_sync::<data::AodRecord>();
        require_send::<data::MetRecord>();
        require_sync::<data::MetRecord>();
        require_send::<data::BucketedSeries>();
        require_sync::<data::BucketedSeries>();
        require_send::<data::HttpFetcher>();
        require_sync::<data::HttpFetcher>();
        require_send::<data::CachingFetcher<data::StaticFetcher>>();
        require_sync::<data::CachingFetcher<data::StaticFetcher>>();
        require_send::<data::SeriesCache>();
        require_sync::<data::SeriesCache>();

        require_send::<data::FetchError>();
        require_send::<data::ParseError>();
        require_send::<data::AlignError>();
        require_send::<data::CacheError>();
    }
}
