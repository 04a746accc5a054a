//! Fetch, parse, clean, align, and cache

pub mod align;
pub mod cache;
pub mod clean;
pub mod fetch;
pub mod http;
pub mod interpolate;
pub mod layout;
pub mod parse;

pub use align::{
    coarsen, dedupe, normalize, resample, restrict, AlignError, Aligner, Bucket, BucketedSeries,
    DuplicatePolicy,
};
pub use cache::{CacheError, CacheStatus, SeriesCache, SeriesMeta};
pub use clean::{
    clean_aod, clean_meteorology, wind_components, CleanError, Cleaned, MetProfiles, ValueProfile,
};
pub use fetch::{CachingFetcher, FetchError, SourceFetcher, StaticFetcher};
pub use http::{HttpFetcher, DEFAULT_TIMEOUT};
pub use interpolate::{align_onto, interpolate_at, interpolate_observations, InterpolatedSeries};
pub use layout::CsvLayout;
pub use parse::{
    parse_table, AeronetParser, AodRecord, FlatAodParser, IsdParser, MetRecord, ParseError,
    RawRecord, RecordParser,
};
