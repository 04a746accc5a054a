//! Parquet cache of cleaned observation series.
//!
//! Layout: `{cache_dir}/site={SITE}/{quantity}.parquet` plus a
//! `{quantity}.meta.json` sidecar (source URL, range, hash).
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Integrity validation on load (schema, row count, BLAKE3 hash)
//! - Quarantine for corrupt files (`{filename}.quarantined`)

use crate::domain::{Observation, ObservationSeries, Quantity};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const SITE_PREFIX: &str = "site=";
const META_SUFFIX: &str = ".meta.json";
const COL_TIMESTAMP: &str = "timestamp_ms";
const COL_VALUE: &str = "value";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(String),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("cache validation failed: {0}")]
    Validation(String),

    #[error("no cached {quantity} data for site '{site}'")]
    NoCachedData { site: String, quantity: Quantity },
}

/// Sidecar describing one cached series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMeta {
    pub site: String,
    pub quantity: Quantity,
    pub source_url: String,
    /// IANA name of the zone the observations were stored in.
    pub timezone: String,
    pub observation_count: usize,
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
    pub data_hash: String,
    pub cached_at: DateTime<Utc>,
}

/// Cached series for one site.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub site: String,
    pub entries: Vec<SeriesMeta>,
    pub bytes: u64,
}

pub struct SeriesCache {
    cache_dir: PathBuf,
}

impl SeriesCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn site_dir(&self, site: &str) -> PathBuf {
        self.cache_dir.join(format!("{SITE_PREFIX}{}", site_slug(site)))
    }

    fn data_path(&self, site: &str, quantity: Quantity) -> PathBuf {
        self.site_dir(site).join(format!("{}.parquet", quantity.key()))
    }

    fn meta_path(&self, site: &str, quantity: Quantity) -> PathBuf {
        self.site_dir(site)
            .join(format!("{}{META_SUFFIX}", quantity.key()))
    }

    /// Store a cleaned series. Empty series are rejected.
    pub fn write(
        &self,
        site: &str,
        series: &ObservationSeries,
        source_url: &str,
    ) -> Result<SeriesMeta, CacheError> {
        let (first, last) = series
            .time_range()
            .ok_or_else(|| CacheError::Validation("no observations to cache".into()))?;
        let timezone = series.observations[0].timestamp.timezone();

        let dir = self.site_dir(site);
        fs::create_dir_all(&dir)
            .map_err(|e| CacheError::Io(format!("create {}: {e}", dir.display())))?;

        let (stamps, values) = columns(series);
        let path = self.data_path(site, series.quantity);
        let tmp_path = path.with_extension("parquet.tmp");
        let mut df = DataFrame::new(vec![
            Column::new(COL_TIMESTAMP.into(), &stamps),
            Column::new(COL_VALUE.into(), &values),
        ])
        .map_err(|e| CacheError::Parquet(format!("dataframe creation: {e}")))?;
        write_parquet(&mut df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            CacheError::Io(format!("atomic rename failed: {e}"))
        })?;

        let meta = SeriesMeta {
            site: site.to_string(),
            quantity: series.quantity,
            source_url: source_url.to_string(),
            timezone: timezone.name().to_string(),
            observation_count: series.len(),
            first: first.with_timezone(&Utc),
            last: last.with_timezone(&Utc),
            data_hash: data_hash(&stamps, &values),
            cached_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&meta)
            .map_err(|e| CacheError::Io(format!("meta serialization: {e}")))?;
        let meta_path = self.meta_path(site, series.quantity);
        let tmp_meta = meta_path.with_extension("json.tmp");
        fs::write(&tmp_meta, json).map_err(|e| CacheError::Io(format!("meta write: {e}")))?;
        fs::rename(&tmp_meta, &meta_path)
            .map_err(|e| CacheError::Io(format!("meta rename: {e}")))?;

        debug!(site, quantity = %series.quantity, rows = series.len(), "cached series");
        Ok(meta)
    }

    /// Load a cached series. A file that fails validation is quarantined and
    /// reported as missing, as is an entry written under another site name
    /// with the same slug.
    pub fn load(&self, site: &str, quantity: Quantity) -> Result<ObservationSeries, CacheError> {
        let missing = || CacheError::NoCachedData {
            site: site.to_string(),
            quantity,
        };
        let path = self.data_path(site, quantity);
        if !path.exists() {
            return Err(missing());
        }
        let meta = self.get_meta(site, quantity).ok_or_else(missing)?;
        // distinct names can share a slug
        if meta.site != site {
            warn!(site, cached_site = %meta.site, "cache entry belongs to another site");
            return Err(missing());
        }

        match load_and_validate(&path, &meta) {
            Ok(series) => Ok(series),
            Err(e) => {
                let quarantine = path.with_extension("parquet.quarantined");
                warn!(path = %path.display(), error = %e, "quarantining corrupt cache file");
                let _ = fs::rename(&path, &quarantine);
                Err(missing())
            }
        }
    }

    /// Cached series for `site`, but only if it was fetched from `source_url`.
    pub fn lookup(
        &self,
        site: &str,
        quantity: Quantity,
        source_url: &str,
    ) -> Option<ObservationSeries> {
        let meta = self.get_meta(site, quantity)?;
        if meta.source_url != source_url {
            debug!(site, cached = %meta.source_url, configured = source_url, "cache source changed");
            return None;
        }
        self.load(site, quantity).ok()
    }

    pub fn get_meta(&self, site: &str, quantity: Quantity) -> Option<SeriesMeta> {
        let content = fs::read_to_string(self.meta_path(site, quantity)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Every readable sidecar in the cache, sorted by site then quantity.
    pub fn entries(&self) -> Result<Vec<SeriesMeta>, CacheError> {
        let mut metas = Vec::new();
        for dir in self.site_dirs()? {
            metas.extend(read_sidecars(&dir));
        }
        metas.sort_by(|a, b| (&a.site, a.quantity).cmp(&(&b.site, b.quantity)));
        Ok(metas)
    }

    /// Per-site summary of what is cached and how much disk it takes.
    pub fn status(&self) -> Result<Vec<CacheStatus>, CacheError> {
        let mut out: Vec<CacheStatus> = self
            .site_dirs()?
            .into_iter()
            .filter_map(|dir| {
                let name = dir.file_name()?.to_str()?.strip_prefix(SITE_PREFIX)?;
                let mut entries = read_sidecars(&dir);
                entries.sort_by_key(|m| m.quantity);
                Some(CacheStatus {
                    site: entries
                        .first()
                        .map_or_else(|| name.to_string(), |m| m.site.clone()),
                    entries,
                    bytes: dir_size(&dir),
                })
            })
            .collect();
        out.sort_by(|a, b| a.site.cmp(&b.site));
        Ok(out)
    }

    /// Entries cached before `cutoff`.
    pub fn stale_entries(&self, cutoff: DateTime<Utc>) -> Result<Vec<SeriesMeta>, CacheError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|m| m.cached_at < cutoff)
            .collect())
    }

    /// Delete one cached series and its sidecar. Empty site directories are removed too.
    pub fn remove(&self, site: &str, quantity: Quantity) -> Result<(), CacheError> {
        for path in [self.data_path(site, quantity), self.meta_path(site, quantity)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::Io(format!("remove {}: {e}", path.display()))),
            }
        }
        let dir = self.site_dir(site);
        if fs::read_dir(&dir).is_ok_and(|mut d| d.next().is_none()) {
            let _ = fs::remove_dir(&dir);
        }
        Ok(())
    }

    fn site_dirs(&self) -> Result<Vec<PathBuf>, CacheError> {
        if !self.cache_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.cache_dir)
            .map_err(|e| CacheError::Io(format!("read dir: {e}")))?;
        Ok(entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.is_dir()
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(SITE_PREFIX))
            })
            .collect())
    }
}

/// Directory-safe form of a site name.
pub fn site_slug(site: &str) -> String {
    site.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn read_sidecars(dir: &Path) -> Vec<SeriesMeta> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with(META_SUFFIX))
        .filter_map(|e| {
            let content = fs::read_to_string(e.path()).ok()?;
            serde_json::from_str(&content).ok()
        })
        .collect()
}

/// Total size of the files directly inside `path`.
pub fn dir_size(path: &Path) -> u64 {
    fs::read_dir(path)
        .map(|entries| {
            entries
                .flatten()
                .filter_map(|e| e.metadata().ok())
                .map(|m| m.len())
                .sum()
        })
        .unwrap_or(0)
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn columns(series: &ObservationSeries) -> (Vec<i64>, Vec<f64>) {
    series
        .observations
        .iter()
        .map(|o| (o.timestamp.timestamp_millis(), o.value))
        .unzip()
}

fn data_hash(stamps: &[i64], values: &[f64]) -> String {
    let mut hasher = blake3::Hasher::new();
    for (t, v) in stamps.iter().zip(values) {
        hasher.update(&t.to_le_bytes());
        hasher.update(&v.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), CacheError> {
    let file =
        fs::File::create(path).map_err(|e| CacheError::Io(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| CacheError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate(path: &Path, meta: &SeriesMeta) -> Result<ObservationSeries, CacheError> {
    let file = fs::File::open(path).map_err(|e| CacheError::Io(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| CacheError::Parquet(format!("read: {e}")))?;

    if df.height() != meta.observation_count {
        return Err(CacheError::Validation(format!(
            "expected {} rows, found {}",
            meta.observation_count,
            df.height()
        )));
    }

    let map_err = |e: PolarsError| CacheError::Validation(format!("column read: {e}"));
    let stamps: Vec<i64> = df
        .column(COL_TIMESTAMP)
        .map_err(map_err)?
        .i64()
        .map_err(map_err)?
        .into_iter()
        .enumerate()
        .map(|(i, v)| v.ok_or_else(|| CacheError::Validation(format!("null timestamp at row {i}"))))
        .collect::<Result<_, _>>()?;
    let values: Vec<f64> = df
        .column(COL_VALUE)
        .map_err(map_err)?
        .f64()
        .map_err(map_err)?
        .into_iter()
        .enumerate()
        .map(|(i, v)| v.ok_or_else(|| CacheError::Validation(format!("null value at row {i}"))))
        .collect::<Result<_, _>>()?;

    if data_hash(&stamps, &values) != meta.data_hash {
        return Err(CacheError::Validation("data hash mismatch".into()));
    }

    let tz: Tz = meta
        .timezone
        .parse()
        .map_err(|_| CacheError::Validation(format!("unknown timezone '{}'", meta.timezone)))?;
    let observations = stamps
        .iter()
        .zip(&values)
        .map(|(&ms, &value)| {
            tz.timestamp_millis_opt(ms)
                .single()
                .map(|t| Observation::new(t, value))
                .ok_or_else(|| CacheError::Validation(format!("timestamp {ms} out of range")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ObservationSeries::new(meta.quantity, observations))
}
