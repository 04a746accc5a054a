//! AODLab CLI: run dashboards and manage the series cache.
//!
//! Commands:
//! - `run`: fetch, clean, and align every configured source, then export
//! - `config init`: write the default dashboard configuration as TOML
//! - `cache status`: report cached series per site
//! - `cache clean`: remove series cached more than N days ago

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use aodlab_core::data::{CachingFetcher, HttpFetcher, SeriesCache};
use aodlab_core::domain::Cadence;
use aodlab_runner::{
    format_summary, run_dashboard, save_report, DashboardConfig, LogProgress, PipelineOptions,
};

#[derive(Parser)]
#[command(
    name = "aodlab",
    about = "AODLab CLI: aerosol optical depth and meteorology alignment"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, clean, and align every configured source, then export the result.
    Run {
        /// Path to a TOML config file. Defaults to the built-in Central Valley dashboard.
        #[arg(long)]
        config: Option<PathBuf>,

        /// First day of the window (YYYY-MM-DD).
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day of the window (YYYY-MM-DD), inclusive.
        #[arg(long)]
        end: Option<NaiveDate>,

        /// AOD resample cadence (e.g. 1h, 30min).
        #[arg(long)]
        aod_rate: Option<Cadence>,

        /// Wind resample cadence (e.g. 3h).
        #[arg(long)]
        wind_rate: Option<Cadence>,

        /// Canonical timezone (IANA name, e.g. US/Pacific).
        #[arg(long)]
        timezone: Option<String>,

        /// Offline mode: only cached series are used.
        #[arg(long, default_value_t = false)]
        offline: bool,

        /// Ignore cached series and fetch again.
        #[arg(long, default_value_t = false, conflicts_with = "offline")]
        refresh: bool,

        /// Do not read or write the series cache.
        #[arg(long, default_value_t = false, conflicts_with = "offline")]
        no_cache: bool,

        /// Cache directory. Overrides the config file.
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// HTTP timeout in seconds. Overrides the config file.
        #[arg(long)]
        timeout: Option<u64>,

        /// Output directory for the exported report.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Configuration helpers.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default dashboard configuration.
    Init {
        /// Destination file.
        #[arg(default_value = "aodlab.toml")]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached series per site.
    Status {
        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Remove series cached more than the given number of days ago.
    Clean {
        /// Remove series cached more than this many days ago.
        #[arg(long)]
        unused_days: u64,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,

        /// Actually delete (without this flag, only previews what would be removed).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
}

/// Overrides applied on top of the loaded configuration.
struct RunArgs {
    config: Option<PathBuf>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    aod_rate: Option<Cadence>,
    wind_rate: Option<Cadence>,
    timezone: Option<String>,
    offline: bool,
    refresh: bool,
    no_cache: bool,
    cache_dir: Option<PathBuf>,
    timeout: Option<u64>,
    output_dir: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aodlab=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            start,
            end,
            aod_rate,
            wind_rate,
            timezone,
            offline,
            refresh,
            no_cache,
            cache_dir,
            timeout,
            output_dir,
        } => run_dashboard_cmd(RunArgs {
            config,
            start,
            end,
            aod_rate,
            wind_rate,
            timezone,
            offline,
            refresh,
            no_cache,
            cache_dir,
            timeout,
            output_dir,
        }),
        Commands::Config { action } => match action {
            ConfigAction::Init { path, force } => run_config_init(&path, force),
        },
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
            CacheAction::Clean {
                unused_days,
                cache_dir,
                confirm,
            } => run_cache_clean(&cache_dir, unused_days, confirm),
        },
    }
}

fn load_config(args: &RunArgs) -> Result<DashboardConfig> {
    let mut config = match &args.config {
        Some(path) => DashboardConfig::from_file(path)?,
        None => DashboardConfig::default_dashboard(),
    };

    if let Some(start) = args.start {
        config.window.start = start;
    }
    if let Some(end) = args.end {
        config.window.end = end;
    }
    if let Some(rate) = args.aod_rate {
        config.resample.aod = rate;
    }
    if let Some(rate) = args.wind_rate {
        config.resample.wind = rate;
    }
    if let Some(name) = &args.timezone {
        config.timezone = name
            .parse::<Tz>()
            .map_err(|e| anyhow!("unknown timezone '{name}': {e}"))?;
    }
    if let Some(dir) = &args.cache_dir {
        config.cache.dir = dir.clone();
    }
    if let Some(secs) = args.timeout {
        config.http.timeout_secs = secs;
    }
    if args.no_cache {
        config.cache.enabled = false;
    }

    config.validate()?;
    Ok(config)
}

fn run_dashboard_cmd(args: RunArgs) -> Result<()> {
    let config = load_config(&args)?;
    if args.offline && !config.cache.enabled {
        bail!("--offline needs the cache; it is disabled in the configuration");
    }

    let fetcher = CachingFetcher::new(
        HttpFetcher::new(Duration::from_secs(config.http.timeout_secs))
            .context("failed to set up HTTP client")?,
    );
    let cache = config
        .cache
        .enabled
        .then(|| SeriesCache::new(&config.cache.dir));
    let options = PipelineOptions {
        offline: args.offline,
        refresh: args.refresh,
    };

    let report = run_dashboard(&config, &fetcher, cache.as_ref(), options, &LogProgress)?;

    println!();
    print!("{}", format_summary(&report));
    println!();

    if report.all_failed() {
        eprintln!("Every source failed; nothing to export.");
        std::process::exit(1);
    }

    let run_dir = save_report(&report, &args.output_dir)?;
    println!("Report saved to: {}", run_dir.display());
    Ok(())
}

fn run_config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }
    let text = DashboardConfig::default_dashboard().to_toml()?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let cache = SeriesCache::new(cache_dir);
    let sites = cache.status()?;
    if sites.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    let total_size: u64 = sites.iter().map(|s| s.bytes).sum();
    println!("Cache: {}", cache_dir.display());
    println!("Sites: {}", sites.len());
    println!("Total size: {}", format_size(total_size));
    println!();
    println!(
        "{:<16} {:<14} {:<35} {:>8} {:>10}",
        "Site", "Series", "Range (UTC)", "Rows", "Size"
    );
    println!("{}", "-".repeat(87));
    for site in &sites {
        for (i, meta) in site.entries.iter().enumerate() {
            let size = if i == 0 {
                format_size(site.bytes)
            } else {
                String::new()
            };
            println!(
                "{:<16} {:<14} {:<35} {:>8} {:>10}",
                site.site,
                meta.quantity.key(),
                format!(
                    "{} to {}",
                    meta.first.format("%Y-%m-%d %H:%M"),
                    meta.last.format("%Y-%m-%d %H:%M")
                ),
                meta.observation_count,
                size
            );
        }
    }

    Ok(())
}

/// The instant `unused_days` before `now`.
fn cache_cutoff(
    now: chrono::DateTime<chrono::Utc>,
    unused_days: u64,
) -> Result<chrono::DateTime<chrono::Utc>> {
    i64::try_from(unused_days)
        .ok()
        .and_then(chrono::Duration::try_days)
        .and_then(|age| now.checked_sub_signed(age))
        .ok_or_else(|| anyhow!("--unused-days {unused_days} is too large"))
}

fn run_cache_clean(cache_dir: &Path, unused_days: u64, confirm: bool) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let cutoff = cache_cutoff(chrono::Utc::now(), unused_days)?;
    let cache = SeriesCache::new(cache_dir);
    let stale = cache.stale_entries(cutoff)?;

    if stale.is_empty() {
        println!("No series older than {unused_days} days to remove.");
        return Ok(());
    }

    println!(
        "Found {} series cached more than {unused_days} days ago:",
        stale.len()
    );
    for meta in &stale {
        println!(
            "  {} {} (cached {})",
            meta.site,
            meta.quantity.key(),
            meta.cached_at.format("%Y-%m-%d")
        );
    }

    if !confirm {
        println!();
        println!("Dry run; pass --confirm to actually delete.");
        return Ok(());
    }

    for meta in &stale {
        cache.remove(&meta.site, meta.quantity)?;
        println!("Removed: {} {}", meta.site, meta.quantity.key());
    }

    println!("Done. Removed {} series.", stale.len());
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            config: None,
            start: None,
            end: None,
            aod_rate: None,
            wind_rate: None,
            timezone: None,
            offline: false,
            refresh: false,
            no_cache: false,
            cache_dir: None,
            timeout: None,
            output_dir: PathBuf::from("results"),
        }
    }

    #[test]
    fn cli_parses_run_overrides() {
        let cli = Cli::try_parse_from([
            "aodlab",
            "run",
            "--start",
            "2024-06-01",
            "--end",
            "2024-06-03",
            "--aod-rate",
            "30min",
            "--wind-rate",
            "6h",
            "--offline",
        ])
        .unwrap();
        let Commands::Run {
            start,
            aod_rate,
            wind_rate,
            offline,
            ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(aod_rate.unwrap().as_seconds(), 1800);
        assert_eq!(wind_rate.unwrap().as_seconds(), 6 * 3600);
        assert!(offline);
    }

    #[test]
    fn offline_conflicts_with_refresh() {
        assert!(Cli::try_parse_from(["aodlab", "run", "--offline", "--refresh"]).is_err());
    }

    #[test]
    fn overrides_apply_to_default_config() {
        let mut a = args();
        a.start = NaiveDate::from_ymd_opt(2024, 7, 1);
        a.end = NaiveDate::from_ymd_opt(2024, 7, 2);
        a.timezone = Some("UTC".into());
        a.no_cache = true;
        a.timeout = Some(5);
        let config = load_config(&a).unwrap();
        assert_eq!(config.window.start, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        assert_eq!(config.timezone, chrono_tz::UTC);
        assert!(!config.cache.enabled);
        assert_eq!(config.http.timeout_secs, 5);
        assert_eq!(config.sites.len(), 4);
    }

    #[test]
    fn bad_overrides_are_rejected() {
        let mut a = args();
        a.timezone = Some("Mars/Olympus".into());
        assert!(load_config(&a).is_err());

        let mut a = args();
        a.start = NaiveDate::from_ymd_opt(2024, 7, 5);
        a.end = NaiveDate::from_ymd_opt(2024, 7, 1);
        assert!(load_config(&a).is_err());
    }

    #[test]
    fn config_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aodlab.toml");
        run_config_init(&path, false).unwrap();
        assert!(run_config_init(&path, false).is_err());
        run_config_init(&path, true).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(DashboardConfig::from_toml(&text).is_ok());
    }

    #[test]
    fn huge_unused_days_is_an_error() {
        let now = chrono::Utc::now();
        assert_eq!(cache_cutoff(now, 2).unwrap(), now - chrono::Duration::days(2));
        assert!(cache_cutoff(now, u64::MAX).is_err());
        assert!(cache_cutoff(now, i64::MAX as u64).is_err());
        assert!(cache_cutoff(now, 1_000_000_000).is_err());

        let dir = tempfile::tempdir().unwrap();
        assert!(run_cache_clean(dir.path(), 1_000_000_000_000, false).is_err());
    }

    #[test]
    fn size_formatting() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
