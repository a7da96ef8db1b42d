//! Command-line interface definitions for Editais Watch.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Every option can be provided via a command-line flag or an environment
//! variable; unset tuning options fall back to the selected profile.

use crate::config::{Profile, Settings};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the Editais Watch application.
///
/// # Examples
///
/// ```sh
/// # FAPEMA feeds with profile defaults, digest printed only
/// editais_watch --profile fapema --dry-run
///
/// # European calls with a custom sources file
/// editais_watch --profile exterior --sources sources_editais_exterior.yaml -o ./out
///
/// # Wider window, more retries
/// EDITAIS_WINDOW_DAYS=30 editais_watch --profile brasil --retries 2
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Built-in source and keyword set
    #[arg(short, long, value_enum, env = "EDITAIS_PROFILE", default_value = "fapema")]
    pub profile: Profile,

    /// Sources YAML file; profile defaults are used when it does not exist
    #[arg(short, long, env = "EDITAIS_SOURCES", default_value = "sources.yaml")]
    pub sources: PathBuf,

    /// Recency window in days (profile default when unset)
    #[arg(short, long, env = "EDITAIS_WINDOW_DAYS")]
    pub window_days: Option<u32>,

    /// Maximum items per source/search group (profile default when unset)
    #[arg(long, env = "EDITAIS_MAX_PER_GROUP")]
    pub max_per_group: Option<usize>,

    /// Sources fetched concurrently (clamped to 1..=16)
    #[arg(long, env = "EDITAIS_CONCURRENCY", default_value_t = 8)]
    pub concurrency: usize,

    /// Per-request timeout in seconds (1-120)
    #[arg(
        long,
        env = "EDITAIS_TIMEOUT_SECS",
        default_value_t = 25,
        value_parser = clap::value_parser!(u64).range(1..=120)
    )]
    pub timeout_secs: u64,

    /// Retries per failed source fetch (0-10)
    #[arg(
        long,
        env = "EDITAIS_RETRIES",
        default_value_t = 0,
        value_parser = clap::value_parser!(u8).range(0..=10)
    )]
    pub retries: u8,

    /// Directory for the digest, JSON snapshot and default CSV log
    #[arg(short, long, env = "EDITAIS_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// CSV log path (defaults to <output-dir>/editais_log.csv)
    #[arg(long, env = "EDITAIS_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Print the digest without writing any files
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Resolve flags and profile defaults into the run's settings.
    pub fn to_settings(&self) -> Settings {
        let defaults = Settings::for_profile(self.profile);
        Settings {
            profile: self.profile,
            window_days: self.window_days.unwrap_or(defaults.window_days),
            max_per_group: self.max_per_group.or(defaults.max_per_group),
            concurrency: self.concurrency,
            timeout: Duration::from_secs(self.timeout_secs),
            retries: usize::from(self.retries),
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join("editais_log.csv"))
    }
}
