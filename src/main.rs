//! # Editais Watch
//!
//! Collects recent funding calls ("editais") from agency RSS/Atom feeds,
//! Google News searches and HTML listing pages, keeps the ones that match a
//! profile's relevance patterns inside its recency window, and renders a
//! ranked digest.
//!
//! ## Usage
//!
//! ```sh
//! editais_watch --profile exterior -o ./out
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Registry**: Build the source list and pattern sets from a profile and
//!    an optional sources file
//! 2. **Fetching**: Download every source concurrently (bounded, per-source
//!    failure isolation)
//! 3. **Classification**: Extract candidates, normalize timestamps, apply the
//!    recency window and relevance patterns
//! 4. **Ranking**: Deduplicate, sort newest first, cap per group
//! 5. **Output**: Digest (text + HTML), JSON snapshot and CSV log

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod fetcher;
mod models;
mod outputs;
mod pipeline;
mod rank;
mod recency;
mod relevance;
mod scrapers;
mod timestamp;
mod utils;

use cli::Cli;
use fetcher::{HttpFetcher, RetryFetch};
use outputs::{digest, json, log};
use pipeline::Pipeline;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("editais_watch starting up");

    // Parse CLI
    let args = Cli::parse();
    let settings = args.to_settings();
    debug!(?args, ?settings, "Parsed CLI arguments");

    // Early check: ensure the output dir is writable before spending a run on it
    if !args.dry_run {
        let output_dir = args.output_dir.to_string_lossy();
        if let Err(e) = ensure_writable_dir(&output_dir).await {
            error!(
                path = %output_dir,
                error = %e,
                "Output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    // ---- Registry ----
    let registry = config::load_registry(settings.profile, Some(args.sources.as_path()))?;

    // ---- Fetch, classify, rank ----
    let http = HttpFetcher::new(settings.timeout)?;
    let fetcher = RetryFetch::new(http, settings.retries, Duration::from_secs(1));
    let pipeline = Pipeline::new(fetcher, registry, settings)?;
    let settings = pipeline.settings();
    let report = pipeline.run(Utc::now()).await;

    for outcome in &report.outcomes {
        debug!(
            source = %outcome.source_name,
            candidates = outcome.candidates,
            accepted = outcome.accepted,
            failed = outcome.failed,
            "Source summary"
        );
    }
    for failure in &report.failures {
        debug!(source = %failure.source_name(), error = %failure, "Source failed this run");
    }

    // ---- Digest ----
    let text = digest::render_text(&report.results, settings);
    println!("{text}");

    if args.dry_run {
        info!("Dry run; no files written");
    } else {
        let html = digest::render_html(&report.results, settings);
        for (name, contents) in [("digest.txt", text), ("digest.html", html)] {
            let path = args.output_dir.join(name);
            if let Err(e) = tokio::fs::write(&path, contents).await {
                error!(path = %path.display(), error = %e, "Failed writing digest");
            } else {
                info!(path = %path.display(), "Wrote digest");
            }
        }

        if let Err(e) = json::write_snapshot(&report, settings, &args.output_dir).await {
            error!(error = %e, "Failed to write JSON snapshot");
        }

        let log_path = args.log_path();
        if let Err(e) = log::append_csv(&log_path, &report.results, report.started_at).await {
            error!(path = %log_path.display(), error = %e, "Failed to append CSV log");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        accepted = report.accepted_before_rank(),
        items = report.results.len(),
        failed_sources = report.failures.len(),
        "Execution complete"
    );

    Ok(())
}
