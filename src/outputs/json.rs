//! JSON snapshot of a run.
//!
//! Each run writes one file named after its UTC start time, so snapshots
//! never overwrite each other:
//! ```text
//! output_dir/
//! └── editais_20240510T070000Z.json
//! ```

use crate::config::{Profile, Settings};
use crate::models::ResultSet;
use crate::pipeline::RunReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Serialized shape of a snapshot file.
#[derive(Debug, Serialize)]
pub struct Snapshot<'a> {
    pub generated_at: DateTime<Utc>,
    pub profile: Profile,
    pub window_days: u32,
    pub item_count: usize,
    /// Names of sources that contributed nothing because they failed.
    pub failed_sources: Vec<&'a str>,
    pub items: &'a ResultSet,
}

impl<'a> Snapshot<'a> {
    pub fn new(report: &'a RunReport, settings: &Settings) -> Self {
        Self {
            generated_at: report.started_at,
            profile: settings.profile,
            window_days: settings.window_days,
            item_count: report.results.len(),
            failed_sources: report.failures.iter().map(|f| f.source_name()).collect(),
            items: &report.results,
        }
    }
}

/// `editais_<YYYYMMDDTHHMMSSZ>.json`
pub fn snapshot_filename(started_at: DateTime<Utc>) -> String {
    format!("editais_{}.json", started_at.format("%Y%m%dT%H%M%SZ"))
}

/// Write the snapshot for `report` into `output_dir` and return its path.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
pub async fn write_snapshot(
    report: &RunReport,
    settings: &Settings,
    output_dir: &Path,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(&Snapshot::new(report, settings))?;

    if let Err(e) = fs::create_dir_all(output_dir).await {
        error!(error = %e, "Failed to create output dir");
        return Err(e.into());
    }

    let path = output_dir.join(snapshot_filename(report.started_at));
    fs::write(&path, json).await?;
    info!(path = %path.display(), items = report.results.len(), "Wrote JSON snapshot");
    Ok(path)
}
