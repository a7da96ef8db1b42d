//! Append-only CSV log of reported items.
//!
//! The header is written only when the file is created; every run appends one
//! row per item, stamped with the run's UTC start time. Fields are quoted per
//! RFC 4180 when they contain a comma, quote or line break.

use crate::models::{Item, ResultSet};
use chrono::{DateTime, SecondsFormat, Utc};
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

pub const HEADER: [&str; 6] = [
    "timestamp_execucao_utc",
    "fonte",
    "titulo",
    "link",
    "publicado_em",
    "metodo",
];

/// Quote `field` if it needs it, doubling embedded quotes.
pub fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_line<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let mut line = fields.into_iter().map(csv_field).collect::<Vec<_>>().join(",");
    line.push_str("\r\n");
    line
}

fn row(run_at: &str, item: &Item) -> String {
    let published = item
        .published_at
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default();
    csv_line([
        run_at,
        item.source_name.as_str(),
        item.title.as_str(),
        item.link.as_str(),
        published.as_str(),
        item.extraction_method.as_str(),
    ])
}

/// Append every item of `result` to the CSV at `path`.
///
/// Returns the number of rows written. An empty result still creates the
/// file (with its header) so the log's existence marks that the tool ran.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn append_csv(
    path: &Path,
    result: &ResultSet,
    run_at: DateTime<Utc>,
) -> Result<usize, Box<dyn Error>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let mut out = String::new();
    if !path.exists() {
        out.push_str(&csv_line(HEADER));
    }
    let run_at = run_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    for item in result {
        out.push_str(&row(&run_at, item));
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(out.as_bytes()).await?;
    file.flush().await?;
    info!(rows = result.len(), "Appended to CSV log");
    Ok(result.len())
}
