//! Human-readable digests of a run.
//!
//! The text digest is a numbered list in rank order; the HTML digest groups
//! the same items by search term (Google News sources) or source name.

use crate::config::Settings;
use crate::models::{Item, ResultSet};
use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};
use std::collections::BTreeMap;
use std::fmt::Write;

const STYLE: &str = "<style>\
body { font-family: Arial, Helvetica, sans-serif; font-size: 14px; color: #222; }\
h2 { margin: 0 0 8px 0; }\
.group { font-weight: 600; margin-top: 14px; }\
table { border-collapse: collapse; width: 100%; margin-top: 6px; }\
th, td { border: 1px solid #ddd; padding: 8px; vertical-align: top; }\
th { background: #f5f5f5; text-align: left; }\
.muted { color: #666; }\
</style>";

/// `YYYY-MM-DD HH:MM UTC`, or an empty string when the timestamp is unknown.
pub fn format_published(published_at: Option<DateTime<Utc>>) -> String {
    published_at
        .map(|ts| ts.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_default()
}

fn heading(settings: &Settings) -> String {
    format!(
        "{} – last {} days",
        settings.profile.title(),
        settings.window_days
    )
}

fn empty_message(settings: &Settings) -> String {
    format!("No new items in the last {} days.", settings.window_days)
}

/// Render the plain-text digest.
pub fn render_text(result: &ResultSet, settings: &Settings) -> String {
    if result.is_empty() {
        return empty_message(settings);
    }

    let mut out = String::new();
    writeln!(out, "{}\n", heading(settings)).unwrap();
    for (i, item) in result.iter().enumerate() {
        writeln!(
            out,
            "{}. [{}] {}\n   Date: {}\n   Link: {}\n",
            i + 1,
            item.source_name,
            item.title,
            format_published(item.published_at),
            item.link
        )
        .unwrap();
    }
    out
}

fn group_label(item: &Item) -> &str {
    item.search_term.as_deref().unwrap_or(&item.source_name)
}

/// Render the HTML digest. All item text is escaped.
pub fn render_html(result: &ResultSet, settings: &Settings) -> String {
    let mut body = String::new();
    write!(body, "<h2>{}</h2>", encode_text(&heading(settings))).unwrap();

    if result.is_empty() {
        write!(body, "<p class=\"muted\">{}</p>", encode_text(&empty_message(settings))).unwrap();
    } else {
        let mut groups: BTreeMap<&str, Vec<&Item>> = BTreeMap::new();
        for item in result {
            groups.entry(group_label(item)).or_default().push(item);
        }

        for (label, items) in groups {
            write!(
                body,
                "<div class=\"group\">{}</div>\
                 <table><thead><tr><th>Date</th><th>Title / Link</th></tr></thead><tbody>",
                encode_text(label)
            )
            .unwrap();
            for item in items {
                write!(
                    body,
                    "<tr><td>{}</td><td><a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a></td></tr>",
                    encode_text(&format_published(item.published_at)),
                    encode_double_quoted_attribute(&item.link),
                    encode_text(&item.title)
                )
                .unwrap();
            }
            body.push_str("</tbody></table>");
        }
    }

    format!("<!DOCTYPE html><html><head><meta charset=\"utf-8\">{STYLE}</head><body>{body}</body></html>")
}
