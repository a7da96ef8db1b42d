//! Publish-timestamp normalization.
//!
//! Agency feeds disagree on date formats: WordPress emits RFC 2822, Atom
//! emits RFC 3339, and hand-rolled Brazilian feeds emit `dd/mm/YYYY`. Every
//! parse attempt below either yields a UTC instant or falls through; nothing
//! here returns an error, because an unreadable date is a policy question for
//! the recency window, not a failure.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Formats carrying an explicit offset (`%z` accepts `+0000` and `+00:00`).
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%dT%H:%M%:z",
    "%a, %d %b %Y %H:%M %z",
    "%d %b %Y %H:%M:%S %z",
];

/// Naive date-times, taken as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d.%m.%Y %H:%M",
    "%a, %d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%B %d, %Y %H:%M",
];

/// Date-only formats, taken as midnight UTC.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d-%m-%Y",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%a, %d %b %Y",
];

/// Trailing zone names that RFC 2822 parsers in the wild emit but `%z` rejects.
const ZONE_SUFFIXES: &[(&str, &str)] = &[
    (" GMT", " +0000"),
    (" UTC", " +0000"),
    (" UT", " +0000"),
    (" Z", " +0000"),
    (" EST", " -0500"),
    (" EDT", " -0400"),
    (" CET", " +0100"),
    (" CEST", " +0200"),
    (" BRT", " -0300"),
];

/// Parse free-form timestamp text into a UTC instant.
///
/// Returns `None` for absent, blank or unrecognized input.
pub fn normalize(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let text = raw?.trim();
    if text.is_empty() {
        return None;
    }

    parse_with_offset(text)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| parse_naive(text).map(|naive| Utc.from_utc_datetime(&naive)))
}

fn parse_with_offset(text: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt);
    }
    if let Some(rewritten) = rewrite_zone_name(text) {
        if let Ok(dt) = DateTime::parse_from_rfc2822(&rewritten) {
            return Some(dt);
        }
        if let Some(dt) = try_offset_formats(&rewritten) {
            return Some(dt);
        }
    }
    try_offset_formats(text)
}

fn try_offset_formats(text: &str) -> Option<DateTime<FixedOffset>> {
    OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
}

fn rewrite_zone_name(text: &str) -> Option<String> {
    ZONE_SUFFIXES.iter().find_map(|(name, offset)| {
        text.strip_suffix(name)
            .map(|head| format!("{head}{offset}"))
    })
}

fn parse_naive(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim_end_matches('Z');
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}
