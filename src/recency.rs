//! Trailing recency window.

use crate::models::ExtractionMethod;
use chrono::{DateTime, Duration, Utc};

/// Whether an item published at `published` is current as of `now`.
///
/// A known timestamp is current when `now - published <= window_days`; the
/// boundary itself is inside and future-dated items count as current.
/// Unknown timestamps defer to [`ExtractionMethod::admits_unknown_timestamp`].
pub fn in_window(
    published: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window_days: u32,
    method: ExtractionMethod,
) -> bool {
    match published {
        Some(ts) => now.signed_duration_since(ts) <= Duration::days(i64::from(window_days)),
        None => method.admits_unknown_timestamp(),
    }
}
