//! Deduplication and deterministic ordering of the final result set.

use crate::models::{GroupKey, Item, ResultSet};
use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// Descending order on `(published_at, source_name, title)`.
///
/// `Option` orders `None` below any `Some`, so unknown timestamps end up last.
fn newest_first(a: &Item, b: &Item) -> Ordering {
    (&b.published_at, &b.source_name, &b.title).cmp(&(&a.published_at, &a.source_name, &a.title))
}

/// Deduplicate, sort, and optionally cap items per [`GroupKey`].
///
/// Duplicates share the exact `(link, title)` pair; the first one in input
/// (fetch) order wins and later ones are dropped without merging fields.
/// When `max_per_group` is set, each group keeps its first `n` items in sorted
/// order, i.e. its most recent ones.
pub fn rank(items: Vec<Item>, max_per_group: Option<usize>) -> ResultSet {
    let before = items.len();
    let mut unique = items
        .into_iter()
        .unique_by(|item| (item.link.clone(), item.title.clone()))
        .collect::<Vec<_>>();
    let duplicates = before - unique.len();

    unique.sort_by(newest_first);

    let ranked = match max_per_group {
        Some(cap) => {
            let mut seen: HashMap<GroupKey, usize> = HashMap::new();
            unique
                .into_iter()
                .filter(|item| {
                    let count = seen.entry(item.group_key()).or_insert(0);
                    *count += 1;
                    *count <= cap
                })
                .collect()
        }
        None => unique,
    };

    debug!(
        input = before,
        duplicates,
        kept = ranked.len(),
        ?max_per_group,
        "Ranked items"
    );
    ResultSet::from_ranked(ranked)
}
