//! Data models for sources, extracted candidates and ranked items.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`Source`]: A named feed or listing page to poll
//! - [`RawCandidate`]: An unfiltered entry fresh out of an extractor
//! - [`Item`]: The canonical, validated unit that flows through filtering and ranking
//! - [`ResultSet`]: The final deduplicated, ordered sequence handed to the outputs
//!
//! Everything here lives for a single run; the only durable artifact is the
//! append-only CSV log written from the final [`ResultSet`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// How a source is read, and therefore how its items were extracted.
///
/// Serialized as `RSS` / `HTML` to keep the log column readable for the people
/// who consume the CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtractionMethod {
    /// Syndication feed (RSS 2.0, RSS 1.0 or Atom).
    #[serde(rename = "RSS")]
    Feed,
    /// HTML listing page scanned for hyperlinks.
    #[serde(rename = "HTML")]
    Page,
}

impl ExtractionMethod {
    /// Whether items without a usable timestamp still count as current.
    ///
    /// Feeds always carry dates, so a missing one means the entry is unusable.
    /// Listing pages never carry one, so every link on them is treated as current.
    pub fn admits_unknown_timestamp(self) -> bool {
        matches!(self, ExtractionMethod::Page)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionMethod::Feed => "RSS",
            ExtractionMethod::Page => "HTML",
        }
    }
}

/// A named endpoint the pipeline polls once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Unique name within a run, e.g. `"ERC – Funding (All calls)"`.
    pub name: String,
    pub endpoint: Url,
    pub kind: ExtractionMethod,
    /// The Google News query this source was generated from, if any.
    pub search_term: Option<String>,
}

impl Source {
    pub fn feed(name: impl Into<String>, endpoint: Url) -> Self {
        Self {
            name: name.into(),
            endpoint,
            kind: ExtractionMethod::Feed,
            search_term: None,
        }
    }

    pub fn page(name: impl Into<String>, endpoint: Url) -> Self {
        Self {
            name: name.into(),
            endpoint,
            kind: ExtractionMethod::Page,
            search_term: None,
        }
    }
}

/// An entry produced by an extractor, before timestamp normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCandidate {
    pub source_name: String,
    pub title: String,
    /// Plain-text summary. For page candidates this is the full anchor text
    /// when the title had to be truncated, and empty otherwise.
    pub summary: String,
    pub link: String,
    /// Verbatim timestamp text from the feed; always `None` for pages.
    pub raw_published: Option<String>,
}

/// A validated funding call flowing through filtering and ranking.
///
/// `title` and `link` are never empty: construction goes through
/// [`Item::from_candidate`], which refuses candidates missing either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub source_name: String,
    pub title: String,
    pub link: String,
    pub summary: String,
    /// `None` means the timestamp was absent or unparseable.
    pub published_at: Option<DateTime<Utc>>,
    pub extraction_method: ExtractionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_term: Option<String>,
}

impl Item {
    /// Build an item from a candidate and its already-normalized timestamp.
    ///
    /// Returns `None` if the trimmed title or link is empty.
    pub fn from_candidate(
        candidate: RawCandidate,
        published_at: Option<DateTime<Utc>>,
        source: &Source,
    ) -> Option<Self> {
        let title = candidate.title.trim();
        let link = candidate.link.trim();
        if title.is_empty() || link.is_empty() {
            return None;
        }
        Some(Self {
            source_name: candidate.source_name,
            title: title.to_string(),
            link: link.to_string(),
            summary: candidate.summary.trim().to_string(),
            published_at,
            extraction_method: source.kind,
            search_term: source.search_term.clone(),
        })
    }

    /// The text relevance patterns run against.
    ///
    /// Feeds have a summary to match on; pages only have anchor text and the
    /// link itself, which often carries words like `/calls/` or `/editais/`.
    /// A page summary, when present, is the untruncated anchor text.
    pub fn searchable_text(&self) -> String {
        match self.extraction_method {
            ExtractionMethod::Feed => format!("{} {}", self.title, self.summary),
            ExtractionMethod::Page if self.summary.is_empty() => {
                format!("{} {}", self.title, self.link)
            }
            ExtractionMethod::Page => format!("{} {}", self.summary, self.link),
        }
    }

    /// Host of the item's link without a leading `www.`.
    pub fn domain(&self) -> Option<String> {
        Url::parse(&self.link)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            label: self.source_name.clone(),
            domain: self.domain().unwrap_or_else(|| self.source_name.clone()),
            search_term: self.search_term.clone(),
        }
    }
}

/// Key used by the optional per-group cap in ranking.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub label: String,
    pub domain: String,
    pub search_term: Option<String>,
}

/// The final, deduplicated and ordered items of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet(Vec<Item>);

impl ResultSet {
    /// Wrap an already-ranked vector. Only the ranker should call this.
    pub(crate) fn from_ranked(items: Vec<Item>) -> Self {
        Self(items)
    }

    pub fn items(&self) -> &[Item] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Item;
    type IntoIter = std::slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
