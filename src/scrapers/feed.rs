//! Syndication feed extraction (RSS 2.0, RSS 1.0/RDF and Atom).
//!
//! Feeds are deserialized with `quick_xml::de`, which decodes entities and
//! CDATA sections for us. Every element we care about is read as a list so
//! that namespaced siblings sharing a local name (`<atom:link>` next to
//! `<link>`, `<media:title>` next to `<title>`) never trip a duplicate-field
//! error; the first non-empty value wins.
//!
//! Titles and summaries are reduced to plain text, links and timestamps are
//! kept verbatim. Entries missing a title or a link are dropped here.

use crate::error::ParseError;
use crate::models::RawCandidate;
use crate::utils::{strip_markup, truncate_for_log};
use html_escape::{decode_html_entities, encode_text};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use tracing::{debug, instrument};

/// Text content of an element, ignoring its attributes.
#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct RssDocument {
    #[serde(default)]
    channel: Option<RssChannel>,
    /// RSS 1.0 puts items next to the channel instead of inside it.
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Default, Deserialize)]
struct RssChannel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Default, Deserialize)]
struct RssItem {
    #[serde(default)]
    title: Vec<Text>,
    #[serde(default)]
    link: Vec<Text>,
    #[serde(default)]
    description: Vec<Text>,
    #[serde(rename = "pubDate", default)]
    pub_date: Vec<Text>,
    #[serde(rename = "date", alias = "dc:date", default)]
    dc_date: Vec<Text>,
}

#[derive(Debug, Default, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    title: Vec<Text>,
    #[serde(default)]
    link: Vec<AtomLink>,
    #[serde(default)]
    summary: Vec<Text>,
    #[serde(default)]
    content: Vec<Text>,
    #[serde(default)]
    published: Vec<Text>,
    #[serde(default)]
    updated: Vec<Text>,
}

#[derive(Debug, Default, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

/// Parse a feed body into candidates for `source_name`.
///
/// # Errors
///
/// Returns [`ParseError`] when the body is not well-formed XML. Callers treat
/// that as "this source produced nothing" rather than a run failure.
#[instrument(level = "debug", skip(body), fields(bytes = body.len()))]
pub fn extract_feed(source_name: &str, body: &str) -> Result<Vec<RawCandidate>, ParseError> {
    let xml = scrub_html_entities_for_xml(body);
    let parse_error = |e: quick_xml::DeError| ParseError {
        source_name: source_name.to_string(),
        message: truncate_for_log(&e.to_string(), 200),
    };

    let candidates = if is_atom(&xml) {
        let feed: AtomFeed = quick_xml::de::from_str(&xml).map_err(parse_error)?;
        feed.entries
            .into_iter()
            .filter_map(|entry| atom_candidate(source_name, entry))
            .collect::<Vec<_>>()
    } else {
        let doc: RssDocument = quick_xml::de::from_str(&xml).map_err(parse_error)?;
        doc.channel
            .map(|c| c.items)
            .unwrap_or_default()
            .into_iter()
            .chain(doc.items)
            .filter_map(|item| rss_candidate(source_name, item))
            .collect::<Vec<_>>()
    };

    debug!(source = %source_name, count = candidates.len(), "Extracted feed candidates");
    Ok(candidates)
}

fn is_atom(xml: &str) -> bool {
    xml.contains("<feed") && !xml.contains("<rss") && !xml.contains("<rdf:RDF")
}

fn first_text(values: &[Text]) -> Option<&str> {
    values
        .iter()
        .map(|t| t.value.trim())
        .find(|v| !v.is_empty())
}

fn rss_candidate(source_name: &str, item: RssItem) -> Option<RawCandidate> {
    let title = strip_markup(first_text(&item.title)?);
    let link = first_text(&item.link)?.to_string();
    if title.is_empty() {
        return None;
    }
    let summary = first_text(&item.description)
        .map(strip_markup)
        .unwrap_or_default();
    let raw_published = first_text(&item.pub_date)
        .or_else(|| first_text(&item.dc_date))
        .map(str::to_string);

    Some(RawCandidate {
        source_name: source_name.to_string(),
        title,
        summary,
        link,
        raw_published,
    })
}

fn atom_candidate(source_name: &str, entry: AtomEntry) -> Option<RawCandidate> {
    let title = strip_markup(first_text(&entry.title)?);
    let link = entry
        .link
        .iter()
        .filter(|l| !l.href.trim().is_empty())
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| entry.link.iter().find(|l| !l.href.trim().is_empty()))?
        .href
        .trim()
        .to_string();
    if title.is_empty() {
        return None;
    }
    let summary = first_text(&entry.summary)
        .or_else(|| first_text(&entry.content))
        .map(strip_markup)
        .unwrap_or_default();
    let raw_published = first_text(&entry.published)
        .or_else(|| first_text(&entry.updated))
        .map(str::to_string);

    Some(RawCandidate {
        source_name: source_name.to_string(),
        title,
        summary,
        link,
        raw_published,
    })
}

/// XML's own named entities; `quick_xml` decodes these itself.
const XML_ENTITIES: &[&str] = &["amp", "lt", "gt", "quot", "apos"];

static NAMED_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&([A-Za-z][A-Za-z0-9]*);").unwrap());

/// Resolve HTML-only named entities before strict XML parsing.
///
/// WordPress and hand-rolled agency feeds emit `&nbsp;`, `&ndash;`,
/// `&ccedil;`, `&atilde;` and friends, none of which XML defines. Known
/// entities become their character (re-escaped if that character is markup);
/// unknown ones are kept as literal text.
fn scrub_html_entities_for_xml(s: &str) -> String {
    NAMED_ENTITY
        .replace_all(s, |caps: &Captures<'_>| {
            let entity = &caps[0];
            if XML_ENTITIES.contains(&&caps[1]) {
                return entity.to_string();
            }
            let decoded = decode_html_entities(entity);
            if decoded == entity {
                format!("&amp;{}", &entity[1..])
            } else if decoded == "\u{a0}" {
                " ".to_string()
            } else {
                encode_text(&decoded).into_owned()
            }
        })
        .into_owned()
}
