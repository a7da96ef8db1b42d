//! HTML listing-page extraction.
//!
//! Agency "calls" pages (NWO, DFG, ERC, CAPES…) rarely expose a feed, so every
//! hyperlink on the page becomes a candidate. Anchor text is the title and the
//! resolved link is the only other signal, which is why page-derived items are
//! matched against `title + link` by the relevance filter.
//!
//! # URL Pattern
//!
//! Root-relative links such as `/editais/99` are resolved against the page URL,
//! e.g. `https://capes.gov.br/editais` → `https://capes.gov.br/editais/99`.

use crate::models::RawCandidate;
use crate::utils::{collapse_whitespace, truncate_chars};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

/// Upper bound on a page-derived title, in characters.
pub const MAX_TITLE_CHARS: usize = 200;

/// Title used when an anchor has no visible text (icons, images).
pub const UNTITLED: &str = "(untitled)";

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// Scan every hyperlink of `html` into a candidate for `source_name`.
///
/// Empty and fragment-only (`#…`) targets are skipped. Page candidates never
/// carry a timestamp. When the anchor text is longer than the title allows,
/// the full text is kept as the summary so relevance still sees all of it.
#[instrument(level = "debug", skip(html), fields(bytes = html.len(), %page_url))]
pub fn extract_page(source_name: &str, page_url: &Url, html: &str) -> Vec<RawCandidate> {
    let document = Html::parse_document(html);

    let candidates = document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?.trim();
            let link = resolve_link(page_url, href)?;
            let text = collapse_whitespace(&anchor.text().collect::<Vec<_>>().join(" "));
            let title = if text.is_empty() {
                UNTITLED.to_string()
            } else {
                truncate_chars(&text, MAX_TITLE_CHARS)
            };
            let summary = if title.len() < text.len() { text } else { String::new() };
            Some(RawCandidate {
                source_name: source_name.to_string(),
                title,
                summary,
                link,
                raw_published: None,
            })
        })
        .collect::<Vec<_>>();

    debug!(source = %source_name, count = candidates.len(), "Extracted page candidates");
    candidates
}

/// Resolve an `href` against the page it was found on.
///
/// Absolute URLs are kept verbatim; anything relative is joined to `page_url`.
fn resolve_link(page_url: &Url, href: &str) -> Option<String> {
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    if href.starts_with('/') {
        return page_url.join(href).ok().map(String::from);
    }
    match Url::parse(href) {
        Ok(_) => Some(href.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            page_url.join(href).ok().map(String::from)
        }
        Err(_) => None,
    }
}
