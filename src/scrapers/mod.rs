//! Candidate extraction from fetched source bodies.
//!
//! Each source is read one of two ways, selected by its
//! [`ExtractionMethod`](crate::models::ExtractionMethod):
//!
//! | Method | Module | Input | Timestamp | Summary |
//! |--------|--------|-------|-----------|---------|
//! | Feed | [`feed`] | RSS 2.0 / RSS 1.0 / Atom XML | `pubDate`, `published`, `updated`, `dc:date` | description / summary / content |
//! | Page | [`page`] | HTML listing page | never | never |
//!
//! Both extractors are pure functions over the body text; fetching lives in
//! [`crate::fetcher`].

pub mod feed;
pub mod page;

use crate::error::ParseError;
use crate::models::{ExtractionMethod, RawCandidate, Source};

/// Dispatch a fetched body to the extractor matching the source kind.
pub fn extract(source: &Source, body: &str) -> Result<Vec<RawCandidate>, ParseError> {
    match source.kind {
        ExtractionMethod::Feed => feed::extract_feed(&source.name, body),
        ExtractionMethod::Page => Ok(page::extract_page(&source.name, &source.endpoint, body)),
    }
}
