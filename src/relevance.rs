//! Positive/negative keyword relevance filtering.
//!
//! The filter knows nothing about languages. Locale knowledge lives entirely in
//! the pattern lists (see [`crate::config::RelevanceProfile`]), which are
//! compiled once per run into [`PatternSet`]s and shared read-only by every
//! fetch worker.

use crate::error::ConfigError;
use regex::{Regex, RegexBuilder};

/// An ordered list of compiled, case-insensitive patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    /// Compile patterns in order. Plain words work as substring matches;
    /// anything else is interpreted as a regular expression.
    pub fn compile<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| ConfigError::InvalidPattern {
                        pattern: p.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(text))
    }

    /// The first pattern that matches, for debug logging.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|re| re.is_match(text))
            .map(|re| re.as_str())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// A text is relevant iff some positive pattern matches and no negative one does.
pub fn is_relevant(text: &str, positive: &PatternSet, negative: &PatternSet) -> bool {
    !negative.is_match(text) && positive.is_match(text)
}
