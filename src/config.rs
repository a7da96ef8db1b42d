//! Source registry, relevance profiles and run settings.
//!
//! A run is configured by exactly one [`Settings`] value and one [`Registry`],
//! both built in `main` and passed into the pipeline. Nothing here reads the
//! environment; `clap` resolves flags and env fallbacks before we get here.
//!
//! # Sources file
//!
//! ```yaml
//! rss_sources:
//!   "FAPEMA (site oficial RSS)": "https://www.fapema.br/portal/feed/"
//! html_sources:
//!   "NWO – Calls for proposals (EN)": "https://www.nwo.nl/en/calls"
//! search:
//!   lang: pt-BR
//!   country: BR
//!   terms: ["site:fapema.br edital"]
//! positive_patterns: ['\bedital\b']
//! negative_patterns: ['\btender(s)?\b']
//! replace_defaults: false
//! ```
//!
//! A missing file means "profile defaults". An unreadable or invalid file is
//! logged as a warning and the profile defaults are used instead. Unless
//! `replace_defaults` is set, the profile's own sources are merged in under
//! any name the file does not define, so a hand-edited file cannot silently
//! drop the ERC pages.

use crate::error::ConfigError;
use crate::models::{ExtractionMethod, Source};
use crate::relevance::PatternSet;
use clap::ValueEnum;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

static GOOGLE_NEWS_SEARCH: Lazy<Url> =
    Lazy::new(|| Url::parse("https://news.google.com/rss/search").unwrap());

/// Built-in source and keyword sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// FAPEMA calls through Google News searches (pt-BR).
    Brasil,
    /// Dutch, German and EU/ERC funding pages (EN/NL/DE).
    Exterior,
    /// FAPEMA's own RSS feed plus one Google News query.
    Fapema,
}

struct ProfileDefaults {
    rss: &'static [(&'static str, &'static str)],
    html: &'static [(&'static str, &'static str)],
    search: Option<SearchDefaults>,
    positive: &'static [&'static str],
    negative: &'static [&'static str],
    window_days: u32,
    max_per_group: Option<usize>,
}

struct SearchDefaults {
    lang: &'static str,
    country: &'static str,
    terms: &'static [&'static str],
}

const PORTUGUESE_POSITIVE: &[&str] = &[
    "edital",
    "editais",
    "chamada",
    "chamadas",
    r"chamada\s+p[úu]blica",
    "seleção",
    "selecao",
    "convocação",
    "submissão",
    "fomento",
    "bolsa",
    "bolsas",
    "pesquisa",
    "propostas",
    "resultado",
    "retificação",
    "prorrog",
    "pós-doutorado",
    "inovação",
];

const PORTUGUESE_NEGATIVE: &[&str] = &[r"\blicitaç(ão|ões)\b", r"\bpreg[ãa]o\b"];

const EUROPEAN_POSITIVE: &[&str] = &[
    // EN
    r"\b(call|calls)\b",
    r"\b(funding|fund|grant|grants|fellowship|scholarship)s?\b",
    r"\b(open\s+call|call\s+for\s+proposals|request\s+for\s+proposals)\b",
    r"\b(ERC|European Research Council)\b",
    r"\bConsolidator\b",
    r"\bConsolidator\s+Grant(s)?\b",
    r"\bHorizon\s+Europe\b",
    r"\bWork\s+Programme\b",
    // NL
    r"\b(subsidie|beurs|financiering|oproep|oproepen)\b",
    // DE
    r"\b(Förderung|Förderaufruf|Ausschreibung|Stipendium|Stipendien)\b",
];

const EUROPEAN_NEGATIVE: &[&str] = &[
    r"\bprocurement\b",
    r"\btender(s)?\b",
    r"\bVergabe\b",
    r"\bAanbesteding\b",
];

const EXTERIOR_HTML: &[(&str, &str)] = &[
    // Netherlands
    ("NWO – Calls for proposals (EN)", "https://www.nwo.nl/en/calls"),
    ("ZonMw – Calls", "https://www.zonmw.nl/en/calls-for-proposals"),
    ("RVO – Subsidies", "https://www.rvo.nl/subsidies"),
    // Germany
    (
        "DFG – Announcements & Proposals",
        "https://www.dfg.de/en/research_funding/announcements_proposals",
    ),
    (
        "DAAD – Scholarships (EN)",
        "https://www.daad.de/en/study-and-research-in-germany/scholarships/",
    ),
    (
        "BMBF – Förderungen",
        "https://www.bmbf.de/bmbf/de/service/foerderungen/foerderungen_node.html",
    ),
    // European Union
    (
        "ERC – Consolidator Grants",
        "https://erc.europa.eu/apply-grant/consolidator-grant",
    ),
    ("ERC – Funding (All calls)", "https://erc.europa.eu/funding"),
    (
        "EU Funding & Tenders – Horizon Europe (search)",
        "https://ec.europa.eu/info/funding-tenders/opportunities/portal/screen/opportunities-topic-search;callCode=HORIZON",
    ),
];

const FAPEMA_RSS: &[(&str, &str)] = &[
    ("FAPEMA (site oficial RSS)", "https://www.fapema.br/portal/feed/"),
    (
        "FAPEMA (Google News)",
        "https://news.google.com/rss/search?q=site:fapema.br+(edital+OR+chamada+OR+bolsa+OR+fomento)",
    ),
];

const BRASIL_TERMS: &[&str] = &[
    "site:fapema.br edital",
    "site:fapema.br chamada pública",
    "site:fapema.br chamada publica",
    "site:fapema.br resultado edital",
    "site:fapema.br retificação edital",
    "site:fapema.br bolsa",
    "site:fapema.br pós-doutorado",
    "site:fapema.br inovação",
    "site:www.fapema.br edital",
    "site:www.fapema.br chamada pública",
    "site:www.fapema.br resultado edital",
];

impl Profile {
    fn defaults(self) -> ProfileDefaults {
        match self {
            Profile::Brasil => ProfileDefaults {
                rss: &[],
                html: &[],
                search: Some(SearchDefaults {
                    lang: "pt-BR",
                    country: "BR",
                    terms: BRASIL_TERMS,
                }),
                positive: PORTUGUESE_POSITIVE,
                negative: PORTUGUESE_NEGATIVE,
                window_days: 14,
                max_per_group: Some(10),
            },
            Profile::Exterior => ProfileDefaults {
                rss: &[],
                html: EXTERIOR_HTML,
                search: None,
                positive: EUROPEAN_POSITIVE,
                negative: EUROPEAN_NEGATIVE,
                window_days: 3,
                max_per_group: None,
            },
            Profile::Fapema => ProfileDefaults {
                rss: FAPEMA_RSS,
                html: &[],
                search: None,
                positive: PORTUGUESE_POSITIVE,
                negative: PORTUGUESE_NEGATIVE,
                window_days: 14,
                max_per_group: None,
            },
        }
    }

    pub fn default_window_days(self) -> u32 {
        self.defaults().window_days
    }

    pub fn default_max_per_group(self) -> Option<usize> {
        self.defaults().max_per_group
    }

    /// Human-readable title used in digests.
    pub fn title(self) -> &'static str {
        match self {
            Profile::Brasil => "Editais Brasil (FAPEMA)",
            Profile::Exterior => "Calls & Funding (NL + DE + EU/ERC)",
            Profile::Fapema => "Editais – FAPEMA",
        }
    }
}

/// Google News RSS search block of the sources file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub lang: Option<String>,
    pub country: Option<String>,
    pub terms: Vec<String>,
}

/// On-disk shape of the sources YAML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourcesFile {
    pub rss_sources: serde_yaml::Mapping,
    pub html_sources: serde_yaml::Mapping,
    pub search: Option<SearchConfig>,
    pub positive_patterns: Option<Vec<String>>,
    pub negative_patterns: Option<Vec<String>>,
    pub replace_defaults: bool,
}

impl SourcesFile {
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str::<Option<SourcesFile>>(text)
            .map(Option::unwrap_or_default)
            .map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Read the sources file at `path`.
///
/// Returns `Ok(None)` when the file does not exist.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn load_sources_file(path: &Path) -> Result<Option<SourcesFile>, ConfigError> {
    if !path.exists() {
        info!("No sources file; using profile defaults");
        return Ok(None);
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    SourcesFile::from_yaml(&text, path).map(Some)
}

/// Compiled positive/negative pattern sets for one run.
#[derive(Debug, Clone, Default)]
pub struct RelevanceProfile {
    pub positive: PatternSet,
    pub negative: PatternSet,
}

impl RelevanceProfile {
    pub fn compile<S: AsRef<str>>(positive: &[S], negative: &[S]) -> Result<Self, ConfigError> {
        Ok(Self {
            positive: PatternSet::compile(positive)?,
            negative: PatternSet::compile(negative)?,
        })
    }
}

/// Everything the pipeline polls and matches against in one run.
#[derive(Debug, Clone)]
pub struct Registry {
    pub sources: Vec<Source>,
    pub relevance: RelevanceProfile,
}

/// Build the registry for `profile`, merging in the sources file at `path`.
///
/// File problems degrade to profile defaults with a warning; the only fatal
/// outcome is ending up with no sources at all.
#[instrument(level = "info", skip_all, fields(?profile))]
pub fn load_registry(profile: Profile, path: Option<&Path>) -> Result<Registry, ConfigError> {
    let file = match path.map(load_sources_file) {
        Some(Ok(file)) => file,
        Some(Err(e)) => {
            warn!(error = %e, "Failed to load sources file; using profile defaults");
            None
        }
        None => None,
    };
    build_registry(profile, file)
}

/// Merge profile defaults with an optional sources file.
pub fn build_registry(profile: Profile, file: Option<SourcesFile>) -> Result<Registry, ConfigError> {
    let defaults = profile.defaults();
    let file = file.unwrap_or_default();
    let mut sources = Vec::new();

    for (name, url) in mapping_entries(&file.rss_sources) {
        push_source(&mut sources, &name, &url, ExtractionMethod::Feed);
    }
    for (name, url) in mapping_entries(&file.html_sources) {
        push_source(&mut sources, &name, &url, ExtractionMethod::Page);
    }
    if let Some(search) = &file.search {
        let lang = search
            .lang
            .as_deref()
            .or(defaults.search.as_ref().map(|s| s.lang))
            .unwrap_or("pt-BR");
        let country = search
            .country
            .as_deref()
            .or(defaults.search.as_ref().map(|s| s.country))
            .unwrap_or("BR");
        for term in &search.terms {
            sources.push(google_news_source(term, lang, country));
        }
    }

    if !file.replace_defaults {
        for (name, url) in defaults.rss {
            push_source(&mut sources, name, url, ExtractionMethod::Feed);
        }
        for (name, url) in defaults.html {
            push_source(&mut sources, name, url, ExtractionMethod::Page);
        }
        if let Some(search) = &defaults.search {
            let file_terms = file
                .search
                .as_ref()
                .map(|s| s.terms.clone())
                .unwrap_or_default();
            for term in search.terms.iter().filter(|t| !file_terms.iter().any(|f| f == *t)) {
                sources.push(google_news_source(term, search.lang, search.country));
            }
        }
    }

    let sources = unique_by_name(sources);
    if sources.is_empty() {
        return Err(ConfigError::NoSources);
    }

    let relevance = match (&file.positive_patterns, &file.negative_patterns) {
        (None, None) => RelevanceProfile::compile(defaults.positive, defaults.negative)?,
        (positive, negative) => {
            let positive = positive
                .clone()
                .unwrap_or_else(|| defaults.positive.iter().map(|s| s.to_string()).collect());
            let negative = negative
                .clone()
                .unwrap_or_else(|| defaults.negative.iter().map(|s| s.to_string()).collect());
            match RelevanceProfile::compile(positive.as_slice(), negative.as_slice()) {
                Ok(profile) => profile,
                Err(e) => {
                    warn!(error = %e, "Invalid relevance patterns in sources file; using profile defaults");
                    RelevanceProfile::compile(defaults.positive, defaults.negative)?
                }
            }
        }
    };

    info!(
        sources = sources.len(),
        positive = relevance.positive.len(),
        negative = relevance.negative.len(),
        "Source registry loaded"
    );
    Ok(Registry { sources, relevance })
}

fn mapping_entries(mapping: &serde_yaml::Mapping) -> Vec<(String, String)> {
    mapping
        .iter()
        .filter_map(|(k, v)| match (k.as_str(), v.as_str()) {
            (Some(name), Some(url)) => Some((name.to_string(), url.to_string())),
            _ => {
                warn!(key = ?k, "Ignoring non-string source entry");
                None
            }
        })
        .collect()
}

fn push_source(
    sources: &mut Vec<Source>,
    name: &str,
    endpoint: &str,
    kind: ExtractionMethod,
) {
    match parse_endpoint(name, endpoint) {
        Ok(endpoint) => sources.push(Source {
            name: name.to_string(),
            endpoint,
            kind,
            search_term: None,
        }),
        Err(e) => warn!(error = %e, "Skipping source"),
    }
}

fn parse_endpoint(name: &str, endpoint: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEndpoint {
        name: name.to_string(),
        endpoint: endpoint.to_string(),
        reason,
    };
    let url = Url::parse(endpoint.trim()).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}

/// A Google News RSS search for `term`, localized to `lang`/`country`.
pub fn google_news_source(term: &str, lang: &str, country: &str) -> Source {
    let mut endpoint = GOOGLE_NEWS_SEARCH.clone();
    endpoint
        .query_pairs_mut()
        .append_pair("q", term)
        .append_pair("hl", lang)
        .append_pair("gl", country)
        .append_pair("ceid", &format!("{country}:{lang}"));
    Source {
        name: format!("Google News: {term}"),
        endpoint,
        kind: ExtractionMethod::Feed,
        search_term: Some(term.to_string()),
    }
}

fn unique_by_name(sources: Vec<Source>) -> Vec<Source> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|s| {
            let fresh = seen.insert(s.name.clone());
            if !fresh {
                warn!(source = %s.name, "Duplicate source name; keeping first definition");
            }
            fresh
        })
        .collect()
}

/// Resolved, immutable settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub profile: Profile,
    pub window_days: u32,
    pub max_per_group: Option<usize>,
    pub concurrency: usize,
    pub timeout: Duration,
    pub retries: usize,
}

impl Settings {
    /// Upper bound on concurrent fetches.
    pub const MAX_CONCURRENCY: usize = 16;

    pub fn for_profile(profile: Profile) -> Self {
        Self {
            profile,
            window_days: profile.default_window_days(),
            max_per_group: profile.default_max_per_group(),
            concurrency: 8,
            timeout: Duration::from_secs(25),
            retries: 0,
        }
    }

    /// Concurrency clamped to `1..=MAX_CONCURRENCY`.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, Self::MAX_CONCURRENCY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(yaml: &str) -> SourcesFile {
        SourcesFile::from_yaml(yaml, &PathBuf::from("sources.yaml")).unwrap()
    }

    #[test]
    fn test_exterior_defaults() {
        let registry = build_registry(Profile::Exterior, None).unwrap();
        assert_eq!(registry.sources.len(), EXTERIOR_HTML.len());
        assert!(registry.sources.iter().all(|s| s.kind == ExtractionMethod::Page));
        assert!(registry.relevance.positive.is_match("Open call for proposals"));
        assert!(registry.relevance.negative.is_match("Public procurement notice"));
    }

    #[test]
    fn test_brasil_builds_google_news_searches() {
        let registry = build_registry(Profile::Brasil, None).unwrap();
        assert_eq!(registry.sources.len(), BRASIL_TERMS.len());
        let first = &registry.sources[0];
        assert_eq!(first.kind, ExtractionMethod::Feed);
        assert_eq!(first.search_term.as_deref(), Some("site:fapema.br edital"));
        assert_eq!(
            first.endpoint.as_str(),
            "https://news.google.com/rss/search?q=site%3Afapema.br+edital&hl=pt-BR&gl=BR&ceid=BR%3Apt-BR"
        );
    }

    #[test]
    fn test_file_sources_come_first_and_defaults_are_merged() {
        let file = parse(
            r#"
rss_sources:
  "CNPq": "https://www.gov.br/cnpq/rss"
html_sources:
  "ERC – Funding (All calls)": "https://erc.europa.eu/funding-override"
"#,
        );
        let registry = build_registry(Profile::Exterior, Some(file)).unwrap();
        assert_eq!(registry.sources[0].name, "CNPq");
        assert_eq!(registry.sources[0].kind, ExtractionMethod::Feed);
        let erc = registry
            .sources
            .iter()
            .filter(|s| s.name == "ERC – Funding (All calls)")
            .collect::<Vec<_>>();
        assert_eq!(erc.len(), 1);
        assert_eq!(erc[0].endpoint.as_str(), "https://erc.europa.eu/funding-override");
        assert_eq!(registry.sources.len(), EXTERIOR_HTML.len() + 1);
    }

    #[test]
    fn test_replace_defaults_with_nothing_is_fatal() {
        let file = parse("replace_defaults: true\n");
        let err = build_registry(Profile::Exterior, Some(file)).unwrap_err();
        assert!(matches!(err, ConfigError::NoSources));
    }

    #[test]
    fn test_invalid_endpoints_are_skipped() {
        let file = parse(
            r#"
replace_defaults: true
html_sources:
  "Broken": "not a url"
  "Ftp": "ftp://files.example.org/calls"
  "Good": "https://good.example.org/calls"
"#,
        );
        let registry = build_registry(Profile::Exterior, Some(file)).unwrap();
        assert_eq!(registry.sources.len(), 1);
        assert_eq!(registry.sources[0].name, "Good");
    }

    #[test]
    fn test_invalid_patterns_fall_back_to_profile() {
        let file = parse(
            r#"
positive_patterns: ["(unclosed"]
"#,
        );
        let registry = build_registry(Profile::Fapema, Some(file)).unwrap();
        assert!(registry.relevance.positive.is_match("Novo edital"));
    }

    #[test]
    fn test_custom_patterns_replace_profile_patterns() {
        let file = parse(
            r#"
positive_patterns: ['\bhackathon\b']
negative_patterns: []
"#,
        );
        let registry = build_registry(Profile::Fapema, Some(file)).unwrap();
        assert!(registry.relevance.positive.is_match("FAPEMA Hackathon 2024"));
        assert!(!registry.relevance.positive.is_match("Novo edital"));
        assert!(registry.relevance.negative.is_empty());
    }

    #[test]
    fn test_missing_and_invalid_files_degrade_to_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope.yaml");
        let registry = load_registry(Profile::Fapema, Some(&missing)).unwrap();
        assert_eq!(registry.sources.len(), FAPEMA_RSS.len());

        let invalid = tmp.path().join("bad.yaml");
        std::fs::write(&invalid, "rss_sources: [unterminated").unwrap();
        assert!(load_sources_file(&invalid).is_err());
        let registry = load_registry(Profile::Fapema, Some(&invalid)).unwrap();
        assert_eq!(registry.sources.len(), FAPEMA_RSS.len());
    }

    #[test]
    fn test_empty_file_is_defaults() {
        let file = parse("");
        let registry = build_registry(Profile::Fapema, Some(file)).unwrap();
        assert_eq!(registry.sources.len(), FAPEMA_RSS.len());
    }

    #[test]
    fn test_settings_clamp_concurrency() {
        let mut settings = Settings::for_profile(Profile::Brasil);
        assert_eq!(settings.window_days, 14);
        assert_eq!(settings.max_per_group, Some(10));
        settings.concurrency = 0;
        assert_eq!(settings.effective_concurrency(), 1);
        settings.concurrency = 64;
        assert_eq!(settings.effective_concurrency(), Settings::MAX_CONCURRENCY);
    }
}
