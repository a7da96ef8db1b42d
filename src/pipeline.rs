//! The collection-and-classification pipeline.
//!
//! ```text
//! Registry ─┬─ fetch → extract → normalize → window → relevance ─┐
//!           ├─ fetch → extract → normalize → window → relevance ─┤  (buffered, N at a time)
//!           └─ …                                                 ─┴→ rank → ResultSet
//! ```
//!
//! Sources are independent, so fetches run concurrently through
//! `StreamExt::buffered`, which also yields results in registry order. That
//! order is what "first occurrence wins" means during deduplication, so a run
//! over the same inputs always keeps the same duplicate.

use crate::config::{Registry, RelevanceProfile, Settings};
use crate::error::{ConfigError, SourceFailure};
use crate::fetcher::FetchAsync;
use crate::models::{Item, RawCandidate, ResultSet, Source};
use crate::rank::rank;
use crate::recency::in_window;
use crate::relevance::is_relevant;
use crate::scrapers;
use crate::timestamp;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Per-source counters for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutcome {
    pub source_name: String,
    /// Candidates produced by the extractor.
    pub candidates: usize,
    /// Items that survived the window and relevance checks.
    pub accepted: usize,
    pub failed: bool,
}

/// Everything a run produced, for the outputs and the final log line.
#[derive(Debug)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub results: ResultSet,
    pub outcomes: Vec<SourceOutcome>,
    pub failures: Vec<SourceFailure>,
}

impl RunReport {
    pub fn accepted_before_rank(&self) -> usize {
        self.outcomes.iter().map(|o| o.accepted).sum()
    }
}

/// A configured pipeline, generic over how sources are fetched.
#[derive(Debug)]
pub struct Pipeline<F> {
    fetcher: F,
    registry: Registry,
    settings: Settings,
}

impl<F> Pipeline<F>
where
    F: FetchAsync,
{
    /// # Errors
    ///
    /// [`ConfigError::NoSources`] if the registry is empty: an empty digest
    /// must never be mistaken for "nothing new was published".
    pub fn new(fetcher: F, registry: Registry, settings: Settings) -> Result<Self, ConfigError> {
        if registry.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        Ok(Self {
            fetcher,
            registry,
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Poll every source and rank what is current and relevant as of `now`.
    #[instrument(level = "info", skip_all, fields(sources = self.registry.sources.len()))]
    pub async fn run(&self, now: DateTime<Utc>) -> RunReport {
        let t0 = Instant::now();
        let concurrency = self.settings.effective_concurrency();
        info!(concurrency, window_days = self.settings.window_days, "Starting collection");

        let harvested = stream::iter(self.registry.sources.iter())
            .map(|source| async move { (source, self.harvest(source, now).await) })
            .buffered(concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut items = Vec::new();
        let mut outcomes = Vec::with_capacity(harvested.len());
        let mut failures = Vec::new();
        for (source, result) in harvested {
            match result {
                Ok((candidates, accepted)) => {
                    outcomes.push(SourceOutcome {
                        source_name: source.name.clone(),
                        candidates,
                        accepted: accepted.len(),
                        failed: false,
                    });
                    items.extend(accepted);
                }
                Err(failure) => {
                    warn!(source = %source.name, error = %failure, "Source contributed nothing");
                    outcomes.push(SourceOutcome {
                        source_name: source.name.clone(),
                        candidates: 0,
                        accepted: 0,
                        failed: true,
                    });
                    failures.push(failure);
                }
            }
        }

        let results = rank(items, self.settings.max_per_group);
        info!(
            results = results.len(),
            failed_sources = failures.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Collection finished"
        );

        RunReport {
            started_at: now,
            results,
            outcomes,
            failures,
        }
    }

    /// Fetch, extract and classify one source.
    ///
    /// Returns the number of extracted candidates and the accepted items.
    async fn harvest(
        &self,
        source: &Source,
        now: DateTime<Utc>,
    ) -> Result<(usize, Vec<Item>), SourceFailure> {
        let body = self.fetcher.fetch(source).await?;
        let candidates = scrapers::extract(source, &body)?;
        let count = candidates.len();
        let accepted = classify(
            source,
            candidates,
            &self.registry.relevance,
            self.settings.window_days,
            now,
        );
        info!(
            source = %source.name,
            candidates = count,
            accepted = accepted.len(),
            "Source processed"
        );
        Ok((count, accepted))
    }
}

/// Turn one source's candidates into accepted items.
///
/// Each candidate is normalized, validated into an [`Item`], checked against
/// the recency window for its extraction method, then matched against the
/// relevance patterns.
pub fn classify(
    source: &Source,
    candidates: Vec<RawCandidate>,
    relevance: &RelevanceProfile,
    window_days: u32,
    now: DateTime<Utc>,
) -> Vec<Item> {
    candidates
        .into_iter()
        .filter_map(|candidate| {
            let published = timestamp::normalize(candidate.raw_published.as_deref());
            let item = Item::from_candidate(candidate, published, source)?;

            if !in_window(item.published_at, now, window_days, item.extraction_method) {
                debug!(title = %item.title, published = ?item.published_at, "Outside recency window");
                return None;
            }

            let text = item.searchable_text();
            if !is_relevant(&text, &relevance.positive, &relevance.negative) {
                debug!(
                    title = %item.title,
                    negative = ?relevance.negative.first_match(&text),
                    "Not relevant"
                );
                return None;
            }
            Some(item)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::fetcher::fixtures::FixtureFetcher;
    use crate::models::ExtractionMethod;
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_subscriber::Layer;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use url::Url;

    const FAPEMA_FEED: &str = "https://fapema.br/feed";
    const MIRROR_FEED: &str = "https://mirror.example/feed";
    const CAPES_PAGE: &str = "https://capes.gov.br/editais";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap()
    }

    fn rss(entries: &[(&str, &str, &str)]) -> String {
        let items = entries
            .iter()
            .map(|(title, link, date)| {
                format!("<item><title>{title}</title><link>{link}</link><pubDate>{date}</pubDate></item>")
            })
            .collect::<String>();
        format!(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title>{items}</channel></rss>"#)
    }

    fn registry(sources: Vec<Source>, positive: &[&str], negative: &[&str]) -> Registry {
        Registry {
            sources,
            relevance: RelevanceProfile::compile(positive, negative).unwrap(),
        }
    }

    fn settings(window_days: u32) -> Settings {
        Settings {
            window_days,
            max_per_group: None,
            ..Settings::for_profile(Profile::Fapema)
        }
    }

    fn feed(name: &str, url: &str) -> Source {
        Source::feed(name, Url::parse(url).unwrap())
    }

    fn page(name: &str, url: &str) -> Source {
        Source::page(name, Url::parse(url).unwrap())
    }

    #[tokio::test]
    async fn test_recent_relevant_feed_entry_is_included() {
        let fetcher = FixtureFetcher::default().with_body(
            FAPEMA_FEED,
            &rss(&[(
                "Edital 01/2024 – Bolsas de Pós-Doutorado",
                "https://fapema.br/x",
                "2024-05-01T10:00:00Z",
            )]),
        );
        let pipeline = Pipeline::new(
            fetcher,
            registry(vec![feed("FAPEMA", FAPEMA_FEED)], &["bolsa"], &[]),
            settings(14),
        )
        .unwrap();

        let report = pipeline.run(now()).await;
        assert_eq!(report.results.len(), 1);
        let item = &report.results.items()[0];
        assert_eq!(item.link, "https://fapema.br/x");
        assert_eq!(
            item.published_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(item.extraction_method, ExtractionMethod::Feed);
    }

    #[tokio::test]
    async fn test_old_feed_entry_is_excluded() {
        let fetcher = FixtureFetcher::default().with_body(
            FAPEMA_FEED,
            &rss(&[(
                "Edital 01/2024 – Bolsas de Pós-Doutorado",
                "https://fapema.br/x",
                "2024-04-01T00:00:00Z",
            )]),
        );
        let pipeline = Pipeline::new(
            fetcher,
            registry(vec![feed("FAPEMA", FAPEMA_FEED)], &["bolsa"], &[]),
            settings(14),
        )
        .unwrap();

        let report = pipeline.run(now()).await;
        assert!(report.results.is_empty());
        assert_eq!(report.outcomes[0].candidates, 1);
        assert_eq!(report.outcomes[0].accepted, 0);
    }

    #[tokio::test]
    async fn test_duplicates_across_sources_collapse_to_first_source() {
        let body = rss(&[("Chamada X", "https://a.gov/1", "2024-05-09T00:00:00Z")]);
        let fetcher = FixtureFetcher::default()
            .with_body(FAPEMA_FEED, &body)
            .with_body(MIRROR_FEED, &body);
        let pipeline = Pipeline::new(
            fetcher,
            registry(
                vec![feed("Zeta", FAPEMA_FEED), feed("Alpha", MIRROR_FEED)],
                &["chamada"],
                &[],
            ),
            settings(14),
        )
        .unwrap();

        let report = pipeline.run(now()).await;
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results.items()[0].source_name, "Zeta");
        assert_eq!(report.accepted_before_rank(), 2);
    }

    #[tokio::test]
    async fn test_failing_sources_do_not_abort_the_run() {
        let fetcher = FixtureFetcher::default()
            .with_status(FAPEMA_FEED, 500)
            .with_body(MIRROR_FEED, "<rss><channel><item><title>x</item></rss>")
            .with_body(
                CAPES_PAGE,
                r#"<a href="/editais/99">Edital de Seleção</a><a href="/sobre">Sobre</a>"#,
            );
        let pipeline = Pipeline::new(
            fetcher,
            registry(
                vec![
                    feed("FAPEMA", FAPEMA_FEED),
                    feed("Mirror", MIRROR_FEED),
                    page("CAPES", CAPES_PAGE),
                ],
                &["edital"],
                &[],
            ),
            settings(14),
        )
        .unwrap();

        let report = pipeline.run(now()).await;
        assert_eq!(report.failures.len(), 2);
        assert!(matches!(report.failures[0], SourceFailure::Fetch(_)));
        assert!(matches!(report.failures[1], SourceFailure::Parse(_)));
        assert_eq!(report.results.len(), 1);
        let item = &report.results.items()[0];
        assert_eq!(item.link, "https://capes.gov.br/editais/99");
        assert_eq!(item.published_at, None);
        assert_eq!(item.extraction_method, ExtractionMethod::Page);
        assert_eq!(
            report.outcomes.iter().map(|o| o.failed).collect::<Vec<_>>(),
            vec![true, true, false]
        );
    }

    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_each_failed_source_warns_once() {
        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));
        let _guard = tracing::subscriber::set_default(subscriber);

        let fetcher = FixtureFetcher::default()
            .with_status(FAPEMA_FEED, 503)
            .with_body(
                MIRROR_FEED,
                &rss(&[("Edital A", "https://a.gov/a", "2024-05-08T00:00:00Z")]),
            );
        let pipeline = Pipeline::new(
            fetcher,
            registry(
                vec![feed("FAPEMA", FAPEMA_FEED), feed("Mirror", MIRROR_FEED)],
                &["edital"],
                &[],
            ),
            settings(14),
        )
        .unwrap();

        let report = pipeline.run(now()).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.results.len(), 1);
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_timestamp_policy_in_classify() {
        let relevance = RelevanceProfile::compile(&["edital"], &[] as &[&str]).unwrap();
        let candidate = |raw: Option<&str>| RawCandidate {
            source_name: "S".to_string(),
            title: "Edital 7".to_string(),
            summary: String::new(),
            link: "https://s.gov/7".to_string(),
            raw_published: raw.map(str::to_string),
        };

        let feed_source = feed("S", FAPEMA_FEED);
        let kept = classify(&feed_source, vec![candidate(Some("não é data"))], &relevance, 14, now());
        assert!(kept.is_empty());

        let page_source = page("S", CAPES_PAGE);
        let kept = classify(&page_source, vec![candidate(None)], &relevance, 14, now());
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_page_matching_uses_link_and_negative_wins() {
        let relevance = RelevanceProfile::compile(&["calls"], &["tender"]).unwrap();
        let source = page("NWO", "https://www.nwo.nl/en");
        let candidates = vec![
            RawCandidate {
                source_name: "NWO".to_string(),
                title: "Read more".to_string(),
                summary: String::new(),
                link: "https://www.nwo.nl/en/calls/open-competition".to_string(),
                raw_published: None,
            },
            RawCandidate {
                source_name: "NWO".to_string(),
                title: "Calls for tender".to_string(),
                summary: String::new(),
                link: "https://www.nwo.nl/en/procurement".to_string(),
                raw_published: None,
            },
        ];
        let kept = classify(&source, candidates, &relevance, 3, now());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "Read more");
    }

    #[test]
    fn test_long_anchor_matches_beyond_title_limit() {
        let relevance = RelevanceProfile::compile(&["consolidator"], &["tender"]).unwrap();
        let source = page("ERC", "https://erc.europa.eu/funding");
        let padding = "Information for applicants ".repeat(10);
        let html = format!(
            r#"<a href="/apply">{padding} Consolidator Grant 2025</a>
               <a href="/procure">{padding} Consolidator tender notice</a>"#
        );
        let candidates = scrapers::page::extract_page("ERC", &source.endpoint, &html);
        assert!(candidates[0].title.chars().count() < padding.len());

        let kept = classify(&source, candidates, &relevance, 3, now());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].link, "https://erc.europa.eu/apply");
        assert!(!kept[0].title.contains("Consolidator"));
    }

    #[test]
    fn test_empty_registry_is_a_configuration_error() {
        let err = Pipeline::new(
            FixtureFetcher::default(),
            registry(vec![], &["x"], &[]),
            settings(14),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::NoSources));
    }

    #[tokio::test]
    async fn test_runs_are_deterministic() {
        let fetcher = || {
            FixtureFetcher::default()
                .with_body(
                    FAPEMA_FEED,
                    &rss(&[
                        ("Edital A", "https://a.gov/a", "2024-05-08T00:00:00Z"),
                        ("Edital B", "https://a.gov/b", "2024-05-08T00:00:00Z"),
                    ]),
                )
                .with_body(
                    MIRROR_FEED,
                    &rss(&[("Edital C", "https://a.gov/c", "Wed, 08 May 2024 00:00:00 GMT")]),
                )
        };
        let sources = vec![feed("FAPEMA", FAPEMA_FEED), feed("Mirror", MIRROR_FEED)];
        let first = Pipeline::new(fetcher(), registry(sources.clone(), &["edital"], &[]), settings(14))
            .unwrap()
            .run(now())
            .await;
        let mut reversed = sources;
        reversed.reverse();
        let second = Pipeline::new(fetcher(), registry(reversed, &["edital"], &[]), settings(14))
            .unwrap()
            .run(now())
            .await;
        assert_eq!(first.results, second.results);
        let titles = first.results.iter().map(|i| i.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["Edital C", "Edital B", "Edital A"]);
    }
}
