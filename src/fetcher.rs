//! HTTP fetching of source bodies with per-source failure isolation.
//!
//! # Architecture
//!
//! - [`FetchAsync`]: Core trait: one source in, one body (or [`FetchError`]) out
//! - [`HttpFetcher`]: `reqwest` implementation with a bounded timeout and an
//!   identifying User-Agent
//! - [`RetryFetch`]: Decorator that adds exponential backoff to any fetcher
//!
//! # Retry Strategy
//!
//! - Retries are opt-in (`--retries`, default 0) so a run stays bounded by
//!   `timeout × ceil(sources / concurrency)`
//! - Exponential backoff starting at `base_delay`
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::error::{FetchError, FetchErrorKind};
use crate::models::Source;
use rand::{Rng, rng};
use reqwest::Client;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

/// User-Agent sent with every request. Several agency sites reject the
/// default `reqwest` agent outright.
pub const USER_AGENT: &str = concat!("Mozilla/5.0 EditaisWatch/", env!("CARGO_PKG_VERSION"));

/// Trait for retrieving the raw body of one source.
pub trait FetchAsync {
    /// Fetch `source.endpoint` and return its body on a 2xx, non-empty response.
    async fn fetch(&self, source: &Source) -> Result<String, FetchError>;
}

/// `reqwest`-backed fetcher shared by every worker of a run.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a client with the given per-request timeout.
    pub fn new(timeout: StdDuration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Wrap a pre-configured client (custom proxy or TLS settings).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl FetchAsync for HttpFetcher {
    #[instrument(level = "info", skip_all, fields(source = %source.name, url = %source.endpoint))]
    async fn fetch(&self, source: &Source) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let response = self
            .client
            .get(source.endpoint.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&source.name, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                &source.name,
                FetchErrorKind::Status(status.as_u16()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(&source.name, &e))?;
        if body.trim().is_empty() {
            return Err(FetchError::new(&source.name, FetchErrorKind::EmptyBody));
        }

        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched source"
        );
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`FetchAsync`] implementation.
///
/// # Backoff Strategy
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    /// The underlying fetcher to wrap.
    inner: T,
    /// Maximum number of retry attempts before giving up.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: FetchAsync,
{
    /// Create a new retry wrapper around an existing [`FetchAsync`] implementation.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let http = HttpFetcher::new(Duration::from_secs(25))?;
    /// let fetcher = RetryFetch::new(http, 2, Duration::from_secs(1));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> FetchAsync for RetryFetch<T>
where
    T: FetchAsync,
{
    async fn fetch(&self, source: &Source) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch(source).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        if self.max_retries > 0 {
                            warn!(
                                source = %source.name,
                                attempt,
                                elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                                error = %e,
                                "fetch() exhausted retries"
                            );
                        }
                        return Err(e);
                    }

                    let exponent = u32::try_from(attempt - 1).unwrap_or(u32::MAX);
                    let mut delay = self.base_delay.saturating_mul(2u32.saturating_pow(exponent));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        source = %source.name,
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "fetch() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! In-memory fetchers for pipeline tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves canned bodies keyed by endpoint URL; unknown endpoints fail with 404.
    #[derive(Debug, Default)]
    pub struct FixtureFetcher {
        bodies: HashMap<String, Result<String, u16>>,
        pub calls: AtomicUsize,
    }

    impl FixtureFetcher {
        pub fn with_body(mut self, url: &str, body: &str) -> Self {
            self.bodies.insert(url.to_string(), Ok(body.to_string()));
            self
        }

        pub fn with_status(mut self, url: &str, status: u16) -> Self {
            self.bodies.insert(url.to_string(), Err(status));
            self
        }
    }

    impl FetchAsync for FixtureFetcher {
        async fn fetch(&self, source: &Source) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.bodies.get(source.endpoint.as_str()) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(FetchError::new(
                    &source.name,
                    FetchErrorKind::Status(*status),
                )),
                None => Err(FetchError::new(&source.name, FetchErrorKind::Status(404))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::FixtureFetcher;
    use super::*;
    use std::sync::atomic::Ordering;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use url::Url;

    /// Serve exactly one canned HTTP response on an ephemeral port.
    async fn serve_once(response: &'static str) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        Url::parse(&format!("http://{addr}/feed")).unwrap()
    }

    fn local_fetcher() -> HttpFetcher {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(StdDuration::from_secs(5))
            .no_proxy()
            .build()
            .unwrap();
        HttpFetcher::with_client(client)
    }

    #[tokio::test]
    async fn test_http_fetcher_returns_body_on_success() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nContent-Length: 7\r\nConnection: close\r\n\r\n<rss/>\n",
        )
        .await;
        let fetcher = local_fetcher();
        let body = fetcher.fetch(&Source::feed("local", url)).await.unwrap();
        assert_eq!(body, "<rss/>\n");
    }

    #[tokio::test]
    async fn test_http_fetcher_maps_non_success_status() {
        let url = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\nbusy",
        )
        .await;
        let fetcher = local_fetcher();
        let err = fetcher.fetch(&Source::page("local", url)).await.unwrap_err();
        assert_eq!(err.source_name, "local");
        assert!(matches!(err.kind, FetchErrorKind::Status(503)));
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_empty_body() {
        let url = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let fetcher = local_fetcher();
        let err = fetcher.fetch(&Source::page("local", url)).await.unwrap_err();
        assert!(matches!(err.kind, FetchErrorKind::EmptyBody));
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let fixture = FixtureFetcher::default();
        let retry = RetryFetch::new(fixture, 2, StdDuration::from_millis(1));
        let source = Source::feed("missing", Url::parse("https://nowhere.example/feed").unwrap());
        let err = retry.fetch(&source).await.unwrap_err();
        assert!(matches!(err.kind, FetchErrorKind::Status(404)));
        assert_eq!(retry.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_backoff_saturates_on_many_attempts() {
        let fixture = FixtureFetcher::default();
        let retry = RetryFetch::new(fixture, 33, StdDuration::ZERO);
        let source = Source::feed("missing", Url::parse("https://nowhere.example/feed").unwrap());
        let err = retry.fetch(&source).await.unwrap_err();
        assert!(matches!(err.kind, FetchErrorKind::Status(404)));
        assert_eq!(retry.inner.calls.load(Ordering::SeqCst), 34);
    }

    #[tokio::test]
    async fn test_retry_passes_through_success() {
        let fixture = FixtureFetcher::default().with_body("https://ok.example/feed", "<rss/>");
        let retry = RetryFetch::new(fixture, 3, StdDuration::from_millis(1));
        let source = Source::feed("ok", Url::parse("https://ok.example/feed").unwrap());
        assert_eq!(retry.fetch(&source).await.unwrap(), "<rss/>");
        assert_eq!(retry.inner.calls.load(Ordering::SeqCst), 1);
    }
}
