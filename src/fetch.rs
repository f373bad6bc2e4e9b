use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::config::HarvestConfig;
use crate::error::FetchError;
use crate::models::{DocumentId, RawDocument};
use crate::store::DocumentCache;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// How a `fetch` call was satisfied.
#[derive(Debug)]
pub enum FetchOutcome {
    Cached(RawDocument),
    Downloaded(RawDocument),
    /// The host answered, but never with a 2xx.
    NotAvailable { status: u16 },
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub politeness_delay: Duration,
}

impl From<&HarvestConfig> for FetchSettings {
    fn from(cfg: &HarvestConfig) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            user_agent: cfg.user_agent.clone(),
            timeout: cfg.request_timeout(),
            max_retries: cfg.max_retries,
            backoff_base_ms: cfg.backoff_base_ms,
            politeness_delay: cfg.politeness_delay(),
        }
    }
}

/// HTTP client in front of the document cache.
pub struct Fetcher {
    client: Client,
    cache: Arc<dyn DocumentCache>,
    settings: FetchSettings,
}

/// Result of one GET, after retries.
enum Attempted {
    Body(String),
    Status(u16),
}

impl Fetcher {
    pub fn new(settings: FetchSettings, cache: Arc<dyn DocumentCache>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            client,
            cache,
            settings,
        })
    }

    /// Canonical article page for an ID.
    pub fn canonical_url(&self, id: &DocumentId) -> String {
        format!("{}/articles/{}/", self.settings.base_url.trim_end_matches('/'), id)
    }

    /// Resolve a caller-supplied link against the base URL, or fall back to the canonical one.
    pub fn resolve_url(&self, id: &DocumentId, source_url: Option<&str>) -> Result<String, FetchError> {
        let candidate = source_url.map(str::trim).filter(|u| !u.is_empty());
        let Some(raw) = candidate else {
            return Ok(self.canonical_url(id));
        };
        if let Some(rest) = raw.strip_prefix("//") {
            return Ok(format!("https://{}", rest));
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(raw.to_string());
        }
        let invalid = |reason: String| FetchError::InvalidUrl {
            url: raw.to_string(),
            reason,
        };
        let base = Url::parse(&format!("{}/", self.settings.base_url.trim_end_matches('/')))
            .map_err(|e| invalid(e.to_string()))?;
        base.join(raw.trim_start_matches('/'))
            .map(String::from)
            .map_err(|e| invalid(e.to_string()))
    }

    /// Return the cached document, or download and cache it.
    pub async fn fetch(
        &self,
        id: &DocumentId,
        force: bool,
        source_url: Option<&str>,
    ) -> Result<FetchOutcome, FetchError> {
        if !force {
            if let Some(html) = self.cache.load(id).map_err(|e| cache_err(id, e))? {
                debug!(pmcid = %id, "using cached HTML");
                return Ok(FetchOutcome::Cached(RawDocument {
                    id: id.clone(),
                    html,
                }));
            }
        }

        let url = self.resolve_url(id, source_url)?;
        debug!(pmcid = %id, url = %url, "fetching HTML");
        match self.get_with_retry(id, &url).await? {
            Attempted::Body(html) => {
                self.cache.store(id, &html).map_err(|e| cache_err(id, e))?;
                Ok(FetchOutcome::Downloaded(RawDocument {
                    id: id.clone(),
                    html,
                }))
            }
            Attempted::Status(status) => Ok(FetchOutcome::NotAvailable { status }),
        }
    }

    async fn get_with_retry(&self, id: &DocumentId, url: &str) -> Result<Attempted, FetchError> {
        let max_retries = self.settings.max_retries;
        let mut attempt = 0u32;
        loop {
            let start = Instant::now();
            let result = self.get_once(url).await;
            self.pace().await;

            let retry_reason = match result {
                Ok(Attempted::Status(status)) if is_transient(status) && attempt < max_retries => {
                    format!("HTTP {}", status)
                }
                Ok(outcome) => {
                    debug!(
                        pmcid = %id,
                        attempt = attempt + 1,
                        latency_ms = start.elapsed().as_millis() as u64,
                        "request finished"
                    );
                    return Ok(outcome);
                }
                Err(e) if attempt < max_retries && is_transient_error(&e) => e.to_string(),
                Err(source) => {
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        attempts: attempt + 1,
                        source,
                    })
                }
            };

            let backoff = self.backoff(attempt);
            warn!(
                pmcid = %id,
                "{} (attempt {}/{}), backing off {:.1}s",
                retry_reason,
                attempt + 1,
                max_retries,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    async fn get_once(&self, url: &str) -> Result<Attempted, reqwest::Error> {
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, &self.settings.user_agent)
            .header(ACCEPT, ACCEPT_HTML)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Ok(Attempted::Status(status.as_u16()));
        }
        Ok(Attempted::Body(resp.text().await?))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.settings.backoff_base_ms.saturating_mul(2u64.saturating_pow(attempt)))
    }

    async fn pace(&self) {
        if !self.settings.politeness_delay.is_zero() {
            tokio::time::sleep(self.settings.politeness_delay).await;
        }
    }
}

fn is_transient(status: u16) -> bool {
    matches!(
        StatusCode::from_u16(status),
        Ok(StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT)
    )
}

/// Connection, timeout and mid-body failures; a bad URL or redirect loop will not heal on retry.
fn is_transient_error(e: &reqwest::Error) -> bool {
    if e.is_builder() || e.is_redirect() || e.is_decode() {
        return false;
    }
    e.is_connect() || e.is_timeout() || e.is_request() || e.is_body()
}

fn cache_err(id: &DocumentId, source: std::io::Error) -> FetchError {
    FetchError::Cache {
        id: id.to_string(),
        source,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// In-memory cache that counts writes.
    #[derive(Default)]
    pub(crate) struct CountingCache {
        docs: Mutex<HashMap<DocumentId, String>>,
        pub writes: AtomicUsize,
    }

    impl DocumentCache for CountingCache {
        fn load(&self, id: &DocumentId) -> io::Result<Option<String>> {
            Ok(self.docs.lock().unwrap().get(id).cloned())
        }

        fn store(&self, id: &DocumentId, html: &str) -> io::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.docs.lock().unwrap().insert(id.clone(), html.to_string());
            Ok(())
        }
    }

    pub(crate) fn test_settings(base_url: &str) -> FetchSettings {
        FetchSettings {
            base_url: base_url.to_string(),
            user_agent: "harvester-tests/1.0".into(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff_base_ms: 1,
            politeness_delay: Duration::ZERO,
        }
    }

    fn id(s: &str) -> DocumentId {
        DocumentId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn retries_transient_status_then_caches_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/articles/PMC100/"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(3)
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/articles/PMC100/"))
            .and(header("user-agent", "harvester-tests/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(CountingCache::default());
        let fetcher = Fetcher::new(test_settings(&server.uri()), cache.clone()).unwrap();
        let outcome = fetcher.fetch(&id("PMC100"), false, None).await.unwrap();

        assert!(matches!(outcome, FetchOutcome::Downloaded(ref d) if d.html == "<html>ok</html>"));
        assert_eq!(cache.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_hit_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let cache = Arc::new(CountingCache::default());
        cache.store(&id("PMC7"), "<p>cached</p>").unwrap();
        let fetcher = Fetcher::new(test_settings(&server.uri()), cache.clone()).unwrap();

        let outcome = fetcher.fetch(&id("PMC7"), false, None).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Cached(ref d) if d.html == "<p>cached</p>"));
    }

    #[tokio::test]
    async fn force_bypasses_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/articles/PMC7/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>fresh</p>"))
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(CountingCache::default());
        cache.store(&id("PMC7"), "<p>stale</p>").unwrap();
        let fetcher = Fetcher::new(test_settings(&server.uri()), cache.clone()).unwrap();

        fetcher.fetch(&id("PMC7"), true, None).await.unwrap();
        assert_eq!(cache.load(&id("PMC7")).unwrap().as_deref(), Some("<p>fresh</p>"));
    }

    #[tokio::test]
    async fn permanent_status_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(CountingCache::default());
        let fetcher = Fetcher::new(test_settings(&server.uri()), cache.clone()).unwrap();
        let outcome = fetcher.fetch(&id("PMC9"), false, None).await.unwrap();

        assert!(matches!(outcome, FetchOutcome::NotAvailable { status: 404 }));
        assert_eq!(cache.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transient_status_gives_up_at_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(4)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(test_settings(&server.uri()), Arc::new(CountingCache::default())).unwrap();
        let outcome = fetcher.fetch(&id("PMC9"), false, None).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::NotAvailable { status: 429 }));
    }

    #[tokio::test]
    async fn malformed_url_fails_on_first_attempt() {
        let fetcher = Fetcher::new(
            test_settings("https://pmc.ncbi.nlm.nih.gov"),
            Arc::new(CountingCache::default()),
        )
        .unwrap();
        let err = fetcher
            .fetch(&id("PMC1"), false, Some("http://exa mple.com/x"))
            .await
            .unwrap_err();
        match err {
            FetchError::Transport { attempts, ref source, .. } => {
                assert!(source.is_builder());
                assert_eq!(attempts, 1);
            }
            other => panic!("expected a transport error, got {other}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_retried() {
        let mut settings = test_settings("http://127.0.0.1:9");
        settings.max_retries = 1;
        let fetcher = Fetcher::new(settings, Arc::new(CountingCache::default())).unwrap();
        match fetcher.fetch(&id("PMC2"), false, None).await.unwrap_err() {
            FetchError::Transport { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected a transport error, got {other}"),
        }
    }

    #[test]
    fn source_url_normalization() {
        let fetcher = Fetcher::new(
            test_settings("https://pmc.ncbi.nlm.nih.gov"),
            Arc::new(CountingCache::default()),
        )
        .unwrap();
        let pmc = id("PMC5");
        assert_eq!(
            fetcher.resolve_url(&pmc, None).unwrap(),
            "https://pmc.ncbi.nlm.nih.gov/articles/PMC5/"
        );
        assert_eq!(
            fetcher.resolve_url(&pmc, Some("//example.org/a/PMC5")).unwrap(),
            "https://example.org/a/PMC5"
        );
        assert_eq!(
            fetcher.resolve_url(&pmc, Some("http://example.org/x")).unwrap(),
            "http://example.org/x"
        );
        assert_eq!(
            fetcher.resolve_url(&pmc, Some("/articles/PMC5/")).unwrap(),
            "https://pmc.ncbi.nlm.nih.gov/articles/PMC5/"
        );
        assert_eq!(
            fetcher.resolve_url(&pmc, Some("   ")).unwrap(),
            "https://pmc.ncbi.nlm.nih.gov/articles/PMC5/"
        );
    }
}
