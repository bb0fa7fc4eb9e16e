//! Favorites retrieval with a time-bounded cache in front of the network.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::Url;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::FavoritesCache;
use crate::favorites::{parse_favorites, FavoriteEntry};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// 401 or 403: the user is not logged in.
    #[error("authentication required")]
    AuthRequired,
    #[error("favorites request failed with HTTP {0}")]
    Http(u16),
    /// No usable response at all.
    #[error("network error: {0}")]
    Network(String),
}

impl FetchError {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => FetchError::AuthRequired,
            other => FetchError::Http(other),
        }
    }
}

/// A raw answer from the favorites endpoint.
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
}

impl PageResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport for the favorites page.
pub trait FavoritesSource: Send + Sync {
    /// URL relative song links are resolved against.
    fn base_url(&self) -> &Url;

    /// Issue one request.  Only transport failures are errors; any HTTP status
    /// is returned as a response.
    fn fetch_page(&self) -> impl Future<Output = Result<PageResponse, FetchError>> + Send;
}

/// The real favorites endpoint, reached with the user's session cookie.
pub struct HttpSource {
    client: reqwest::Client,
    url: Url,
}

impl HttpSource {
    pub fn new(favorites_url: &str, session_cookie: Option<&str>) -> anyhow::Result<Self> {
        let url = Url::parse(favorites_url)?;

        let mut headers = HeaderMap::new();
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        if let Some(cookie) = session_cookie.filter(|c| !c.is_empty()) {
            let mut value = HeaderValue::from_str(cookie)?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("songpick/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self { client, url })
    }
}

impl FavoritesSource for HttpSource {
    fn base_url(&self) -> &Url {
        &self.url
    }

    async fn fetch_page(&self) -> Result<PageResponse, FetchError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(PageResponse { status, body })
    }
}

pub struct FavoritesFetcher<S> {
    source: S,
    cache: Mutex<FavoritesCache>,
}

impl<S: FavoritesSource> FavoritesFetcher<S> {
    pub fn new(source: S, ttl: Duration) -> Self {
        Self {
            source,
            cache: Mutex::new(FavoritesCache::new(ttl)),
        }
    }

    fn cache(&self) -> MutexGuard<'_, FavoritesCache> {
        // The cache holds no invariant a panicking writer could break halfway.
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current favorites, from the cache while it is fresh, otherwise from
    /// the network.  `force_refresh` discards the cache first.
    pub async fn fetch_favorites(
        &self,
        force_refresh: bool,
    ) -> Result<Vec<FavoriteEntry>, FetchError> {
        if force_refresh {
            self.cache().clear();
            debug!("Favorites cache invalidated by forced refresh");
        } else {
            let now = Instant::now();
            let cache = self.cache();
            if let Some(entries) = cache.fresh_entries(now) {
                debug!(
                    "Using cached favorites, age: {}s",
                    cache.age(now).unwrap_or_default().as_secs()
                );
                return Ok(entries.to_vec());
            }
        }

        debug!("Fetching fresh favorites from {}", self.source.base_url());
        let page = self.source.fetch_page().await?;
        if !page.is_success() {
            return Err(FetchError::from_status(page.status));
        }

        let entries = parse_favorites(&page.body, self.source.base_url());
        self.cache().store(entries.clone(), Instant::now());
        debug!("Cached {} favorites", entries.len());

        Ok(entries)
    }

    pub fn clear_cache(&self) {
        self.cache().clear();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays canned responses and counts requests.
    pub(crate) struct ScriptedSource {
        url: Url,
        responses: Mutex<VecDeque<Result<PageResponse, FetchError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        pub(crate) fn new() -> Self {
            Self {
                url: Url::parse("https://www.songsterr.com/a/wa/favorites").unwrap(),
                responses: Mutex::new(VecDeque::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn respond(self, status: u16, body: impl Into<String>) -> Self {
            self.responses.lock().unwrap().push_back(Ok(PageResponse {
                status,
                body: body.into(),
            }));
            self
        }

        pub(crate) fn songs(self, hrefs: &[&str]) -> Self {
            self.respond(200, song_page(hrefs))
        }

        pub(crate) fn fail(self) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(FetchError::Network("connection refused".to_string())));
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl FavoritesSource for ScriptedSource {
        fn base_url(&self) -> &Url {
            &self.url
        }

        async fn fetch_page(&self) -> Result<PageResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Give other callers a chance to run mid-request.
            tokio::task::yield_now().await;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Network("no scripted response".to_string())))
        }
    }

    impl FavoritesFetcher<ScriptedSource> {
        pub(crate) fn source_calls(&self) -> usize {
            self.source.calls()
        }

        fn has_cached(&self) -> bool {
            !self.cache().is_empty()
        }
    }

    pub(crate) fn song_page(hrefs: &[&str]) -> String {
        let links: String = hrefs
            .iter()
            .enumerate()
            .map(|(i, h)| format!(r#"<a data-song="{i}" href="{h}">song {i}</a>"#))
            .collect();
        format!("<html><body>{links}</body></html>")
    }

    fn hrefs(entries: &[FavoriteEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.href.as_str()).collect()
    }

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn status_classification() {
        assert_eq!(FetchError::from_status(401), FetchError::AuthRequired);
        assert_eq!(FetchError::from_status(403), FetchError::AuthRequired);
        assert_eq!(FetchError::from_status(404), FetchError::Http(404));
        assert_eq!(FetchError::from_status(500), FetchError::Http(500));
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_cache_skips_network() {
        let source = ScriptedSource::new().songs(&["/a", "/b"]).songs(&["/c"]);
        let fetcher = FavoritesFetcher::new(source, TTL);

        let first = fetcher.fetch_favorites(false).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        let second = fetcher.fetch_favorites(false).await.unwrap();

        assert_eq!(fetcher.source.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(
            hrefs(&second),
            vec!["https://www.songsterr.com/a", "https://www.songsterr.com/b"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_cache_refetches() {
        let source = ScriptedSource::new().songs(&["/a"]).songs(&["/c"]);
        let fetcher = FavoritesFetcher::new(source, TTL);

        fetcher.fetch_favorites(false).await.unwrap();
        tokio::time::advance(TTL).await;
        let second = fetcher.fetch_favorites(false).await.unwrap();

        assert_eq!(fetcher.source.calls(), 2);
        assert_eq!(hrefs(&second), vec!["https://www.songsterr.com/c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn forced_refresh_always_fetches_and_discards_cache() {
        let source = ScriptedSource::new().songs(&["/a"]).fail();
        let fetcher = FavoritesFetcher::new(source, TTL);

        fetcher.fetch_favorites(false).await.unwrap();
        assert!(fetcher.has_cached());

        let err = fetcher.fetch_favorites(true).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
        assert_eq!(fetcher.source.calls(), 2);
        // The old list was dropped before the failed request.
        assert!(!fetcher.has_cached());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_result_is_cached() {
        let source = ScriptedSource::new().respond(200, "<html></html>");
        let fetcher = FavoritesFetcher::new(source, TTL);

        assert!(fetcher.fetch_favorites(false).await.unwrap().is_empty());
        assert!(fetcher.fetch_favorites(false).await.unwrap().is_empty());
        assert_eq!(fetcher.source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn error_statuses_are_classified_and_not_cached() {
        let source = ScriptedSource::new()
            .respond(403, "forbidden")
            .respond(502, "bad gateway")
            .songs(&["/a"]);
        let fetcher = FavoritesFetcher::new(source, TTL);

        assert_eq!(
            fetcher.fetch_favorites(false).await.unwrap_err(),
            FetchError::AuthRequired
        );
        assert_eq!(
            fetcher.fetch_favorites(false).await.unwrap_err(),
            FetchError::Http(502)
        );
        assert!(!fetcher.has_cached());
        assert_eq!(fetcher.fetch_favorites(false).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cache_forces_next_fetch() {
        let source = ScriptedSource::new().songs(&["/a"]).songs(&["/b"]);
        let fetcher = FavoritesFetcher::new(source, TTL);

        fetcher.fetch_favorites(false).await.unwrap();
        fetcher.clear_cache();
        let second = fetcher.fetch_favorites(false).await.unwrap();
        assert_eq!(fetcher.source.calls(), 2);
        assert_eq!(hrefs(&second), vec!["https://www.songsterr.com/b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_fetches_leave_one_complete_list() {
        let source = ScriptedSource::new().songs(&["/a", "/b"]).songs(&["/c"]);
        let fetcher = FavoritesFetcher::new(source, TTL);

        // Both miss the empty cache and are in flight together.
        let (first, second) = tokio::join!(
            fetcher.fetch_favorites(false),
            fetcher.fetch_favorites(false)
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(fetcher.source.calls(), 2);
        assert_eq!(first.len(), 2);
        assert_eq!(hrefs(&second), vec!["https://www.songsterr.com/c"]);

        // Last writer wins, whole list and timestamp together.
        let now = Instant::now();
        let cache = fetcher.cache();
        assert_eq!(cache.fresh_entries(now), Some(second.as_slice()));
        assert_eq!(cache.age(now), Some(Duration::ZERO));
        drop(cache);

        assert_eq!(fetcher.fetch_favorites(false).await.unwrap(), second);
        assert_eq!(fetcher.source.calls(), 2);
    }

    #[test]
    fn http_source_rejects_bad_url() {
        assert!(HttpSource::new("not a url", None).is_err());
        assert!(HttpSource::new("https://www.songsterr.com/a/wa/favorites", Some("sid=1")).is_ok());
    }
}
