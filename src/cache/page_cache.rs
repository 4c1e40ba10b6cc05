//! Render once, cache, and personalize on serve.
//!
//! A page is rendered under the placeholder viewer, stored under its
//! [`PageKey`], and handed to every later viewer with the placeholder token
//! replaced by that viewer's email. The cached text never holds a real email.
//!
//! Key lifecycle: `Uncached -> Cached` when a render succeeds,
//! `Cached -> Uncached` on TTL expiry or [`PersonalizedPageCache::invalidate`].
//! A failed render leaves the key `Uncached`.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tracing::{debug, info, instrument, warn};

use super::backend::{CacheBackend, DisabledBackend};
use super::config::CacheConfig;
use super::identity::{self, Viewer};
use super::keys::PageKey;
use super::personalize::personalize;
use super::single_flight::SingleFlight;
use super::store::MemoryBackend;

pub(crate) const METRIC_PAGE_CACHE_HIT_TOTAL: &str = "coursepages_page_cache_hit_total";
pub(crate) const METRIC_PAGE_CACHE_MISS_TOTAL: &str = "coursepages_page_cache_miss_total";
pub(crate) const METRIC_PAGE_RENDER_FAILURE_TOTAL: &str = "coursepages_page_render_failure_total";
pub(crate) const METRIC_PAGE_CACHE_BACKEND_ERROR_TOTAL: &str =
    "coursepages_page_cache_backend_error_total";
pub(crate) const METRIC_PAGE_RENDER_MS: &str = "coursepages_page_render_ms";

const TARGET: &str = "coursepages::cache";

/// Page HTML as rendered under the placeholder viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage(String);

impl RenderedPage {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RenderedPage {
    fn from(html: String) -> Self {
        Self(html)
    }
}

#[derive(Clone)]
pub struct PersonalizedPageCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    flights: Option<SingleFlight>,
}

impl PersonalizedPageCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        Self {
            backend,
            ttl: config.ttl(),
            flights: config.single_flight.then(SingleFlight::new),
        }
    }

    /// Build a cache over the in-memory backend, or over the disabled backend
    /// when caching is switched off.
    pub fn from_config(config: &CacheConfig) -> Self {
        let backend: Arc<dyn CacheBackend> = if config.enabled {
            Arc::new(MemoryBackend::new(config))
        } else {
            Arc::new(DisabledBackend)
        };
        Self::new(backend, config)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached page for `key`, rendering and storing it on a miss.
    ///
    /// `render` runs at most once per call and only on a miss. Its error is
    /// returned as is and nothing is stored. Backend failures are logged and
    /// read as a miss.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn get_or_render<F, Fut, E>(&self, key: &PageKey, render: F) -> Result<RenderedPage, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
        E: Display,
    {
        if let Some(html) = self.fetch(key).await {
            counter!(METRIC_PAGE_CACHE_HIT_TOTAL).increment(1);
            debug!(target = TARGET, outcome = "hit", "serving cached page");
            return Ok(RenderedPage(html));
        }

        let _flight = match &self.flights {
            Some(flights) => {
                let guard = flights.acquire(key.as_str()).await;
                // Another request may have rendered while we waited.
                if let Some(html) = self.fetch(key).await {
                    counter!(METRIC_PAGE_CACHE_HIT_TOTAL).increment(1);
                    debug!(target = TARGET, outcome = "coalesced", "serving page rendered by peer");
                    return Ok(RenderedPage(html));
                }
                Some(guard)
            }
            None => None,
        };

        counter!(METRIC_PAGE_CACHE_MISS_TOTAL).increment(1);
        info!(target = TARGET, outcome = "miss", "rendering page");

        let started = Instant::now();
        let html = match render().await {
            Ok(html) => html,
            Err(err) => {
                counter!(METRIC_PAGE_RENDER_FAILURE_TOTAL).increment(1);
                warn!(target = TARGET, error = %err, "page render failed; nothing cached");
                return Err(err);
            }
        };
        histogram!(METRIC_PAGE_RENDER_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        if let Err(err) = self.backend.set(key.as_str(), html.clone(), self.ttl).await {
            counter!(METRIC_PAGE_CACHE_BACKEND_ERROR_TOTAL).increment(1);
            warn!(target = TARGET, op = "set", error = %err, "page cache write skipped");
        }

        Ok(RenderedPage(html))
    }

    /// Run `render` as the placeholder viewer.
    ///
    /// The viewer `render` receives is also the one [`identity::current_viewer`]
    /// reports for the duration of the call; afterwards the caller's viewer is
    /// back in place whether `render` succeeded or not. A signed-in viewer is
    /// replaced by the placeholder, an anonymous one stays anonymous.
    pub async fn render_with_placeholder_identity<F, Fut, E>(render: F) -> Result<String, E>
    where
        F: FnOnce(Viewer) -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        identity::with_placeholder_identity(async move {
            let viewer = identity::current_viewer();
            render(viewer).await
        })
        .await
    }

    /// Serve `key` to `viewer`: cached or freshly rendered under the
    /// placeholder, then personalized with the viewer's email.
    ///
    /// Anonymous and signed-in viewers render differently, so callers must not
    /// share one key between them.
    pub async fn serve<F, Fut, E>(&self, key: &PageKey, viewer: &Viewer, render: F) -> Result<String, E>
    where
        F: FnOnce(Viewer) -> Fut,
        Fut: Future<Output = Result<String, E>>,
        E: Display,
    {
        let page = identity::with_viewer(
            viewer.clone(),
            self.get_or_render(key, || Self::render_with_placeholder_identity(render)),
        )
        .await?;
        Ok(personalize(page.as_str(), viewer.email()))
    }

    /// Drop the cached page for `key` so the next request renders it again.
    pub async fn invalidate(&self, key: &PageKey) {
        match self.backend.delete(key.as_str()).await {
            Ok(()) => debug!(target = TARGET, key = %key, "page invalidated"),
            Err(err) => {
                counter!(METRIC_PAGE_CACHE_BACKEND_ERROR_TOTAL).increment(1);
                warn!(target = TARGET, key = %key, op = "delete", error = %err, "page invalidation skipped");
            }
        }
    }

    async fn fetch(&self, key: &PageKey) -> Option<String> {
        match self.backend.get(key.as_str()).await {
            Ok(value) => value,
            Err(err) => {
                counter!(METRIC_PAGE_CACHE_BACKEND_ERROR_TOTAL).increment(1);
                warn!(target = TARGET, op = "get", error = %err, "page cache read failed; rendering");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::cache::backend::CacheError;
    use crate::cache::personalize::{EMAIL_PLACEHOLDER, placeholder_count};

    struct FailingBackend;

    #[async_trait]
    impl CacheBackend for FailingBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }
    }

    fn memory_cache() -> (PersonalizedPageCache, Arc<MemoryBackend>) {
        let config = CacheConfig::default();
        let backend = Arc::new(MemoryBackend::new(&config));
        let cache = PersonalizedPageCache::new(backend.clone(), &config);
        (cache, backend)
    }

    fn counting_render(
        calls: &AtomicUsize,
        html: &'static str,
    ) -> impl Future<Output = Result<String, String>> {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { Ok(html.to_string()) }
    }

    #[tokio::test]
    async fn renders_once_for_repeated_requests() {
        let (cache, _) = memory_cache();
        let key = PageKey::course();
        let calls = AtomicUsize::new(0);

        let mut pages = Vec::new();
        for _ in 0..5 {
            let page = cache
                .get_or_render(&key, || counting_render(&calls, "<p>course</p>"))
                .await
                .expect("render");
            pages.push(page);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(pages.iter().all(|page| page.as_str() == "<p>course</p>"));
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let (cache, backend) = memory_cache();
        let key = PageKey::forum();
        let calls = AtomicUsize::new(0);

        assert_eq!(backend.get(key.as_str()).await, Ok(None));
        cache
            .get_or_render(&key, || counting_render(&calls, "forum"))
            .await
            .expect("first render");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.get(key.as_str()).await, Ok(Some("forum".to_string())));

        cache
            .get_or_render(&key, || counting_render(&calls, "forum"))
            .await
            .expect("second call");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_render_is_not_cached() {
        let (cache, backend) = memory_cache();
        let key = PageKey::lesson(2, 1);
        let calls = AtomicUsize::new(0);

        let result = cache
            .get_or_render(&key, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<String, _>("datastore timeout".to_string()) }
            })
            .await;
        assert_eq!(result, Err("datastore timeout".to_string()));
        assert_eq!(backend.get(key.as_str()).await, Ok(None));

        let page = cache
            .get_or_render(&key, || counting_render(&calls, "lesson"))
            .await
            .expect("retry renders");
        assert_eq!(page.as_str(), "lesson");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unavailable_backend_always_renders() {
        let cache = PersonalizedPageCache::new(Arc::new(FailingBackend), &CacheConfig::default());
        let key = PageKey::course();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let page = cache
                .get_or_render(&key, || counting_render(&calls, "course"))
                .await
                .expect("render despite backend failure");
            assert_eq!(page.as_str(), "course");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        cache.invalidate(&key).await;
    }

    #[tokio::test]
    async fn disabled_cache_renders_every_time() {
        let cache = PersonalizedPageCache::from_config(&CacheConfig {
            enabled: false,
            ..Default::default()
        });
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            cache
                .get_or_render(&PageKey::forum(), || counting_render(&calls, "forum"))
                .await
                .expect("render");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_render() {
        let (cache, _) = memory_cache();
        let key = PageKey::assessment("Pre");
        let calls = AtomicUsize::new(0);

        cache
            .get_or_render(&key, || counting_render(&calls, "v1"))
            .await
            .expect("render");
        cache.invalidate(&key).await;
        let page = cache
            .get_or_render(&key, || counting_render(&calls, "v2"))
            .await
            .expect("render after invalidation");

        assert_eq!(page.as_str(), "v2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn placeholder_identity_is_scoped_to_the_render() {
        let real = Viewer::Email("s@example.com".to_string());
        identity::with_viewer(real.clone(), async {
            assert_eq!(identity::current_viewer(), real);

            let html = PersonalizedPageCache::render_with_placeholder_identity(|viewer| async move {
                assert!(viewer.is_placeholder());
                assert!(identity::current_viewer().is_placeholder());
                Ok::<_, String>(format!("Hello {}", viewer.email().unwrap_or_default()))
            })
            .await
            .expect("render");
            assert_eq!(html, format!("Hello {EMAIL_PLACEHOLDER}"));
            assert_eq!(identity::current_viewer(), real);

            let failed = PersonalizedPageCache::render_with_placeholder_identity(|_| async {
                Err::<String, _>("boom")
            })
            .await;
            assert_eq!(failed, Err("boom"));
            assert_eq!(identity::current_viewer(), real);
        })
        .await;
    }

    #[tokio::test]
    async fn viewers_share_one_template_without_leakage() {
        let (cache, backend) = memory_cache();
        let key = PageKey::lesson(1, 1);
        let render = |viewer: Viewer| async move {
            Ok::<_, String>(format!(
                "<nav>{}</nav><p>Lesson 1</p>",
                viewer.email().unwrap_or_default()
            ))
        };

        let a = Viewer::Email("a@x.com".to_string());
        let b = Viewer::Email("b@x.com".to_string());

        let for_a = cache.serve(&key, &a, render).await.expect("serve a");
        let cached_after_a = backend.get(key.as_str()).await.expect("get").expect("cached");
        let for_b = cache.serve(&key, &b, render).await.expect("serve b");
        let cached_after_b = backend.get(key.as_str()).await.expect("get").expect("cached");

        assert_eq!(for_a, "<nav>a@x.com</nav><p>Lesson 1</p>");
        assert_eq!(for_b, "<nav>b@x.com</nav><p>Lesson 1</p>");
        assert_eq!(cached_after_a, cached_after_b);
        assert_eq!(placeholder_count(&cached_after_a), 1);
        assert!(!cached_after_a.contains("a@x.com"));
    }

    #[tokio::test]
    async fn lesson_page_scenario() {
        let (cache, _) = memory_cache();
        let key = PageKey::new("lesson11_page").expect("key");
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_render(&key, || counting_render(&calls, "Hello {{ email }}, welcome."))
            .await
            .expect("first");
        assert_eq!(personalize(first.as_str(), None), "Hello {{ email }}, welcome.");

        let second = cache
            .get_or_render(&key, || counting_render(&calls, "unused"))
            .await
            .expect("second");
        assert_eq!(
            personalize(second.as_str(), Some("s@example.com")),
            "Hello s@example.com, welcome."
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_render_once_with_single_flight() {
        let (cache, _) = memory_cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .get_or_render(&PageKey::course(), || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, String>("course".to_string())
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            let page = task.await.expect("join").expect("render");
            assert_eq!(page.as_str(), "course");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn largest_ttl_still_serves_from_cache() {
        let cache = PersonalizedPageCache::from_config(&CacheConfig {
            ttl_seconds: u64::MAX,
            ..Default::default()
        });
        let key = PageKey::course();
        let viewer = Viewer::Email("ada@example.org".to_string());
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let html = cache
                .serve(&key, &viewer, |viewer: Viewer| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        Ok::<_, String>(format!("<p>{}</p>", viewer.email().unwrap_or_default()))
                    }
                })
                .await
                .expect("serve");
            assert_eq!(html, "<p>ada@example.org</p>");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
