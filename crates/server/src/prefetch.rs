//! One-hop background prefetching of newly seen links.
//!
//! After each page is served its link set is compared with the previous
//! page's. When they differ, every distinct new link that points back at the
//! proxy is fetched into the cache on a supervised task. The first page only
//! seeds the comparison. Prefetched pages are never parsed for further links.
//!
//! Link extraction itself runs on the tracker too, so the page that triggered
//! it is already on its way to the browser when the first fetch is spawned.

use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use wikisearch_client::{ContentStore, FetchPolicy, LinkSet, Outbound, SessionConfig, prefetch_path};

#[derive(Clone)]
pub struct Prefetcher {
    store: ContentStore,
    previous: Arc<Mutex<Option<LinkSet>>>,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    local_base: String,
    enabled: bool,
}

impl Prefetcher {
    pub fn new(store: ContentStore, session: &SessionConfig) -> Self {
        Self {
            store,
            previous: Arc::new(Mutex::new(None)),
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(session.prefetch_concurrency.max(1))),
            cancel: CancellationToken::new(),
            local_base: session.local_base(),
            enabled: session.prefetch_enabled(),
        }
    }

    /// Record `links` as the latest page and return the paths worth prefetching.
    ///
    /// Nothing is returned for the first page, or when the set equals the
    /// previous one as a multiset.
    pub fn plan(&self, links: LinkSet) -> Vec<String> {
        let mut previous = self.previous.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(last) = previous.as_ref() else {
            *previous = Some(links);
            return Vec::new();
        };

        let paths = if !self.enabled || links.same_multiset(last) {
            Vec::new()
        } else {
            links
                .newly_seen(last)
                .into_iter()
                .filter_map(|href| prefetch_path(href, &self.local_base))
                .collect()
        };

        *previous = Some(links);
        paths
    }

    /// Plan from a served response and spawn one task per path. Returns the task count.
    pub fn observe(&self, out: &Outbound) -> usize {
        self.plan(LinkSet::from_outbound(out))
            .into_iter()
            .filter(|path| self.spawn(path.clone()))
            .count()
    }

    /// Observe `out` on a background task once the caller has moved on.
    pub fn schedule(&self, out: Outbound) {
        if !self.enabled || self.cancel.is_cancelled() {
            return;
        }
        let this = self.clone();
        self.tracker.spawn(async move {
            let spawned = this.observe(&out);
            if spawned > 0 {
                tracing::debug!(spawned, "prefetch scheduled");
            }
        });
    }

    fn spawn(&self, path: String) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let store = self.store.clone();
        let permits = self.permits.clone();
        let cancel = self.cancel.clone();

        self.tracker.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => tracing::debug!(%path, "prefetch abandoned"),
                () = async {
                    let Ok(_permit) = permits.acquire().await else { return };
                    tracing::debug!(%path, "prefetching");
                    match store.get_or_fetch(&path, FetchPolicy::Normal).await {
                        Ok(response) => tracing::debug!(
                            %path,
                            status = response.status.as_u16(),
                            cached = response.from_cache,
                            "prefetched"
                        ),
                        Err(e) => tracing::debug!(%path, "prefetch failed: {e}"),
                    }
                } => {}
            }
        });
        true
    }

    /// Tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting work and abandon everything in flight.
    pub async fn close(&self) {
        self.tracker.close();
        self.cancel.cancel();
        self.tracker.wait().await;
    }

    #[cfg(test)]
    pub(crate) async fn settle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingOrigin, session, store_with};
    use axum::http::StatusCode;
    use bytes::Bytes;
    use std::collections::BTreeMap;

    fn page(links: &[&str]) -> Outbound {
        let body: String = links.iter().map(|l| format!(r#"<a href="{l}">x</a>"#)).collect();
        Outbound {
            status: StatusCode::OK,
            content_type: Some("text/html".into()),
            headers: BTreeMap::new(),
            body: Bytes::from(format!("<html><body>{body}</body></html>")),
        }
    }

    #[tokio::test]
    async fn test_first_page_only_seeds() {
        let origin = Arc::new(CountingOrigin::ok("<p>page</p>"));
        let prefetcher = Prefetcher::new(store_with(origin.clone()).await, &session(8888));

        let spawned = prefetcher.observe(&page(&["/title/A", "/title/B", "/title/A", "#top"]));
        prefetcher.settle().await;
        assert_eq!(spawned, 0);
        assert_eq!(origin.calls(), 0);

        let spawned = prefetcher.observe(&page(&["/title/A", "/title/C"]));
        prefetcher.settle().await;
        assert_eq!(spawned, 1);
        assert_eq!(origin.calls(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_set_spawns_nothing() {
        let origin = Arc::new(CountingOrigin::ok("<p>page</p>"));
        let prefetcher = Prefetcher::new(store_with(origin.clone()).await, &session(8888));

        prefetcher.observe(&page(&["/title/A", "/title/B"]));
        let spawned = prefetcher.observe(&page(&["/title/B", "/title/A"]));
        prefetcher.settle().await;

        assert_eq!(spawned, 0);
        assert_eq!(origin.calls(), 0);
    }

    #[tokio::test]
    async fn test_changed_set_spawns_one_task_per_new_link() {
        let origin = Arc::new(CountingOrigin::ok("<p>page</p>"));
        let prefetcher = Prefetcher::new(store_with(origin.clone()).await, &session(8888));

        prefetcher.observe(&page(&["/title/A", "/title/B"]));
        let spawned = prefetcher.observe(&page(&[
            "/title/A",
            "http://localhost:8888/title/C",
            "https://elsewhere.example.org/x",
            "/title/D",
            "/title/D",
        ]));
        prefetcher.settle().await;

        assert_eq!(spawned, 2);
        assert_eq!(origin.calls(), 2);
    }

    #[tokio::test]
    async fn test_schedule_defers_extraction() {
        let origin = Arc::new(CountingOrigin::ok("<p>page</p>"));
        let prefetcher = Prefetcher::new(store_with(origin.clone()).await, &session(8888));
        prefetcher.observe(&page(&[]));

        prefetcher.schedule(page(&["/title/A", "/title/B"]));
        assert_eq!(origin.calls(), 0);
        assert_eq!(prefetcher.in_flight(), 1);

        prefetcher.settle().await;
        assert_eq!(origin.calls(), 2);
        assert_eq!(prefetcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_offline_never_prefetches() {
        let origin = Arc::new(CountingOrigin::ok("<p>page</p>"));
        let session = SessionConfig { policy: FetchPolicy::Offline, ..session(8888) };
        let prefetcher = Prefetcher::new(store_with(origin.clone()).await, &session);

        prefetcher.observe(&page(&[]));
        assert_eq!(prefetcher.observe(&page(&["/title/A"])), 0);
        prefetcher.schedule(page(&["/title/B"]));
        assert_eq!(prefetcher.in_flight(), 0);
        assert_eq!(origin.calls(), 0);
    }

    #[tokio::test]
    async fn test_plain_text_has_no_links() {
        let origin = Arc::new(CountingOrigin::ok("<p>page</p>"));
        let prefetcher = Prefetcher::new(store_with(origin.clone()).await, &session(8888));
        prefetcher.observe(&page(&["/title/B"]));

        let mut text = page(&["/title/A"]);
        text.content_type = Some("text/plain; charset=utf-8".into());
        assert_eq!(prefetcher.observe(&text), 0);
    }

    #[tokio::test]
    async fn test_close_abandons_in_flight() {
        let origin = Arc::new(CountingOrigin {
            delay: std::time::Duration::from_secs(30),
            ..CountingOrigin::ok("<p>slow</p>")
        });
        let prefetcher = Prefetcher::new(store_with(origin.clone()).await, &session(8888));

        prefetcher.observe(&page(&[]));
        prefetcher.observe(&page(&["/title/A", "/title/B"]));
        tokio::time::timeout(std::time::Duration::from_secs(5), prefetcher.close())
            .await
            .expect("close should not wait for slow fetches");

        assert_eq!(prefetcher.in_flight(), 0);
        assert_eq!(prefetcher.observe(&page(&["/title/C"])), 0);
    }
}
