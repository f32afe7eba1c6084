//! Local HTTP endpoint fronting the origin.
//!
//! Every GET goes through the same pipeline:
//! content store -> converter -> response. Prefetch of new links is handed to
//! a background task and never holds up the response.
//! The lifecycle is published on a watch channel:
//! stopped -> starting -> listening -> stopping -> stopped.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wikisearch_client::{ContentStore, Converter, FetchPolicy, OriginBase, Outbound, SessionConfig, converter_for};
use wikisearch_core::Error;

use crate::prefetch::Prefetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    Stopped,
    Starting,
    Listening(SocketAddr),
    Stopping,
}

/// Fetch, convert and prefetch for one session.
pub struct Pipeline {
    base: OriginBase,
    policy: FetchPolicy,
    store: ContentStore,
    converter: Box<dyn Converter>,
    prefetcher: Prefetcher,
}

impl Pipeline {
    pub fn new(session: &SessionConfig, store: ContentStore) -> Self {
        Self {
            base: session.origin.clone(),
            policy: session.policy,
            converter: converter_for(session.mode, &session.origin, session.port),
            prefetcher: Prefetcher::new(store.clone(), session),
            store,
        }
    }

    /// Serve a raw request path such as `/title/Foo` or `/https://origin/title/Foo?x=1`.
    pub async fn handle(&self, raw: &str) -> Outbound {
        let path = self.base.target_path(raw);
        let response = self.store.fetch(&path, self.policy).await;

        let out = match self.converter.convert(&response) {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(url = %response.url, mode = %self.converter.mode(), "conversion failed: {e}");
                e.into_outbound(response.status)
            }
        };

        tracing::info!(
            path = %path,
            status = out.status.as_u16(),
            cached = response.from_cache,
            ms = response.fetch_ms,
            "served"
        );

        self.prefetcher.schedule(out.clone());
        out
    }

    async fn close(&self) -> Result<(), Error> {
        tracing::debug!(abandoned = self.prefetcher.in_flight(), "closing prefetcher");
        self.prefetcher.close().await;
        self.store.close().await
    }
}

pub struct ProxyServer {
    port: u16,
    pipeline: Arc<Pipeline>,
    state: watch::Sender<ProxyState>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ProxyServer {
    pub fn new(session: &SessionConfig, store: ContentStore) -> Self {
        let (state, _) = watch::channel(ProxyState::Stopped);
        Self {
            port: session.port,
            pipeline: Arc::new(Pipeline::new(session, store)),
            state,
            shutdown: CancellationToken::new(),
            task: None,
        }
    }

    /// Read-only view of the lifecycle.
    pub fn subscribe(&self) -> watch::Receiver<ProxyState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ProxyState {
        *self.state.borrow()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn router(&self) -> Router {
        Router::new().fallback(proxy_request).with_state(self.pipeline.clone())
    }

    /// Bind `127.0.0.1:<port>` and serve in the background.
    ///
    /// # Errors
    ///
    /// `Error::Bind` when the port cannot be bound.
    pub async fn start(&mut self) -> Result<SocketAddr, Error> {
        if let ProxyState::Listening(addr) = self.state() {
            return Ok(addr);
        }
        self.state.send_replace(ProxyState::Starting);

        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.port));
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.state.send_replace(ProxyState::Stopped);
                return Err(Error::Bind(format!("{addr}: {e}")));
            }
        };
        let local = listener.local_addr().map_err(|e| Error::Bind(format!("{addr}: {e}")))?;

        self.shutdown = CancellationToken::new();
        let shutdown = self.shutdown.clone();
        let app = self.router();

        self.task = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
            {
                tracing::error!("proxy server error: {e}");
            }
        }));

        self.state.send_replace(ProxyState::Listening(local));
        tracing::info!(%local, "proxy listening");
        Ok(local)
    }

    /// Graceful shutdown, then release prefetch tasks and the cache handle.
    pub async fn stop(&mut self) -> Result<(), Error> {
        if self.state() == ProxyState::Stopped {
            return Ok(());
        }
        self.state.send_replace(ProxyState::Stopping);

        self.shutdown.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!("proxy task ended abnormally: {e}");
        }

        let closed = self.pipeline.close().await;
        self.state.send_replace(ProxyState::Stopped);
        tracing::info!("proxy stopped");
        closed
    }
}

async fn proxy_request(State(pipeline): State<Arc<Pipeline>>, method: Method, uri: Uri) -> Response {
    if method != Method::GET {
        return (StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, "GET")], "method not allowed").into_response();
    }
    let raw = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    into_response(pipeline.handle(raw).await)
}

fn into_response(out: Outbound) -> Response {
    let mut response = Response::new(Body::from(out.body));
    *response.status_mut() = out.status;

    let headers = response.headers_mut();
    if let Some(ct) = out.content_type.as_deref().and_then(|ct| HeaderValue::from_str(ct).ok()) {
        headers.insert(header::CONTENT_TYPE, ct);
    }
    for (name, value) in &out.headers {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
            headers.insert(name, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingOrigin, session, store_with};
    use std::time::Duration;
    use wikisearch_client::LinkSet;

    const SEARCH_PAGE: &str = r#"<html><body><a href="https://example.org/wiki/Foo">Foo</a></body></html>"#;

    async fn server(origin: Arc<CountingOrigin>) -> ProxyServer {
        ProxyServer::new(&session(0), store_with(origin).await)
    }

    #[tokio::test]
    async fn test_pipeline_rewrites_and_prefetches() {
        let origin = Arc::new(CountingOrigin::ok(SEARCH_PAGE));
        let session = session(8888);
        let pipeline = Pipeline::new(&session, store_with(origin.clone()).await);
        pipeline.prefetcher.plan(LinkSet::default());

        let out = pipeline.handle("/https://example.org/index.php?search=install").await;
        assert_eq!(out.status, StatusCode::OK);
        assert!(out.text().unwrap().contains(r#"<a href="http://localhost:8888/wiki/Foo">Foo</a>"#));
        assert_eq!(origin.calls(), 1, "prefetch must not run before the response is returned");

        pipeline.prefetcher.settle().await;
        assert_eq!(origin.calls(), 2);

        pipeline.handle("/wiki/Foo").await;
        assert_eq!(origin.calls(), 2, "prefetched page must come from cache");
    }

    #[tokio::test]
    async fn test_pipeline_unreachable_origin() {
        let origin = Arc::new(CountingOrigin { unreachable: true, ..CountingOrigin::ok("") });
        let pipeline = Pipeline::new(&session(8888), store_with(origin).await);

        let out = pipeline.handle("/index.php?search=install").await;
        assert_eq!(out.status, StatusCode::BAD_GATEWAY);
        assert!(out.text().unwrap().contains("https://example.org/index.php?search=install"));
        assert!(!out.text().unwrap().contains("localhost:8888"));
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let mut proxy = server(Arc::new(CountingOrigin::ok(SEARCH_PAGE))).await;
        let mut states = proxy.subscribe();
        assert_eq!(proxy.state(), ProxyState::Stopped);

        let addr = proxy.start().await.unwrap();
        assert_eq!(*states.borrow_and_update(), ProxyState::Listening(addr));
        assert!(addr.ip().is_loopback());

        proxy.stop().await.unwrap();
        assert_eq!(proxy.state(), ProxyState::Stopped);
        assert!(states.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let taken = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let origin = Arc::new(CountingOrigin::ok(""));
        let mut proxy = ProxyServer::new(&session(port), store_with(origin).await);

        let result = proxy.start().await;
        assert!(matches!(result, Err(Error::Bind(_))));
        assert_eq!(proxy.state(), ProxyState::Stopped);
    }

    #[tokio::test]
    async fn test_serves_over_http() {
        let origin = Arc::new(CountingOrigin {
            status: StatusCode::MOVED_PERMANENTLY,
            headers: [("location".to_string(), "https://example.org/title/Main_page".to_string())].into(),
            ..CountingOrigin::ok("")
        });
        let mut proxy = server(origin.clone()).await;
        let addr = proxy.start().await.unwrap();

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        let response = client.get(format!("http://{addr}/")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers()[header::LOCATION],
            "http://localhost:0/title/Main_page"
        );

        let rejected = client.post(format!("http://{addr}/title/Foo")).send().await.unwrap();
        assert_eq!(rejected.status(), StatusCode::METHOD_NOT_ALLOWED);

        proxy.stop().await.unwrap();
        assert_eq!(origin.calls(), 1);
    }
}
