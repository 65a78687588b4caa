//! High level fetch orchestration.
//!
//! Wires the identity-rotating dispatcher, the content-addressed path
//! resolver, and the outcome aggregator into an ergonomic client that
//! downloads an item's product photography into the storage tree. The
//! surrounding crawl engine hands over validated records; everything
//! upstream (extraction, seeds) and downstream (JSON export) stays
//! outside this crate.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use http::header::{REFERER, USER_AGENT};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use url::Url;

use crate::config::{ConfigError, ScraperSettings, load_line_list};
use crate::modules::ban::BAN_STATUS_CODES;
use crate::modules::dispatch::{
    AssetRequest, AssetTransport, DownloadMiddleware, MiddlewareAction, RequestDispatcher,
    RequestState, TransportError, TransportResponse,
};
use crate::modules::events::{
    CrawlEvent, ErrorEvent, EventDispatcher, LoggingHandler, MetricsHandler, PostResponseEvent,
    RetryEvent,
};
use crate::modules::identity::{Identity, IdentityError, IdentityPool, RotationThresholds};
use crate::modules::metrics::{MetricsCollector, RunStats};
use crate::modules::outcome::{FetchOutcome, FetchResultAggregator, ItemPaths};
use crate::modules::storage::{AssetPathResolver, AssetRole};
use crate::records::{CrawlContext, ImageRecord};

/// Result alias used across the orchestration layer.
pub type ScraperResult<T> = Result<T, ScraperError>;

/// Startup errors. Once a scraper is built, per-asset problems are handled
/// internally and never abort the run.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("identity pool error: {0}")]
    Identity(#[from] IdentityError),
}

/// Per-item summary of how the asset fetches ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemReport {
    pub stored: u64,
    pub failed: u64,
}

/// Scraper configuration used by the builder.
#[derive(Clone)]
pub struct AlbumScraperConfig {
    pub proxies: Vec<String>,
    pub user_agents: Vec<String>,
    pub thresholds: RotationThresholds,
    /// Attempt ceiling per asset, counting the first dispatch. The
    /// dispatcher itself retries without bound; this loop-level ceiling is
    /// what stops a persistently banned target.
    pub max_fetch_attempts: u32,
    pub concurrent_requests: usize,
    pub storage_root: PathBuf,
    pub enable_metrics: bool,
    /// Network backend override; `None` uses the reqwest-based transport.
    pub transport: Option<Arc<dyn AssetTransport>>,
}

impl Default for AlbumScraperConfig {
    fn default() -> Self {
        Self {
            proxies: Vec::new(),
            user_agents: Vec::new(),
            thresholds: RotationThresholds::default(),
            max_fetch_attempts: 3,
            concurrent_requests: 10,
            storage_root: PathBuf::from("scraped_data/images"),
            enable_metrics: true,
            transport: None,
        }
    }
}

/// Fluent builder for [`AlbumScraper`].
pub struct AlbumScraperBuilder {
    config: AlbumScraperConfig,
}

impl AlbumScraperBuilder {
    pub fn new() -> Self {
        Self {
            config: AlbumScraperConfig::default(),
        }
    }

    pub fn with_proxies<I, S>(mut self, proxies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.proxies = proxies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_user_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.user_agents = agents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_thresholds(mut self, thresholds: RotationThresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    pub fn with_max_fetch_attempts(mut self, attempts: u32) -> Self {
        self.config.max_fetch_attempts = attempts.max(1);
        self
    }

    pub fn with_concurrent_requests(mut self, limit: usize) -> Self {
        self.config.concurrent_requests = limit.max(1);
        self
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.storage_root = root.into();
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn AssetTransport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    pub fn disable_metrics(mut self) -> Self {
        self.config.enable_metrics = false;
        self
    }

    pub fn build(self) -> ScraperResult<AlbumScraper> {
        AlbumScraper::with_config(self.config)
    }
}

impl Default for AlbumScraperBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Reqwest client pool keyed by proxy endpoint.
///
/// reqwest binds a proxy at client construction, so each endpoint gets its
/// own lazily built client that is then reused for every request routed
/// through that proxy.
struct ClientPool {
    clients: Mutex<HashMap<Option<String>, reqwest::Client>>,
}

impl ClientPool {
    fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn client(&self, proxy: Option<&str>) -> Result<reqwest::Client, reqwest::Error> {
        let mut guard = self.clients.lock().await;
        let key = proxy.map(str::to_string);
        if let Some(client) = guard.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::Client::builder();
        if let Some(endpoint) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(endpoint)?);
        }

        let client = builder.build()?;
        guard.insert(key, client.clone());
        Ok(client)
    }
}

/// Default transport: plain HTTP GET with the stamped identity attached.
struct HttpTransport {
    pool: ClientPool,
}

impl HttpTransport {
    fn new() -> Self {
        Self {
            pool: ClientPool::new(),
        }
    }
}

#[async_trait]
impl AssetTransport for HttpTransport {
    async fn fetch(&self, request: &AssetRequest) -> Result<TransportResponse, TransportError> {
        let client = self.pool.client(request.proxy.as_deref()).await?;

        let mut builder = client
            .get(&request.url)
            .header(REFERER, request.referer.as_str());
        if let Some(agent) = request.user_agent.as_deref() {
            builder = builder.header(USER_AGENT, agent);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(TransportResponse { status, body })
    }
}

/// Everything one asset fetch needs, moved into its task.
struct AssetWorker {
    middleware: RequestDispatcher,
    transport: Arc<dyn AssetTransport>,
    resolver: AssetPathResolver,
    events: Arc<EventDispatcher>,
    metrics: Option<MetricsCollector>,
    storage_root: PathBuf,
    max_attempts: u32,
    ctx: CrawlContext,
}

impl AssetWorker {
    fn outcome(&self, request: &AssetRequest, resolved_path: String, success: bool) -> FetchOutcome {
        if let Some(ref metrics) = self.metrics {
            if success {
                metrics.record_asset_stored();
            } else {
                metrics.record_asset_failed();
            }
        }
        FetchOutcome {
            sequence: request.sequence,
            role: request.role,
            success,
            resolved_path,
        }
    }

    fn report_error(&self, url: &str, error: impl Into<String>) {
        self.events.dispatch(CrawlEvent::Error(ErrorEvent {
            url: url.to_string(),
            error: error.into(),
            timestamp: Utc::now(),
        }));
    }

    async fn store(&self, target: &Path, body: &Bytes) -> io::Result<()> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(target, body).await
    }

    /// Drive one asset through the dispatch loop until a terminal outcome.
    ///
    /// A ban or transport failure rotates identities and yields a
    /// resubmission, which re-enters this loop as a new work item; the
    /// attempt ceiling is enforced here, not in the middleware. Resolution
    /// happens up front so even a failed fetch reports where the asset
    /// would have been stored.
    async fn run(self, semaphore: Arc<Semaphore>, mut request: AssetRequest) -> FetchOutcome {
        let resolved = self.resolver.resolve(&self.ctx, &request.url, request.role);

        let _permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                log::warn!("semaphore closed, skipping {}", request.url);
                return self.outcome(&request, resolved, false);
            }
        };

        let target = self.storage_root.join(&resolved);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            log::debug!("already stored, skipping download: {resolved}");
            return self.outcome(&request, resolved, true);
        }

        loop {
            if request.state == RequestState::Pending {
                self.middleware.before_request(&mut request);
            }
            request.state = RequestState::InFlight;

            let action = match self.transport.fetch(&request).await {
                Ok(response) => {
                    match self.middleware.after_response(&mut request, response.status) {
                        MiddlewareAction::Continue => {
                            self.events.dispatch(CrawlEvent::PostResponse(PostResponseEvent {
                                url: request.url.clone(),
                                status: response.status,
                                timestamp: Utc::now(),
                            }));

                            if (200..300).contains(&response.status) {
                                return match self.store(&target, &response.body).await {
                                    Ok(()) => self.outcome(&request, resolved, true),
                                    Err(err) => {
                                        self.report_error(
                                            &request.url,
                                            format!("storage write failed: {err}"),
                                        );
                                        self.outcome(&request, resolved, false)
                                    }
                                };
                            }

                            // Non-ban, non-success statuses are terminal for
                            // this asset; the item still completes without it.
                            self.report_error(
                                &request.url,
                                format!("unexpected status {}", response.status),
                            );
                            return self.outcome(&request, resolved, false);
                        }
                        action @ MiddlewareAction::Resubmit(_) => action,
                    }
                }
                Err(error) => self.middleware.on_exception(&mut request, &error),
            };

            match action {
                MiddlewareAction::Continue => {
                    return self.outcome(&request, resolved, false);
                }
                MiddlewareAction::Resubmit(retry) => {
                    if retry.attempt > self.max_attempts {
                        self.report_error(
                            &request.url,
                            format!("dropped after {} attempts", request.attempt),
                        );
                        return self.outcome(&request, resolved, false);
                    }
                    self.events.dispatch(CrawlEvent::Retry(RetryEvent {
                        url: retry.url.clone(),
                        attempt: retry.attempt,
                        timestamp: Utc::now(),
                    }));
                    request = retry;
                }
            }
        }
    }
}

/// Main fetch orchestrator.
pub struct AlbumScraper {
    dispatcher: RequestDispatcher,
    transport: Arc<dyn AssetTransport>,
    resolver: AssetPathResolver,
    events: Arc<EventDispatcher>,
    metrics: Option<MetricsCollector>,
    semaphore: Arc<Semaphore>,
    storage_root: PathBuf,
    max_fetch_attempts: u32,
}

impl AlbumScraper {
    /// Obtain a builder to customise the scraper instance.
    pub fn builder() -> AlbumScraperBuilder {
        AlbumScraperBuilder::new()
    }

    /// Build a scraper from deserialized settings, loading the proxy and
    /// user-agent lists from their configured files.
    pub fn from_settings(settings: &ScraperSettings) -> ScraperResult<Self> {
        let proxies = load_line_list(&settings.proxy_list_path)?;
        let user_agents = load_line_list(&settings.user_agent_list_path)?;
        Self::with_config(AlbumScraperConfig {
            proxies,
            user_agents,
            thresholds: RotationThresholds {
                max_requests_per_agent: settings.max_requests_per_agent,
                max_requests_per_proxy: settings.max_requests_per_proxy,
            },
            max_fetch_attempts: settings.max_fetch_attempts,
            concurrent_requests: settings.concurrent_requests,
            storage_root: settings.storage_root.clone(),
            ..AlbumScraperConfig::default()
        })
    }

    pub fn with_config(config: AlbumScraperConfig) -> ScraperResult<Self> {
        let metrics = config.enable_metrics.then(MetricsCollector::new);

        let mut events = EventDispatcher::new();
        events.register_handler(Arc::new(LoggingHandler));
        if let Some(ref collector) = metrics {
            events.register_handler(Arc::new(MetricsHandler::new(collector.clone())));
        }
        let events = Arc::new(events);

        let pool = IdentityPool::new(config.proxies, config.user_agents)?;
        let dispatcher = RequestDispatcher::new(pool, config.thresholds, Arc::clone(&events));

        let transport = config
            .transport
            .unwrap_or_else(|| Arc::new(HttpTransport::new()));

        Ok(Self {
            dispatcher,
            transport,
            resolver: AssetPathResolver,
            events,
            metrics,
            semaphore: Arc::new(Semaphore::new(config.concurrent_requests)),
            storage_root: config.storage_root,
            max_fetch_attempts: config.max_fetch_attempts,
        })
    }

    /// Register an additional event handler (diagnostics, custom sinks).
    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    /// Snapshot of the run counters, when metrics are enabled.
    pub fn stats(&self) -> Option<RunStats> {
        self.metrics.as_ref().map(MetricsCollector::snapshot)
    }

    /// Identity currently stamped onto outgoing requests.
    pub fn current_identity(&self) -> Identity {
        self.dispatcher.current_identity()
    }

    /// Status codes treated as ban evidence.
    pub fn ban_status_codes() -> &'static [u16] {
        &BAN_STATUS_CODES
    }

    /// Download every candidate asset of `record`, filling its output path
    /// fields with the successfully stored ones.
    ///
    /// Individual asset failures are logged and dropped; this method never
    /// fails the item, let alone the run.
    pub async fn fetch_item(&self, record: &mut ImageRecord) -> ItemReport {
        let referer = record.referer();

        let mut report = ItemReport::default();
        let mut requests = Vec::new();
        let candidates = record
            .product_images
            .iter()
            .map(|url| (url, AssetRole::ProductImage))
            .chain(
                record
                    .size_chart_images
                    .iter()
                    .map(|url| (url, AssetRole::SizeChartImage)),
            );
        for (url, role) in candidates {
            if Url::parse(url).is_err() {
                log::warn!("skipping malformed asset url: {url}");
                report.failed += 1;
                continue;
            }
            let sequence = requests.len();
            requests.push(AssetRequest::new(url.clone(), referer.clone(), Some(role), sequence));
        }

        let mut tasks = JoinSet::new();
        for request in requests {
            let worker = AssetWorker {
                middleware: self.dispatcher.clone(),
                transport: Arc::clone(&self.transport),
                resolver: self.resolver,
                events: Arc::clone(&self.events),
                metrics: self.metrics.clone(),
                storage_root: self.storage_root.clone(),
                max_attempts: self.max_fetch_attempts,
                ctx: record.ctx.clone(),
            };
            let semaphore = Arc::clone(&self.semaphore);
            tasks.spawn(worker.run(semaphore, request));
        }

        let mut aggregator = FetchResultAggregator::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    if outcome.success {
                        report.stored += 1;
                    } else {
                        report.failed += 1;
                    }
                    aggregator.record(outcome);
                }
                Err(err) => {
                    log::warn!("asset task aborted: {err}");
                    report.failed += 1;
                }
            }
        }

        let paths: ItemPaths = aggregator.finish();
        paths.apply(record);
        report
    }
}
