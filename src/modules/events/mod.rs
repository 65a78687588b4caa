//! Event system around dispatch activity.
//!
//! Every rotation, ban, and retry is observable: the dispatcher and the
//! fetch loop publish structured events, and registered handlers turn them
//! into log lines and metrics. Handlers must not block; they run on the
//! dispatching task.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::modules::ban::BanSignal;
use crate::modules::metrics::MetricsCollector;

/// What caused an identity rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationTrigger {
    /// The per-agent request ceiling was reached.
    AgentThreshold,
    /// The per-proxy request ceiling was reached.
    ProxyThreshold,
    /// A ban signal forced both identities to rotate at once.
    Ban,
}

/// A request was stamped and is about to go out.
#[derive(Debug, Clone)]
pub struct PreRequestEvent {
    pub url: String,
    pub proxy: String,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
}

/// A response came back and was not classified as a ban.
#[derive(Debug, Clone)]
pub struct PostResponseEvent {
    pub url: String,
    pub status: u16,
    pub timestamp: DateTime<Utc>,
}

/// Part of the active identity was replaced.
#[derive(Debug, Clone)]
pub struct RotationEvent {
    pub trigger: RotationTrigger,
    /// Identity values after the rotation.
    pub proxy: String,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
}

/// A response or transport failure was classified as a block.
#[derive(Debug, Clone)]
pub struct BanEvent {
    pub url: String,
    pub signal: BanSignal,
    pub timestamp: DateTime<Utc>,
}

/// A banned request was resubmitted with a fresh identity.
#[derive(Debug, Clone)]
pub struct RetryEvent {
    pub url: String,
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

/// A non-recoverable per-asset error (storage write, exhausted retries).
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub url: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum CrawlEvent {
    PreRequest(PreRequestEvent),
    PostResponse(PostResponseEvent),
    Rotation(RotationEvent),
    Ban(BanEvent),
    Retry(RetryEvent),
    Error(ErrorEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &CrawlEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: CrawlEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &CrawlEvent) {
        match event {
            CrawlEvent::PreRequest(pre) => {
                log::info!(
                    "[REQUEST] proxy={} | user_agent={} | url={}",
                    pre.proxy,
                    pre.user_agent,
                    pre.url
                );
            }
            CrawlEvent::PostResponse(post) => {
                log::debug!("<- {} {}", post.status, post.url);
            }
            CrawlEvent::Rotation(rotation) => match rotation.trigger {
                RotationTrigger::AgentThreshold => {
                    log::info!("Rotated User-Agent to: {}", rotation.user_agent);
                }
                RotationTrigger::ProxyThreshold => {
                    log::info!("Rotated Proxy to: {}", rotation.proxy);
                }
                RotationTrigger::Ban => {
                    log::info!(
                        "Rotated Proxy to: {} and User-Agent to: {}",
                        rotation.proxy,
                        rotation.user_agent
                    );
                }
            },
            CrawlEvent::Ban(ban) => {
                log::warn!(
                    "Request banned ({}) for {}. Rotating proxy and user-agent.",
                    ban.signal,
                    ban.url
                );
            }
            CrawlEvent::Retry(retry) => {
                log::info!("resubmitting {} (attempt {})", retry.url, retry.attempt);
            }
            CrawlEvent::Error(error) => {
                log::warn!("{} -> {}", error.url, error.error);
            }
        }
    }
}

/// Feeds the run counters from dispatch events.
#[derive(Clone, Debug)]
pub struct MetricsHandler {
    metrics: MetricsCollector,
}

impl MetricsHandler {
    pub fn new(metrics: MetricsCollector) -> Self {
        Self { metrics }
    }
}

impl EventHandler for MetricsHandler {
    fn handle(&self, event: &CrawlEvent) {
        match event {
            CrawlEvent::PreRequest(_) => self.metrics.record_request(),
            CrawlEvent::PostResponse(_) => self.metrics.record_response(),
            CrawlEvent::Rotation(rotation) => match rotation.trigger {
                RotationTrigger::AgentThreshold => self.metrics.record_agent_rotation(),
                RotationTrigger::ProxyThreshold => self.metrics.record_proxy_rotation(),
                RotationTrigger::Ban => {
                    self.metrics.record_agent_rotation();
                    self.metrics.record_proxy_rotation();
                }
            },
            CrawlEvent::Ban(_) => self.metrics.record_ban(),
            CrawlEvent::Retry(_) => self.metrics.record_retry(),
            CrawlEvent::Error(_) => {}
        }
    }
}
