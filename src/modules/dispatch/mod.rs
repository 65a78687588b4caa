//! Request dispatch middleware: identity stamping and ban recovery.
//!
//! Sits between the fetch loop and the network. Before a request goes out
//! it is stamped with the active (proxy, user-agent) pair, rotating either
//! when its usage ceiling is reached; when a response or transport failure
//! classifies as a ban, both identities are force-rotated and the request
//! comes back as an explicitly tagged resubmission the caller owns.
//!
//! All shared rotation state lives behind one mutex. The critical section
//! covers threshold check, rotation, identity read, and counter update as
//! a single atomic unit and performs no I/O; events are published after
//! the lock is released.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;

use crate::modules::ban::{BanDetector, BanSignal};
use crate::modules::events::{
    BanEvent, CrawlEvent, EventDispatcher, PreRequestEvent, RotationEvent, RotationTrigger,
};
use crate::modules::identity::{Identity, IdentityPool, RotationThresholds};
use crate::modules::storage::AssetRole;

/// Failure below the HTTP layer. Any of these is ban-equivalent.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Completed HTTP exchange as seen by the dispatch loop.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Network backend driven by the fetch loop. The dispatcher itself never
/// touches the wire; swapping the transport out swaps the whole network
/// layer, which is also how the tests run without one.
#[async_trait]
pub trait AssetTransport: Send + Sync {
    async fn fetch(&self, request: &AssetRequest) -> Result<TransportResponse, TransportError>;
}

/// Lifecycle of a single dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Stamped,
    InFlight,
    Ok,
    Banned,
    Failed,
}

/// One outbound asset download, including its stamped identity.
#[derive(Debug, Clone)]
pub struct AssetRequest {
    pub url: String,
    pub referer: String,
    pub role: Option<AssetRole>,
    /// Position within the owning item's candidate lists.
    pub sequence: usize,
    /// 1-based count of dispatch attempts this work item represents.
    pub attempt: u32,
    /// True for resubmissions created by ban recovery. A retry-tagged
    /// request is a distinct work item and must not be dropped by any
    /// URL-deduplication the surrounding engine applies.
    pub retry: bool,
    pub state: RequestState,
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
}

impl AssetRequest {
    pub fn new(url: impl Into<String>, referer: impl Into<String>, role: Option<AssetRole>, sequence: usize) -> Self {
        Self {
            url: url.into(),
            referer: referer.into(),
            role,
            sequence,
            attempt: 1,
            retry: false,
            state: RequestState::Pending,
            proxy: None,
            user_agent: None,
        }
    }

    /// Build the resubmission for a banned attempt, already stamped with
    /// the post-rotation identity.
    fn resubmitted(&self, identity: Identity) -> Self {
        Self {
            url: self.url.clone(),
            referer: self.referer.clone(),
            role: self.role,
            sequence: self.sequence,
            attempt: self.attempt + 1,
            retry: true,
            state: RequestState::Stamped,
            proxy: Some(identity.proxy),
            user_agent: Some(identity.user_agent),
        }
    }
}

/// What the fetch loop should do after a middleware hook ran.
#[derive(Debug)]
pub enum MiddlewareAction {
    /// Pass the response (or failure) through unchanged.
    Continue,
    /// Enqueue this already-stamped work item in place of the original.
    Resubmit(AssetRequest),
}

/// Hooks invoked by an engine-agnostic dispatch loop around every request.
pub trait DownloadMiddleware: Send + Sync {
    fn before_request(&self, request: &mut AssetRequest);
    fn after_response(&self, request: &mut AssetRequest, status: u16) -> MiddlewareAction;
    fn on_exception(&self, request: &mut AssetRequest, error: &TransportError) -> MiddlewareAction;
}

/// Middleware owning the shared identity pool and its usage counters.
#[derive(Clone)]
pub struct RequestDispatcher {
    pool: Arc<Mutex<IdentityPool>>,
    thresholds: RotationThresholds,
    detector: BanDetector,
    events: Arc<EventDispatcher>,
}

impl RequestDispatcher {
    pub fn new(pool: IdentityPool, thresholds: RotationThresholds, events: Arc<EventDispatcher>) -> Self {
        Self {
            pool: Arc::new(Mutex::new(pool)),
            thresholds,
            detector: BanDetector,
            events,
        }
    }

    /// Current usage counters (proxy, agent), read under the lock.
    pub fn usage_counts(&self) -> (u64, u64) {
        let pool = self.pool.lock().expect("identity pool lock poisoned");
        (pool.proxy_request_count(), pool.agent_request_count())
    }

    /// Active identity, read under the lock.
    pub fn current_identity(&self) -> Identity {
        self.pool.lock().expect("identity pool lock poisoned").current()
    }

    /// Force-rotate both identities and reset both counters; returns the
    /// new identity. Used by ban recovery, bypassing the thresholds.
    fn rotate_for_ban(&self) -> Identity {
        let identity = {
            let mut pool = self.pool.lock().expect("identity pool lock poisoned");
            pool.advance_proxy();
            pool.advance_agent();
            pool.reset_proxy_count();
            pool.reset_agent_count();
            pool.current()
        };
        self.events.dispatch(CrawlEvent::Rotation(RotationEvent {
            trigger: RotationTrigger::Ban,
            proxy: identity.proxy.clone(),
            user_agent: identity.user_agent.clone(),
            timestamp: Utc::now(),
        }));
        identity
    }

    fn handle_ban(&self, request: &mut AssetRequest, signal: BanSignal) -> MiddlewareAction {
        request.state = match signal {
            BanSignal::Status(_) => RequestState::Banned,
            BanSignal::Transport => RequestState::Failed,
        };
        self.events.dispatch(CrawlEvent::Ban(BanEvent {
            url: request.url.clone(),
            signal,
            timestamp: Utc::now(),
        }));
        let identity = self.rotate_for_ban();
        MiddlewareAction::Resubmit(request.resubmitted(identity))
    }
}

impl DownloadMiddleware for RequestDispatcher {
    /// Stamp the request with the active identity, rotating first if a
    /// usage ceiling was reached. The request that trips a threshold is
    /// the first to use the new identity, not the last on the old one.
    fn before_request(&self, request: &mut AssetRequest) {
        let mut rotations = Vec::new();
        let identity = {
            let mut pool = self.pool.lock().expect("identity pool lock poisoned");

            if self.thresholds.should_rotate_agent(pool.agent_request_count()) {
                pool.advance_agent();
                pool.reset_agent_count();
                rotations.push(RotationTrigger::AgentThreshold);
            }

            if self.thresholds.should_rotate_proxy(pool.proxy_request_count()) {
                pool.advance_proxy();
                pool.reset_proxy_count();
                rotations.push(RotationTrigger::ProxyThreshold);
            }

            pool.record_use();
            pool.current()
        };

        for trigger in rotations {
            self.events.dispatch(CrawlEvent::Rotation(RotationEvent {
                trigger,
                proxy: identity.proxy.clone(),
                user_agent: identity.user_agent.clone(),
                timestamp: Utc::now(),
            }));
        }

        request.proxy = Some(identity.proxy.clone());
        request.user_agent = Some(identity.user_agent.clone());
        request.state = RequestState::Stamped;

        self.events.dispatch(CrawlEvent::PreRequest(PreRequestEvent {
            url: request.url.clone(),
            proxy: identity.proxy,
            user_agent: identity.user_agent,
            timestamp: Utc::now(),
        }));
    }

    /// Classify the response; bans trigger rotate-and-resubmit, anything
    /// else passes through unchanged.
    fn after_response(&self, request: &mut AssetRequest, status: u16) -> MiddlewareAction {
        match self.detector.classify_status(status) {
            Some(signal) => self.handle_ban(request, signal),
            None => {
                request.state = RequestState::Ok;
                MiddlewareAction::Continue
            }
        }
    }

    /// Transport failures get the same rotate-and-resubmit treatment as
    /// ban statuses.
    fn on_exception(&self, request: &mut AssetRequest, error: &TransportError) -> MiddlewareAction {
        log::warn!("Exception encountered: {error}. Rotating proxy and user-agent.");
        let signal = self.detector.classify_failure();
        self.handle_ban(request, signal)
    }
}
