//! Core crawl subsystems.
//!
//! Identity rotation, ban classification, dispatch middleware, content-
//! addressed storage naming, and per-item outcome aggregation.

pub mod ban;
pub mod dispatch;
pub mod events;
pub mod identity;
pub mod metrics;
pub mod outcome;
pub mod storage;

// Re-export commonly used types
pub use ban::{BAN_STATUS_CODES, BanDetector, BanSignal};
pub use dispatch::{
    AssetRequest, AssetTransport, DownloadMiddleware, MiddlewareAction, RequestDispatcher,
    RequestState, TransportError, TransportResponse,
};
pub use events::{
    BanEvent, CrawlEvent, ErrorEvent, EventDispatcher, EventHandler, LoggingHandler,
    MetricsHandler, PostResponseEvent, PreRequestEvent, RetryEvent, RotationEvent,
    RotationTrigger,
};
pub use identity::{Identity, IdentityError, IdentityPool, RotationThresholds};
pub use metrics::{MetricsCollector, RunStats};
pub use outcome::{FetchOutcome, FetchResultAggregator, ItemPaths};
pub use storage::{AssetPathResolver, AssetRole, album_id, normalize_token};
