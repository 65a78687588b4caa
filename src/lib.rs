//! # albumscraper-rs
//!
//! Core of a storefront album crawler: rotates outbound request identities
//! (proxy endpoint + user-agent) under configurable usage ceilings, recovers
//! from server-side blocks by rotating and resubmitting, and stores fetched
//! product photography under deterministic, content-addressed paths so
//! repeated runs never duplicate work.
//!
//! Extraction, pagination, and JSON export live in the surrounding crawl
//! engine; this crate consumes validated [`records::ImageRecord`]s and
//! hands them back enriched with the storage paths of the assets that
//! downloaded successfully.
//!
//! ## Example
//!
//! ```no_run
//! use albumscraper_rs::{AlbumScraper, records::ImageRecord};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scraper = AlbumScraper::builder()
//!         .with_proxies(["http://127.0.0.1:8080"])
//!         .with_user_agents(["Mozilla/5.0 (X11; Linux x86_64)"])
//!         .with_storage_root("scraped_data/images")
//!         .build()?;
//!
//!     let mut record: ImageRecord = serde_json::from_str(r#"{
//!         "seller": "acme", "contact": "wechat:acme",
//!         "category": "Shoes", "category_text": "Shoes",
//!         "category_link": "https://x.example/categories/shoes",
//!         "album_url": "https://x.example/albums/42",
//!         "product_images": ["https://img.example/photo/1.jpg"]
//!     }"#)?;
//!
//!     let report = scraper.fetch_item(&mut record).await;
//!     println!("stored {} assets", report.stored);
//!     println!("paths: {:?}", record.product_images_paths);
//!     Ok(())
//! }
//! ```

mod scraper;

pub mod config;
pub mod modules;
pub mod records;

pub use crate::scraper::{
    AlbumScraper,
    AlbumScraperBuilder,
    AlbumScraperConfig,
    ItemReport,
    ScraperError,
    ScraperResult,
};

pub use crate::config::{ConfigError, ScraperSettings, load_line_list};

pub use crate::records::{CrawlContext, ImageRecord, RecordError};

pub use crate::modules::{
    AssetPathResolver,
    AssetRequest,
    AssetRole,
    AssetTransport,
    BanDetector,
    BanSignal,
    CrawlEvent,
    DownloadMiddleware,
    EventDispatcher,
    EventHandler,
    FetchOutcome,
    FetchResultAggregator,
    Identity,
    IdentityError,
    IdentityPool,
    ItemPaths,
    LoggingHandler,
    MetricsCollector,
    MetricsHandler,
    MiddlewareAction,
    RequestDispatcher,
    RequestState,
    RotationThresholds,
    RotationTrigger,
    RunStats,
    TransportError,
    TransportResponse,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
