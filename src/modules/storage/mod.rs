//! Content-addressed asset placement.
//!
//! Maps (crawl context, asset URL, role) to a deterministic relative storage
//! path. The same inputs always resolve to the same path, so repeated runs
//! overwrite nothing and download nothing twice. Resolution never fails:
//! missing context fields degrade to sentinel tokens instead of aborting
//! the fetch.

use sha1::{Digest, Sha1};

use crate::records::CrawlContext;

/// Sentinel tokens substituted for missing context fields.
pub const UNKNOWN_SELLER: &str = "unknown_seller";
pub const UNKNOWN_CATEGORY: &str = "unknown_category";
pub const UNKNOWN_ALBUM: &str = "unknown_album";
pub const UNKNOWN_ROLE: &str = "unknown";

/// Hex characters kept from the album-URL digest for the directory name.
const ALBUM_ID_LEN: usize = 10;

/// Semantic role of a fetched asset within its item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetRole {
    ProductImage,
    SizeChartImage,
}

impl AssetRole {
    /// Directory segment separating assets by role.
    pub fn as_segment(&self) -> &'static str {
        match self {
            AssetRole::ProductImage => "product_image",
            AssetRole::SizeChartImage => "size_chart_image",
        }
    }
}

/// SHA-1 digest of `input` as lowercase hex.
fn sha1_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Normalize a context value into a filesystem-safe token: lower-cased,
/// trimmed, internal whitespace runs collapsed to a single underscore.
/// Blank input maps to the given sentinel.
pub fn normalize_token(value: &str, fallback: &'static str) -> String {
    let token = value
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    if token.is_empty() {
        fallback.to_string()
    } else {
        token
    }
}

/// Short, stable identifier for an album directory.
///
/// Album URLs are long and unsafe as directory names; the first
/// [`ALBUM_ID_LEN`] hex characters of their SHA-1 digest are compact and
/// unique enough, and the same URL always maps to the same directory.
pub fn album_id(album_url: &str) -> String {
    let mut digest = sha1_hex(album_url);
    digest.truncate(ALBUM_ID_LEN);
    digest
}

/// Pure resolver from asset identity to relative storage path.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssetPathResolver;

impl AssetPathResolver {
    /// Resolve the relative path an asset is stored under:
    /// `{seller}/{category}/{album_id}/{role}/{url_hash}.jpg`.
    ///
    /// The filename is the full SHA-1 of the asset URL, so two distinct
    /// URLs collide only with hash-collision probability and re-fetching
    /// the same URL lands on the same file.
    pub fn resolve(&self, ctx: &CrawlContext, asset_url: &str, role: Option<AssetRole>) -> String {
        let seller = normalize_token(&ctx.seller, UNKNOWN_SELLER);
        let category = normalize_token(&ctx.category, UNKNOWN_CATEGORY);
        let album = album_id(ctx.album_url.as_deref().unwrap_or(UNKNOWN_ALBUM));
        let role = role.map_or(UNKNOWN_ROLE, |role| role.as_segment());
        let image_hash = sha1_hex(asset_url);
        format!("{seller}/{category}/{album}/{role}/{image_hash}.jpg")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn ctx() -> CrawlContext {
        CrawlContext {
            seller: " Acme ".into(),
            category: "Shoes".into(),
            album_url: Some("https://x.example/albums/42".into()),
            ..Default::default()
        }
    }

    #[test]
    fn normalizes_seller_and_category_segments() {
        let path = AssetPathResolver.resolve(
            &ctx(),
            "https://img.example/photo/1.jpg",
            Some(AssetRole::ProductImage),
        );
        let mut segments = path.split('/');
        assert_eq!(segments.next(), Some("acme"));
        assert_eq!(segments.next(), Some("shoes"));
    }

    #[test]
    fn collapses_internal_whitespace_runs() {
        assert_eq!(normalize_token("Summer  Line\tShoes", UNKNOWN_CATEGORY), "summer_line_shoes");
        assert_eq!(normalize_token("   ", UNKNOWN_SELLER), UNKNOWN_SELLER);
    }

    #[test]
    fn album_id_is_truncated_sha1() {
        // First 10 hex chars of sha1("https://x.example/albums/42").
        assert_eq!(album_id("https://x.example/albums/42"), "945c584735");
    }

    #[test]
    fn filename_is_full_sha1_of_asset_url() {
        let path = AssetPathResolver.resolve(
            &ctx(),
            "https://img.example/photo/1.jpg",
            Some(AssetRole::ProductImage),
        );
        assert_eq!(
            path,
            "acme/shoes/945c584735/product_image/ae50fabf29a91c510521913a3a31c96ed77e714e.jpg"
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let resolver = AssetPathResolver;
        let a = resolver.resolve(&ctx(), "https://photo.example/a/b/c.jpg?x=1", Some(AssetRole::SizeChartImage));
        let b = resolver.resolve(&ctx(), "https://photo.example/a/b/c.jpg?x=1", Some(AssetRole::SizeChartImage));
        assert_eq!(a, b);
        assert!(a.contains("/size_chart_image/"));
        assert!(a.ends_with("357003a7c9cb737b0ba5541c477b363811ccff37.jpg"));
    }

    #[test]
    fn missing_context_degrades_to_sentinels() {
        let path = AssetPathResolver.resolve(
            &CrawlContext::default(),
            "https://img.example/photo/1.jpg",
            None,
        );
        let mut segments = path.split('/');
        assert_eq!(segments.next(), Some(UNKNOWN_SELLER));
        assert_eq!(segments.next(), Some(UNKNOWN_CATEGORY));
        // sha1("unknown_album") truncated to the album id length.
        assert_eq!(segments.next(), Some("41f8685292"));
        assert_eq!(segments.next(), Some(UNKNOWN_ROLE));
    }

    #[test]
    fn url_hashes_do_not_collide_across_large_corpus() {
        let resolver = AssetPathResolver;
        let ctx = ctx();
        let mut seen = HashSet::new();
        for i in 0..10_000 {
            let url = format!("https://img.example/photo/{i}.jpg");
            let path = resolver.resolve(&ctx, &url, Some(AssetRole::ProductImage));
            assert!(seen.insert(path), "collision at url #{i}");
        }
    }
}
