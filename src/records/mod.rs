//! Item and crawl-context records exchanged with the surrounding engine.
//!
//! The crawl context is the validated bag of descriptive fields (seller,
//! contact, category, album identifiers) propagated alongside a record
//! through the pipeline. The core never interprets these fields beyond
//! using seller, category, and the album URL as storage path components;
//! everything else rides along for the JSON export the surrounding system
//! owns.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating an incoming record.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("missing or empty context field: {0}")]
    MissingField(&'static str),
}

/// Descriptive fields carried from record to record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CrawlContext {
    #[serde(default)]
    pub seller: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub category_text: String,
    #[serde(default)]
    pub category_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_url: Option<String>,
}

impl CrawlContext {
    /// Trim string fields and reject records with missing required values.
    ///
    /// Seed data comes from an earlier crawl stage's JSON export; a blank
    /// seller or category there means that stage produced a broken record,
    /// which should surface here rather than as a misplaced image on disk.
    pub fn validate(&mut self) -> Result<(), RecordError> {
        fn required(value: &mut String, name: &'static str) -> Result<(), RecordError> {
            *value = value.trim().to_string();
            if value.is_empty() {
                return Err(RecordError::MissingField(name));
            }
            Ok(())
        }

        required(&mut self.seller, "seller")?;
        required(&mut self.contact, "contact")?;
        required(&mut self.category, "category")?;
        required(&mut self.category_text, "category_text")?;
        required(&mut self.category_link, "category_link")?;

        if let Some(ref mut url) = self.page_url {
            *url = url.trim().to_string();
        }
        if let Some(ref mut url) = self.album_url {
            *url = url.trim().to_string();
        }
        Ok(())
    }
}

/// One album's worth of candidate asset URLs plus its context.
///
/// `product_images_paths` and `size_chart_images_paths` start empty and are
/// filled by the fetch pipeline with the resolved storage paths of the
/// assets that downloaded successfully.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(flatten)]
    pub ctx: CrawlContext,
    #[serde(default)]
    pub product_images: Vec<String>,
    #[serde(default)]
    pub size_chart_images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_data: Option<serde_json::Value>,
    #[serde(default)]
    pub product_images_paths: Vec<String>,
    #[serde(default)]
    pub size_chart_images_paths: Vec<String>,
}

impl ImageRecord {
    /// Referer attached to every asset request for this record.
    /// The storefront refuses hotlinked image requests without it.
    pub fn referer(&self) -> String {
        self.ctx.album_url.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_ctx() -> CrawlContext {
        CrawlContext {
            seller: " Acme ".into(),
            contact: "wechat:acme".into(),
            category: "Shoes".into(),
            category_text: "Shoes / Sneakers".into(),
            category_link: "https://x.example/categories/shoes".into(),
            page_url: Some("https://x.example/categories/shoes?page=2 ".into()),
            page_number: Some(2),
            album_url: Some("https://x.example/albums/42".into()),
        }
    }

    #[test]
    fn validate_trims_and_accepts_complete_context() {
        let mut ctx = full_ctx();
        ctx.validate().unwrap();
        assert_eq!(ctx.seller, "Acme");
        assert_eq!(
            ctx.page_url.as_deref(),
            Some("https://x.example/categories/shoes?page=2")
        );
    }

    #[test]
    fn validate_rejects_blank_required_field() {
        let mut ctx = full_ctx();
        ctx.category = "   ".into();
        let err = ctx.validate().unwrap_err();
        assert!(matches!(err, RecordError::MissingField("category")));
    }

    #[test]
    fn record_roundtrips_through_json() {
        let record = ImageRecord {
            ctx: full_ctx(),
            product_images: vec!["https://img.example/photo/1.jpg".into()],
            ..Default::default()
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: ImageRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ctx.seller, " Acme ");
        assert_eq!(back.product_images.len(), 1);
        assert!(back.product_images_paths.is_empty());
    }

    #[test]
    fn referer_falls_back_to_empty() {
        let record = ImageRecord::default();
        assert_eq!(record.referer(), "");
    }
}
