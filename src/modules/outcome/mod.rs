//! Per-item fetch outcome aggregation.
//!
//! Collects the terminal result of every asset fetch belonging to one item
//! and partitions the successful paths by role into the item's output
//! fields. Failed fetches are dropped from the output: partial asset loss
//! is tolerated and the item still completes.

use crate::modules::storage::AssetRole;
use crate::records::ImageRecord;

/// Terminal result of a single asset fetch attempt chain.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Position of the asset within its item's candidate lists; keeps the
    /// output sequences ordered even when fetches complete out of order.
    pub sequence: usize,
    pub role: Option<AssetRole>,
    pub success: bool,
    pub resolved_path: String,
}

/// Output path sequences for one item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPaths {
    pub product_images_paths: Vec<String>,
    pub size_chart_images_paths: Vec<String>,
}

impl ItemPaths {
    /// Write the collected paths onto the record's output fields.
    pub fn apply(self, record: &mut ImageRecord) {
        record.product_images_paths = self.product_images_paths;
        record.size_chart_images_paths = self.size_chart_images_paths;
    }
}

/// Accumulator owned by a single item's processing context.
///
/// Never shared across items, so it needs no locking.
#[derive(Debug, Default)]
pub struct FetchResultAggregator {
    outcomes: Vec<FetchOutcome>,
}

impl FetchResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: FetchOutcome) {
        self.outcomes.push(outcome);
    }

    /// Partition successful outcomes by role, ordered by their position in
    /// the item's candidate lists. Unsuccessful outcomes are dropped.
    pub fn finish(mut self) -> ItemPaths {
        self.outcomes.sort_by_key(|outcome| outcome.sequence);

        let mut paths = ItemPaths::default();
        for outcome in self.outcomes {
            if !outcome.success {
                continue;
            }
            match outcome.role {
                Some(AssetRole::ProductImage) => {
                    paths.product_images_paths.push(outcome.resolved_path);
                }
                Some(AssetRole::SizeChartImage) => {
                    paths.size_chart_images_paths.push(outcome.resolved_path);
                }
                None => {}
            }
        }
        paths
    }
}
