//! Comparing a directory against the index.

use crate::blob::BlobStore;
use crate::error::Result;
use crate::index::MetadataStore;
use crate::indexer::Indexer;
use crate::scan::scan;
use serde::Serialize;
use std::path::Path;

/// How many scanned paths are already indexed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub new_count: u64,
    pub existing_count: u64,
}

impl ReconcileStats {
    pub fn total(&self) -> u64 {
        self.new_count + self.existing_count
    }
}

impl<B: BlobStore, M: MetadataStore> Indexer<B, M> {
    /// Classify every file below `root` as new or already indexed.
    ///
    /// A path counts as existing when at least one record has exactly that
    /// `original_path` (string equality, no normalization). Read-only.
    pub fn reconcile(&self, root: &Path) -> Result<ReconcileStats> {
        let mut stats = ReconcileStats::default();

        for path in scan(root)? {
            let path = path?;
            let key = path.to_string_lossy();

            if !self.index().path_exists(&key)? {
                tracing::debug!(path = %key, "new");
                stats.new_count += 1;
            } else {
                tracing::debug!(path = %key, "already indexed");
                stats.existing_count += 1;
            }
        }

        tracing::info!("Number of new files: {}", stats.new_count);
        tracing::info!("Number of existing files: {}", stats.existing_count);
        Ok(stats)
    }
}
