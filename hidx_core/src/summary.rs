//! Index statistics.

use crate::blob::BlobStore;
use crate::error::Result;
use crate::index::MetadataStore;
use crate::indexer::Indexer;
use serde::Serialize;

/// Aggregate counts over the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// All records.
    pub total: u64,
    /// Records carrying a content digest.
    pub with_digest: u64,
    /// Paths recorded more than once.
    pub duplicate_path_groups: u64,
    /// Digest values shared by two or more records.
    pub duplicate_digest_groups: u64,
}

impl<B: BlobStore, M: MetadataStore> Indexer<B, M> {
    /// Count records and duplicate groups. Read-only.
    pub fn summarize(&self) -> Result<Summary> {
        let summary = Summary {
            total: self.index().count()?,
            with_digest: self.index().count_with_digest()?,
            duplicate_path_groups: self.index().group_by_path(2)?.len() as u64,
            duplicate_digest_groups: self.index().group_by_digest(2)?.len() as u64,
        };

        tracing::info!("Total number of files in the database: {}", summary.total);
        Ok(summary)
    }
}
