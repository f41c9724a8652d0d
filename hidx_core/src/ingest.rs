//! Uploading files into the blob store and index.

use crate::blob::{BlobRef, BlobStore};
use crate::error::{Error, Result};
use crate::index::{MetadataStore, RecordId};
use crate::indexer::Indexer;
use crate::scan::scan;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// What a single [`Indexer::ingest`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Nothing was written.
    DryRun,
    /// A new blob and a new record were created.
    Ingested { id: RecordId, blob_ref: BlobRef },
}

/// Counters from [`Indexer::ingest_dir`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Files found below the root.
    pub total: u64,
    /// Paths visited.
    pub processed: u64,
    /// Paths that produced a new record (zero on a dry run).
    pub ingested: u64,
    /// Paths that could not be read.
    pub failed: u64,
}

impl<B: BlobStore, M: MetadataStore> Indexer<B, M> {
    /// Upload one file and record it under its path.
    ///
    /// There is no existence check: every call stores a new blob and inserts
    /// a new record, even when the same path was ingested before. Duplicate
    /// resolution cleans that up later. With `dry_run` nothing is touched.
    pub fn ingest(&self, path: &Path, dry_run: bool) -> Result<IngestOutcome> {
        let original_path = path.to_string_lossy();

        if dry_run {
            tracing::info!(path = %original_path, "[dry run] file would be uploaded");
            return Ok(IngestOutcome::DryRun);
        }

        let mut file = fs::File::open(path).map_err(|e| Error::source_unreadable(path, e))?;
        let blob_ref = self.blobs().put(&mut file).map_err(|e| match e {
            Error::ReadError { source } => Error::source_unreadable(path, source),
            other => other,
        })?;
        drop(file);
        tracing::info!(blob = %blob_ref, path = %original_path, "uploaded file");

        let id = match self.index().insert(&blob_ref, &original_path) {
            Ok(id) => id,
            Err(e) => {
                // Don't leave a blob nobody points at.
                if let Err(cleanup) = self.blobs().delete(&blob_ref) {
                    tracing::warn!(blob = %blob_ref, error = %cleanup, "failed to remove unrecorded blob");
                }
                return Err(e);
            }
        };

        Ok(IngestOutcome::Ingested { id, blob_ref })
    }

    /// Ingest every file below `root`.
    ///
    /// The tree is listed in full before the first upload so progress can be
    /// reported against a total; a scan failure therefore uploads nothing.
    /// Unreadable files are logged and counted; a store failure stops the run.
    pub fn ingest_dir(&self, root: &Path, dry_run: bool) -> Result<IngestStats> {
        let paths = scan(root)?.collect::<Result<Vec<_>>>()?;
        let mut stats = IngestStats {
            total: paths.len() as u64,
            ..IngestStats::default()
        };
        tracing::info!("Total files to process: {}", stats.total);

        for path in paths {
            stats.processed += 1;

            match self.ingest(&path, dry_run) {
                Ok(IngestOutcome::Ingested { .. }) => stats.ingested += 1,
                Ok(IngestOutcome::DryRun) => {}
                Err(e @ Error::SourceUnreadable { .. }) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                    stats.failed += 1;
                }
                Err(e) => return Err(e),
            }

            tracing::info!("Progress: {}/{} files processed", stats.processed, stats.total);
        }

        Ok(stats)
    }
}
