//! Filling in content digests on existing records.

use crate::blob::BlobStore;
use crate::error::Result;
use crate::index::MetadataStore;
use crate::indexer::Indexer;
use serde::Serialize;

/// Records are pulled from the index this many at a time.
pub const BACKFILL_BATCH_SIZE: usize = 10;

/// Counters from [`Indexer::backfill_digests`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillStats {
    /// Records whose digest was computed and written.
    pub processed: u64,
    /// Records left as they were because their blob could not be read.
    pub skipped: u64,
}

impl<B: BlobStore, M: MetadataStore> Indexer<B, M> {
    /// Compute and store the content digest of every record.
    ///
    /// Walks the whole index in batches of [`BACKFILL_BATCH_SIZE`] and
    /// rewrites `content_digest` from the blob bytes, so re-running it
    /// writes the same values again. Records whose blob is missing or
    /// unreadable are skipped with a warning.
    pub fn backfill_digests(&self) -> Result<BackfillStats> {
        let mut stats = BackfillStats::default();
        let mut after = None;

        loop {
            let batch = self.index().batch_after(after, BACKFILL_BATCH_SIZE)?;
            let Some(last) = batch.last() else {
                break;
            };
            after = Some(last.id);

            for record in &batch {
                match self.digest_blob(&record.blob_ref) {
                    Ok(digest) => {
                        self.index().set_digest(record.id, &digest)?;
                        stats.processed += 1;
                        tracing::info!(id = %record.id, digest = %digest, "updated digest");
                    }
                    Err(e) if e.is_recoverable() => {
                        stats.skipped += 1;
                        tracing::warn!(
                            id = %record.id,
                            blob = %record.blob_ref,
                            error = %e,
                            "skipping record"
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::digest::Digest;
    use crate::error::Error;
    use crate::index::{FileRecord, SqliteIndex};
    use crate::indexer::testing::*;

    fn all_records(indexer: &MemIndexer) -> Vec<FileRecord> {
        indexer.index().batch_after(None, usize::MAX >> 1).unwrap()
    }

    #[test]
    fn test_backfill_sets_digests_across_batches() {
        let indexer = mem_indexer();
        let total = BACKFILL_BATCH_SIZE * 2 + 3;
        for i in 0..total {
            upload(&indexer, &format!("/f{i}"), format!("content {i}").as_bytes());
        }

        let stats = indexer.backfill_digests().unwrap();
        assert_eq!(stats.processed, total as u64);
        assert_eq!(stats.skipped, 0);

        for record in all_records(&indexer) {
            let expected = Digest::of_bytes(&blob_bytes(&indexer, &record));
            assert_eq!(record.content_digest, Some(expected));
        }
    }

    #[test]
    fn test_backfill_is_idempotent() {
        let indexer = mem_indexer();
        upload(&indexer, "/a", b"A");
        upload(&indexer, "/b", b"B");

        indexer.backfill_digests().unwrap();
        let first = all_records(&indexer);
        let stats = indexer.backfill_digests().unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(all_records(&indexer), first);
    }

    #[test]
    fn test_backfill_skips_missing_blob() {
        let indexer = mem_indexer();
        let broken = upload(&indexer, "/a", b"A");
        upload(&indexer, "/b", b"B");
        let broken_ref = indexer.index().get(broken).unwrap().unwrap().blob_ref;
        indexer.blobs().delete(&broken_ref).unwrap();

        let stats = indexer.backfill_digests().unwrap();
        assert_eq!(stats, BackfillStats { processed: 1, skipped: 1 });
        assert_eq!(
            indexer.index().get(broken).unwrap().unwrap().content_digest,
            None
        );
    }

    #[test]
    fn test_backfill_skips_stream_that_breaks_off() {
        let indexer = Indexer::new(
            TruncatingBlobs::default(),
            SqliteIndex::open_in_memory().unwrap(),
        );
        let broken = upload(&indexer, "/a", b"AAAA");
        let healthy = upload(&indexer, "/b", b"BBBB");
        let broken_ref = indexer.index().get(broken).unwrap().unwrap().blob_ref;
        indexer.blobs().break_blob(&broken_ref);

        let stats = indexer.backfill_digests().unwrap();
        assert_eq!(stats, BackfillStats { processed: 1, skipped: 1 });
        assert_eq!(indexer.index().get(broken).unwrap().unwrap().content_digest, None);
        assert_eq!(
            indexer.index().get(healthy).unwrap().unwrap().content_digest,
            Some(Digest::of_bytes(b"BBBB"))
        );
    }

    #[test]
    fn test_backfill_stops_on_store_failure() {
        let indexer = Indexer::new(MemoryBlobStore::new(), FlakyIndex::new());
        upload(&indexer, "/a", b"A");
        indexer.index().writes_fail.set(true);

        let err = indexer.backfill_digests().unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { .. }));
    }

    #[test]
    fn test_backfill_repairs_malformed_digest() {
        let indexer = mem_indexer();
        let corrupt = upload(&indexer, "/a", b"A");
        let healthy = upload(&indexer, "/b", b"B");
        indexer.index().write_raw_digest(corrupt, "zz");

        let stats = indexer.backfill_digests().unwrap();
        assert_eq!(stats, BackfillStats { processed: 2, skipped: 0 });
        assert_eq!(
            indexer.index().get(corrupt).unwrap().unwrap().content_digest,
            Some(Digest::of_bytes(b"A"))
        );
        assert_eq!(
            indexer.index().get(healthy).unwrap().unwrap().content_digest,
            Some(Digest::of_bytes(b"B"))
        );
    }

    #[test]
    fn test_backfill_empty_index() {
        let indexer = mem_indexer();
        assert_eq!(indexer.backfill_digests().unwrap(), BackfillStats::default());
    }
}
