//! Removing re-uploads whose content matches an earlier upload of the same path.

use crate::blob::BlobStore;
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::index::{FileRecord, MetadataStore, PathGroup, RecordId};
use crate::indexer::Indexer;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Counters from [`Indexer::resolve_duplicates`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    /// Paths with more than one record.
    pub candidate_groups: u64,
    /// Records (and blobs) removed. Always zero on a dry run.
    pub records_deleted: u64,
    /// Members skipped because their blob could not be digested.
    pub digest_failures: u64,
}

impl<B: BlobStore, M: MetadataStore> Indexer<B, M> {
    /// Delete content-identical re-uploads.
    ///
    /// Records are grouped by `original_path`. Inside each group with more
    /// than one member, every blob is digested; the first member seen with a
    /// given digest is kept and any later member with the same digest is
    /// deleted together with its blob. Which upload counts as first follows
    /// the index's enumeration order.
    ///
    /// A member whose blob cannot be read is skipped and never deleted.
    /// Store failures abort the run. With `dry_run` the candidate groups are
    /// only reported.
    pub fn resolve_duplicates(&self, dry_run: bool) -> Result<DedupStats> {
        let groups = self.index().group_by_path(2)?;
        let mut stats = DedupStats {
            candidate_groups: groups.len() as u64,
            ..DedupStats::default()
        };

        for group in groups {
            if dry_run {
                tracing::info!(
                    path = %group.original_path,
                    records = group.ids.len(),
                    "[dry run] found duplicate files for original path"
                );
                continue;
            }

            let duplicates = self.find_content_duplicates(&group, &mut stats)?;
            for (record, kept) in duplicates {
                self.remove_record(&record)?;
                stats.records_deleted += 1;
                tracing::info!(
                    id = %record.id,
                    blob = %record.blob_ref,
                    kept = %kept,
                    path = %group.original_path,
                    "deleted duplicate file"
                );
            }
        }

        Ok(stats)
    }

    /// Digest every member of `group` and pair each duplicate with the id of
    /// the first member sharing its digest.
    fn find_content_duplicates(
        &self,
        group: &PathGroup,
        stats: &mut DedupStats,
    ) -> Result<Vec<(FileRecord, RecordId)>> {
        let mut canonical: HashMap<Digest, RecordId> = HashMap::new();
        let mut duplicates = Vec::new();

        for &id in &group.ids {
            let Some(record) = self.index().get(id)? else {
                tracing::warn!(id = %id, "record vanished during duplicate check");
                continue;
            };

            let digest = match self.digest_blob(&record.blob_ref) {
                Ok(digest) => digest,
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(
                        id = %id,
                        blob = %record.blob_ref,
                        error = %e,
                        "cannot digest blob, leaving record alone"
                    );
                    stats.digest_failures += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match canonical.entry(digest) {
                Entry::Occupied(first) => duplicates.push((record, *first.get())),
                Entry::Vacant(slot) => {
                    slot.insert(record.id);
                    if record.content_digest != Some(digest) {
                        self.index().set_digest(record.id, &digest)?;
                    }
                }
            }
        }

        Ok(duplicates)
    }

    /// Delete a record and then its blob.
    ///
    /// A crash between the two steps leaves a blob with no record, which no
    /// operation will ever read again.
    fn remove_record(&self, record: &FileRecord) -> Result<()> {
        self.index().delete(record.id)?;
        match self.blobs().delete(&record.blob_ref) {
            Ok(()) => Ok(()),
            Err(e @ Error::BlobNotFound { .. }) => {
                tracing::warn!(blob = %record.blob_ref, error = %e, "blob already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::index::SqliteIndex;
    use crate::indexer::testing::*;
    use std::collections::HashSet;

    #[test]
    fn test_reupload_of_same_content_is_removed() {
        let indexer = mem_indexer();
        upload(&indexer, "/d/a.txt", b"X");
        upload(&indexer, "/d/a.txt", b"X");

        let stats = indexer.resolve_duplicates(false).unwrap();
        assert_eq!(stats.candidate_groups, 1);
        assert_eq!(stats.records_deleted, 1);

        let remaining = indexer.index().find_by_path("/d/a.txt").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].content_digest, Some(Digest::of_bytes(b"X")));
        assert_eq!(indexer.blobs().len(), 1);
        assert_eq!(blob_bytes(&indexer, &remaining[0]), b"X");
    }

    #[test]
    fn test_different_paths_never_grouped() {
        let indexer = mem_indexer();
        upload(&indexer, "/d/c.txt", b"X");
        upload(&indexer, "/d/d.txt", b"Y");
        upload(&indexer, "/d/e.txt", b"X");

        let stats = indexer.resolve_duplicates(false).unwrap();
        assert_eq!(stats, DedupStats::default());
        assert_eq!(indexer.index().count().unwrap(), 3);
        assert_eq!(indexer.blobs().len(), 3);
    }

    #[test]
    fn test_same_path_different_content_kept() {
        let indexer = mem_indexer();
        upload(&indexer, "/d/a.txt", b"v1");
        upload(&indexer, "/d/a.txt", b"v2");
        upload(&indexer, "/d/a.txt", b"v1");

        let stats = indexer.resolve_duplicates(false).unwrap();
        assert_eq!(stats.records_deleted, 1);

        let digests: HashSet<_> = indexer
            .index()
            .find_by_path("/d/a.txt")
            .unwrap()
            .into_iter()
            .map(|r| r.content_digest.unwrap())
            .collect();
        assert_eq!(
            digests,
            HashSet::from([Digest::of_bytes(b"v1"), Digest::of_bytes(b"v2")])
        );
    }

    #[test]
    fn test_first_enumerated_member_survives() {
        let indexer = mem_indexer();
        let first = upload(&indexer, "/p", b"same");
        upload(&indexer, "/p", b"same");
        upload(&indexer, "/p", b"same");

        indexer.resolve_duplicates(false).unwrap();
        let remaining = indexer.index().find_by_path("/p").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, first);
    }

    #[test]
    fn test_dry_run_does_not_mutate() {
        let indexer = mem_indexer();
        upload(&indexer, "/d/a.txt", b"X");
        upload(&indexer, "/d/a.txt", b"X");
        let before = indexer.index().find_by_path("/d/a.txt").unwrap();

        let stats = indexer.resolve_duplicates(true).unwrap();
        assert_eq!(stats.candidate_groups, 1);
        assert_eq!(stats.records_deleted, 0);

        assert_eq!(indexer.index().find_by_path("/d/a.txt").unwrap(), before);
        assert_eq!(indexer.blobs().len(), 2);
    }

    #[test]
    fn test_missing_blob_member_is_skipped_not_deleted() {
        let indexer = mem_indexer();
        let broken = upload(&indexer, "/p", b"X");
        upload(&indexer, "/p", b"X");
        upload(&indexer, "/p", b"X");

        let broken_ref = indexer.index().get(broken).unwrap().unwrap().blob_ref;
        indexer.blobs().delete(&broken_ref).unwrap();

        let stats = indexer.resolve_duplicates(false).unwrap();
        assert_eq!(stats.digest_failures, 1);
        assert_eq!(stats.records_deleted, 1);

        let remaining = indexer.index().find_by_path("/p").unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().any(|r| r.id == broken));
    }

    #[test]
    fn test_stream_breaking_off_spares_that_member() {
        let indexer = Indexer::new(
            TruncatingBlobs::default(),
            SqliteIndex::open_in_memory().unwrap(),
        );
        let broken = upload(&indexer, "/p", b"XXXX");
        upload(&indexer, "/p", b"XXXX");
        upload(&indexer, "/p", b"XXXX");
        let broken_ref = indexer.index().get(broken).unwrap().unwrap().blob_ref;
        indexer.blobs().break_blob(&broken_ref);

        let stats = indexer.resolve_duplicates(false).unwrap();
        assert_eq!(stats.digest_failures, 1);
        assert_eq!(stats.records_deleted, 1);

        let remaining = indexer.index().find_by_path("/p").unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().any(|r| r.id == broken));
        assert!(indexer.blobs().contains(&broken_ref).unwrap());
    }

    #[test]
    fn test_store_failure_aborts_run() {
        let indexer = Indexer::new(MemoryBlobStore::new(), FlakyIndex::new());
        upload(&indexer, "/p", b"X");
        upload(&indexer, "/p", b"X");
        indexer.index().writes_fail.set(true);

        let err = indexer.resolve_duplicates(false).unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { .. }));
        assert_eq!(indexer.index().find_by_path("/p").unwrap().len(), 2);
        assert_eq!(indexer.blobs().len(), 2);
    }

    #[test]
    fn test_malformed_stored_digest_does_not_block_dedup() {
        let indexer = mem_indexer();
        let first = upload(&indexer, "/p", b"X");
        upload(&indexer, "/p", b"X");
        indexer.index().write_raw_digest(first, "not-hex");

        let stats = indexer.resolve_duplicates(false).unwrap();
        assert_eq!(stats.records_deleted, 1);
        let remaining = indexer.index().find_by_path("/p").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].content_digest, Some(Digest::of_bytes(b"X")));
    }

    #[test]
    fn test_rerun_is_a_no_op() {
        let indexer = mem_indexer();
        upload(&indexer, "/p", b"X");
        upload(&indexer, "/p", b"X");

        indexer.resolve_duplicates(false).unwrap();
        let stats = indexer.resolve_duplicates(false).unwrap();
        assert_eq!(stats, DedupStats::default());
    }

    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, ..ProptestConfig::default() })]

        /// N uploads with K distinct contents converge to K records.
        #[test]
        fn prop_dedup_converges(contents in prop::collection::vec(0u8..4, 1..10)) {
            let indexer = mem_indexer();
            for c in &contents {
                upload(&indexer, "/same/path", &[*c]);
            }
            let distinct: HashSet<u8> = contents.iter().copied().collect();

            let stats = indexer.resolve_duplicates(false)?;
            prop_assert_eq!(stats.records_deleted as usize, contents.len() - distinct.len());

            let remaining = indexer.index().find_by_path("/same/path")?;
            prop_assert_eq!(remaining.len(), distinct.len());
            let digests: HashSet<_> = remaining.iter().map(|r| r.content_digest).collect();
            prop_assert_eq!(digests.len(), distinct.len());
            prop_assert_eq!(indexer.blobs().len(), distinct.len());
        }
    }
}
