//! The indexing engine.

use crate::blob::{BlobRef, BlobStore};
use crate::digest::Digest;
use crate::error::Result;
use crate::index::MetadataStore;

/// Runs index operations against one blob store and one metadata store.
///
/// Each operation lives in its own module as an `impl` block. All of them
/// run to completion on the calling thread; exactly one engine is expected
/// to work on a given pair of stores at a time.
#[derive(Debug)]
pub struct Indexer<B, M> {
    blobs: B,
    index: M,
}

impl<B: BlobStore, M: MetadataStore> Indexer<B, M> {
    /// Build an engine over already-connected stores.
    pub fn new(blobs: B, index: M) -> Self {
        Self { blobs, index }
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    pub fn index(&self) -> &M {
        &self.index
    }

    /// Stream a blob through the digest.
    pub(crate) fn digest_blob(&self, blob_ref: &BlobRef) -> Result<Digest> {
        Digest::compute(self.blobs.get(blob_ref)?)
    }
}
