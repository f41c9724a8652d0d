//! # hidx core
//!
//! Indexes files from a directory tree into a blob store and cleans up
//! re-uploads afterwards.
//!
//! Every ingestion stores a fresh blob and a fresh [`FileRecord`] that links
//! it to the file's original path; nothing is hashed up front. Duplicates are
//! found later by grouping records on their original path and comparing
//! BLAKE3 digests of the stored blobs.
//!
//! ## Features
//!
//! - Unconditional upload of a file or a whole directory tree
//! - Reconciliation of a directory against the index (new vs. indexed paths)
//! - Duplicate resolution per original path, by content digest
//! - Batched digest backfill for existing records
//! - Summary counts over the index
//!
//! Stores are reached through the [`BlobStore`] and [`MetadataStore`]
//! traits; [`Store`] wires up the on-disk pair.
//!
//! ## Example
//!
//! ```no_run
//! use hidx_core::Store;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open_or_init("./my-index")?;
//! let indexer = store.indexer()?;
//!
//! // Upload everything below ./photos
//! let stats = indexer.ingest_dir(Path::new("./photos"), false)?;
//! println!("Uploaded {} files", stats.ingested);
//!
//! // Drop re-uploads with identical content
//! let dedup = indexer.resolve_duplicates(false)?;
//! println!("Deleted {} duplicates", dedup.records_deleted);
//! # Ok(())
//! # }
//! ```

mod backfill;
mod blob;
mod dedup;
mod digest;
mod error;
mod index;
mod indexer;
mod ingest;
mod reconcile;
mod scan;
mod store;
mod summary;

pub use backfill::{BACKFILL_BATCH_SIZE, BackfillStats};
pub use blob::{BlobRef, BlobStore, FsBlobStore, MemoryBlobStore};
pub use dedup::DedupStats;
pub use digest::{Algorithm, CHUNK_SIZE, Digest};
pub use error::{Error, Result};
pub use index::{DigestGroup, FileRecord, MetadataStore, PathGroup, RecordId, SqliteIndex};
pub use indexer::Indexer;
pub use ingest::{IngestOutcome, IngestStats};
pub use reconcile::ReconcileStats;
pub use scan::{Scan, scan};
pub use store::Store;
pub use summary::Summary;
