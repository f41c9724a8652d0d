//! Blob storage: opaque byte content addressed by handle.

use crate::digest::CHUNK_SIZE;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Opaque handle to a stored blob.
///
/// Handles are random, not derived from content: two uploads of the same
/// bytes get two different handles.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobRef(String);

impl BlobRef {
    /// Allocate a fresh handle.
    pub fn generate() -> Self {
        BlobRef(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Wrap an existing handle string.
    pub fn new(s: impl Into<String>) -> Self {
        BlobRef(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobRef({})", self.0)
    }
}

/// A repository of immutable blobs.
pub trait BlobStore {
    /// Store everything `source` yields as a new blob.
    ///
    /// A failure reading `source` is reported as [`Error::ReadError`].
    fn put(&self, source: &mut dyn Read) -> Result<BlobRef>;

    /// Open a blob for streaming reads.
    fn get(&self, blob_ref: &BlobRef) -> Result<Box<dyn Read>>;

    /// Remove a blob. Fails with [`Error::BlobNotFound`] if it is absent.
    fn delete(&self, blob_ref: &BlobRef) -> Result<()>;

    /// Whether the blob exists.
    fn contains(&self, blob_ref: &BlobRef) -> Result<bool>;
}

/// Copy `source` into `sink` in [`CHUNK_SIZE`] pieces, keeping read and
/// write failures apart.
fn copy_chunked(source: &mut dyn Read, sink: &mut dyn Write) -> Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::read_error(e)),
        };
        sink.write_all(&buf[..n])?;
        total += n as u64;
    }

    Ok(total)
}

const SHORT_HANDLE_SHARD: &str = "_";

/// Blobs kept as plain files under `<root>/<prefix>/<suffix>`.
#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Use `root` as the blob directory, creating it if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a blob file: the first two handle characters shard the directory.
    ///
    /// Handles of two characters or fewer have no suffix left to name the
    /// file, so they get a `.blob` file in the `_` shard.
    pub fn blob_path(&self, blob_ref: &BlobRef) -> PathBuf {
        let s = blob_ref.as_str();
        match s.char_indices().nth(2) {
            Some((split, _)) => {
                let (prefix, suffix) = s.split_at(split);
                self.root.join(prefix).join(suffix)
            }
            None => self.root.join(SHORT_HANDLE_SHARD).join(format!("{s}.blob")),
        }
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, source: &mut dyn Read) -> Result<BlobRef> {
        let blob_ref = BlobRef::generate();
        let path = self.blob_path(&blob_ref);
        let shard = path
            .parent()
            .ok_or_else(|| Error::invalid_store(&self.root, "blob path has no parent"))?;
        fs::create_dir_all(shard)?;

        // Write atomically using tempfile
        let mut temp_file = tempfile::NamedTempFile::new_in(shard)?;
        let written = copy_chunked(source, &mut temp_file)?;
        temp_file.flush()?;
        temp_file.persist(&path)?;

        tracing::debug!(blob = %blob_ref, bytes = written, "blob written");
        Ok(blob_ref)
    }

    fn get(&self, blob_ref: &BlobRef) -> Result<Box<dyn Read>> {
        match fs::File::open(self.blob_path(blob_ref)) {
            Ok(file) => Ok(Box::new(io::BufReader::with_capacity(CHUNK_SIZE, file))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::blob_not_found(blob_ref.as_str()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, blob_ref: &BlobRef) -> Result<()> {
        let path = self.blob_path(blob_ref);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::blob_not_found(blob_ref.as_str()));
            }
            Err(e) => return Err(e.into()),
        }

        // Remove empty shard directories
        if let Some(shard) = path.parent()
            && let Ok(mut entries) = fs::read_dir(shard)
            && entries.next().is_none()
        {
            let _ = fs::remove_dir(shard);
        }

        Ok(())
    }

    fn contains(&self, blob_ref: &BlobRef) -> Result<bool> {
        Ok(self.blob_path(blob_ref).is_file())
    }
}

/// Blobs held in memory. Handy for tests and throwaway indexes.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<BlobRef, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<BlobRef, Vec<u8>>> {
        // A poisoned map is still a valid map.
        self.blobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, source: &mut dyn Read) -> Result<BlobRef> {
        let mut data = Vec::new();
        copy_chunked(source, &mut data)?;
        let blob_ref = BlobRef::generate();
        self.lock().insert(blob_ref.clone(), data);
        Ok(blob_ref)
    }

    fn get(&self, blob_ref: &BlobRef) -> Result<Box<dyn Read>> {
        let data = self
            .lock()
            .get(blob_ref)
            .cloned()
            .ok_or_else(|| Error::blob_not_found(blob_ref.as_str()))?;
        Ok(Box::new(io::Cursor::new(data)))
    }

    fn delete(&self, blob_ref: &BlobRef) -> Result<()> {
        self.lock()
            .remove(blob_ref)
            .map(|_| ())
            .ok_or_else(|| Error::blob_not_found(blob_ref.as_str()))
    }

    fn contains(&self, blob_ref: &BlobRef) -> Result<bool> {
        Ok(self.lock().contains_key(blob_ref))
    }
}
