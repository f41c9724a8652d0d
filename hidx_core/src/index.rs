//! Metadata index: one record per upload, linking a source path to a blob.

use crate::blob::BlobRef;
use crate::digest::Digest;
use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Identifier assigned to a record by the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata for one upload.
///
/// Several records may share an `original_path`; that is how re-uploads
/// show up until duplicate resolution runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: RecordId,
    pub blob_ref: BlobRef,
    pub original_path: String,
    pub content_digest: Option<Digest>,
}

/// Records sharing one `original_path`, ids in enumeration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathGroup {
    pub original_path: String,
    pub ids: Vec<RecordId>,
}

/// A digest value and how many records carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestGroup {
    pub digest: Digest,
    pub count: u64,
}

/// The document store holding [`FileRecord`]s.
pub trait MetadataStore {
    /// Insert a record for a freshly stored blob and return its id.
    fn insert(&self, blob_ref: &BlobRef, original_path: &str) -> Result<RecordId>;

    /// Fetch one record.
    fn get(&self, id: RecordId) -> Result<Option<FileRecord>>;

    /// All records whose `original_path` is exactly `path`.
    fn find_by_path(&self, path: &str) -> Result<Vec<FileRecord>>;

    /// Whether any record has exactly this `original_path`.
    fn path_exists(&self, path: &str) -> Result<bool>;

    /// Group records by `original_path`, keeping groups of at least `min_count`.
    fn group_by_path(&self, min_count: u64) -> Result<Vec<PathGroup>>;

    /// Group digested records by `content_digest`, keeping groups of at
    /// least `min_count`. Records without a digest are left out.
    fn group_by_digest(&self, min_count: u64) -> Result<Vec<DigestGroup>>;

    /// Write `content_digest` for a record.
    fn set_digest(&self, id: RecordId, digest: &Digest) -> Result<()>;

    /// Remove a record.
    fn delete(&self, id: RecordId) -> Result<()>;

    /// Total number of records.
    fn count(&self) -> Result<u64>;

    /// Number of records that carry a digest.
    fn count_with_digest(&self) -> Result<u64>;

    /// Up to `limit` records with ids greater than `after`, in id order.
    ///
    /// Each call is a complete page, so callers walking the index hold no
    /// cursor between batches.
    fn batch_after(&self, after: Option<RecordId>, limit: usize) -> Result<Vec<FileRecord>>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    blob_ref       TEXT NOT NULL UNIQUE,
    original_path  TEXT NOT NULL,
    content_digest TEXT
);
CREATE INDEX IF NOT EXISTS files_original_path ON files(original_path);
CREATE INDEX IF NOT EXISTS files_content_digest ON files(content_digest);
";

type RawRecord = (i64, String, String, Option<String>);

fn raw_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

/// A stored digest that does not parse is treated as absent, so the record
/// stays usable and the next backfill overwrites it.
fn decode_record((id, blob_ref, original_path, digest): RawRecord) -> FileRecord {
    let content_digest = digest.and_then(|hex| match Digest::from_hex(&hex) {
        Ok(digest) => Some(digest),
        Err(e) => {
            tracing::warn!(id, stored = %hex, error = %e, "ignoring malformed digest");
            None
        }
    });
    FileRecord {
        id: RecordId(id),
        blob_ref: BlobRef::new(blob_ref),
        original_path,
        content_digest,
    }
}

/// SQLite-backed [`MetadataStore`].
#[derive(Debug)]
pub struct SqliteIndex {
    conn: Connection,
}

impl SqliteIndex {
    /// Open (or create) the index database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    /// A private, empty index that lives as long as the value.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Overwrite the raw stored digest text, bypassing validation.
    #[cfg(test)]
    pub(crate) fn write_raw_digest(&self, id: RecordId, raw: &str) {
        self.conn
            .execute(
                "UPDATE files SET content_digest = ?1 WHERE id = ?2",
                params![raw, id.0],
            )
            .unwrap();
    }

    fn query_records(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, raw_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().map(decode_record).collect())
    }
}

impl MetadataStore for SqliteIndex {
    fn insert(&self, blob_ref: &BlobRef, original_path: &str) -> Result<RecordId> {
        self.conn.execute(
            "INSERT INTO files (blob_ref, original_path) VALUES (?1, ?2)",
            params![blob_ref.as_str(), original_path],
        )?;
        Ok(RecordId(self.conn.last_insert_rowid()))
    }

    fn get(&self, id: RecordId) -> Result<Option<FileRecord>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, blob_ref, original_path, content_digest FROM files WHERE id = ?1",
                params![id.0],
                raw_record,
            )
            .optional()?;
        Ok(raw.map(decode_record))
    }

    fn find_by_path(&self, path: &str) -> Result<Vec<FileRecord>> {
        self.query_records(
            "SELECT id, blob_ref, original_path, content_digest FROM files
             WHERE original_path = ?1 ORDER BY id",
            params![path],
        )
    }

    fn path_exists(&self, path: &str) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM files WHERE original_path = ?1)",
            params![path],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn group_by_path(&self, min_count: u64) -> Result<Vec<PathGroup>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT f.original_path, f.id FROM files f
             JOIN (SELECT original_path FROM files
                   GROUP BY original_path HAVING COUNT(*) >= ?1) g
               ON f.original_path = g.original_path
             ORDER BY f.original_path, f.id",
        )?;
        let rows = stmt.query_map(params![min_count as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut groups: Vec<PathGroup> = Vec::new();
        for row in rows {
            let (path, id) = row?;
            match groups.last_mut() {
                Some(group) if group.original_path == path => group.ids.push(RecordId(id)),
                _ => groups.push(PathGroup {
                    original_path: path,
                    ids: vec![RecordId(id)],
                }),
            }
        }
        Ok(groups)
    }

    fn group_by_digest(&self, min_count: u64) -> Result<Vec<DigestGroup>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT content_digest, COUNT(*) FROM files
             WHERE content_digest IS NOT NULL
             GROUP BY content_digest HAVING COUNT(*) >= ?1
             ORDER BY content_digest",
        )?;
        let rows = stmt
            .query_map(params![min_count as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let groups = rows
            .into_iter()
            .filter_map(|(hex, count)| match Digest::from_hex(&hex) {
                Ok(digest) => Some(DigestGroup {
                    digest,
                    count: count as u64,
                }),
                Err(e) => {
                    tracing::warn!(stored = %hex, error = %e, "ignoring malformed digest group");
                    None
                }
            })
            .collect();
        Ok(groups)
    }

    fn set_digest(&self, id: RecordId, digest: &Digest) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE files SET content_digest = ?1 WHERE id = ?2",
            params![digest.to_hex(), id.0],
        )?;
        if changed == 0 {
            return Err(Error::RecordNotFound { id: id.0 });
        }
        Ok(())
    }

    fn delete(&self, id: RecordId) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM files WHERE id = ?1", params![id.0])?;
        if changed == 0 {
            return Err(Error::RecordNotFound { id: id.0 });
        }
        Ok(())
    }

    fn count(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    fn count_with_digest(&self) -> Result<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM files WHERE content_digest IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    fn batch_after(&self, after: Option<RecordId>, limit: usize) -> Result<Vec<FileRecord>> {
        let after = after.map_or(i64::MIN, |id| id.0);
        self.query_records(
            "SELECT id, blob_ref, original_path, content_digest FROM files
             WHERE id > ?1 ORDER BY id LIMIT ?2",
            params![after, limit as i64],
        )
    }
}
