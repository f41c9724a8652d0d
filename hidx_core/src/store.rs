//! On-disk store layout and configuration.

use crate::blob::FsBlobStore;
use crate::digest::Algorithm;
use crate::error::{Error, Result};
use crate::index::SqliteIndex;
use crate::indexer::Indexer;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config";
const BLOBS_DIR: &str = "blobs";
const INDEX_FILE: &str = "index.sqlite";

/// A store root: blob directory, metadata index and config file.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
    algorithm: Algorithm,
}

impl Store {
    /// Initialize a store at the given path.
    ///
    /// Creates the directory structure:
    /// - `blobs/` for blob files
    /// - `index.sqlite` for file records
    /// - `config` file with version and digest algorithm
    ///
    /// Running it on an existing store leaves its contents alone.
    pub fn init<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let algorithm = Algorithm::Blake3;

        fs::create_dir_all(root.join(BLOBS_DIR))?;

        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            let config_content = format!("version=1\ndigest={}\n", algorithm.as_str());
            fs::write(&config_path, config_content)?;
        }

        // Creates the schema
        SqliteIndex::open(root.join(INDEX_FILE))?;

        tracing::debug!(root = %root.display(), "store initialized");
        Self::open(root)
    }

    /// Open an existing store at the given path.
    ///
    /// Validates the store structure and reads the configuration.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            return Err(Error::invalid_store(&root, "directory does not exist"));
        }

        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(Error::invalid_store(&root, "config file not found"));
        }

        let config_content = fs::read_to_string(&config_path)?;
        let algorithm = Self::parse_config(&root, &config_content)?;

        if !root.join(BLOBS_DIR).is_dir() {
            return Err(Error::invalid_store(&root, "blobs directory missing"));
        }

        Ok(Self { root, algorithm })
    }

    /// Open the store, creating it first if the root has no config yet.
    pub fn open_or_init<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if root.join(CONFIG_FILE).exists() {
            Self::open(root)
        } else {
            Self::init(root)
        }
    }

    /// Parse the config file to extract the digest algorithm.
    fn parse_config(root: &Path, content: &str) -> Result<Algorithm> {
        let mut version = None;
        let mut digest = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                match key.trim() {
                    "version" => version = Some(value.trim()),
                    "digest" => digest = Some(value.trim()),
                    _ => {}
                }
            }
        }

        if version != Some("1") {
            return Err(Error::invalid_store(
                root,
                format!("Unsupported config version: {:?}", version),
            ));
        }

        let digest = digest.ok_or_else(|| Error::invalid_store(root, "Missing digest in config"))?;
        Algorithm::parse(digest)
    }

    /// Get the root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the digest algorithm used by this store.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.root.join(BLOBS_DIR)
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    /// Connect to the blob directory and index.
    pub fn indexer(&self) -> Result<Indexer<FsBlobStore, SqliteIndex>> {
        let blobs = FsBlobStore::open(self.blobs_dir())?;
        let index = SqliteIndex::open(self.index_path())?;
        Ok(Indexer::new(blobs, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_init() {
        let temp_dir = TempDir::new().unwrap();
        let store_path = temp_dir.path().join("store");

        let store = Store::init(&store_path).unwrap();
        assert_eq!(store.root(), store_path);
        assert_eq!(store.algorithm(), Algorithm::Blake3);

        assert!(store_path.join("blobs").is_dir());
        assert!(store_path.join("index.sqlite").is_file());

        let config = fs::read_to_string(store_path.join("config")).unwrap();
        assert!(config.contains("version=1"));
        assert!(config.contains("digest=blake3-256"));
    }

    #[test]
    fn test_store_init_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::init(temp_dir.path()).unwrap();
        let indexer = store.indexer().unwrap();
        indexer.ingest(&write_file(temp_dir.path(), "f.txt"), false).unwrap();

        let store = Store::init(temp_dir.path()).unwrap();
        assert_eq!(store.indexer().unwrap().summarize().unwrap().total, 1);
    }

    fn write_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"content").unwrap();
        path
    }

    #[test]
    fn test_store_open_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let result = Store::open(temp_dir.path().join("nonexistent"));
        assert!(matches!(result, Err(Error::InvalidStore { .. })));
    }

    #[test]
    fn test_store_open_invalid_no_config() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Store::open(temp_dir.path()).is_err());
    }

    #[test]
    fn test_store_open_bad_config() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("blobs")).unwrap();

        fs::write(temp_dir.path().join("config"), "version=2\ndigest=blake3-256\n").unwrap();
        assert!(matches!(
            Store::open(temp_dir.path()),
            Err(Error::InvalidStore { .. })
        ));

        fs::write(temp_dir.path().join("config"), "version=1\ndigest=md5\n").unwrap();
        assert!(matches!(
            Store::open(temp_dir.path()),
            Err(Error::UnsupportedAlgorithm { .. })
        ));
    }

    #[test]
    fn test_open_or_init_creates() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("fresh");
        let store = Store::open_or_init(&root).unwrap();
        assert!(store.blobs_dir().is_dir());
        assert!(Store::open(&root).is_ok());
    }
}
