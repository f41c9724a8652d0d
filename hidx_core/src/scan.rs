//! Filesystem walking.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Lazy walk over every regular file below a root.
///
/// Directories are not yielded. Order follows the filesystem and is not
/// stable between runs. The first traversal failure is yielded as
/// [`Error::DirectoryUnreadable`] and ends the walk; paths yielded before it
/// remain valid.
pub struct Scan {
    walker: ignore::Walk,
    done: bool,
}

/// Start walking `root`.
///
/// Fails immediately with [`Error::DirectoryUnreadable`] if `root` is missing
/// or is not a directory.
pub fn scan(root: &Path) -> Result<Scan> {
    let metadata = fs::metadata(root)
        .map_err(|e| Error::directory_unreadable(root, e.to_string()))?;
    if !metadata.is_dir() {
        return Err(Error::directory_unreadable(root, "not a directory"));
    }

    // Every file counts: hidden files and ignore files are not filtered.
    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .build();

    Ok(Scan {
        walker,
        done: false,
    })
}

impl Iterator for Scan {
    type Item = Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            match self.walker.next()? {
                Ok(entry) => {
                    if entry.file_type().is_some_and(|t| t.is_file()) {
                        return Some(Ok(entry.into_path()));
                    }
                }
                Err(err) => {
                    self.done = true;
                    let path = error_path(&err).unwrap_or_default();
                    return Some(Err(Error::directory_unreadable(path, err.to_string())));
                }
            }
        }
    }
}

/// Path attached to a walk error, if any.
fn error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        ignore::Error::Partial(errs) => errs.iter().find_map(error_path),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn collect(root: &Path) -> BTreeSet<PathBuf> {
        scan(root)
            .unwrap()
            .collect::<Result<BTreeSet<_>>>()
            .unwrap()
    }

    #[test]
    fn test_scan_nested_files_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), b"a").unwrap();
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::write(root.join("sub/b.txt"), b"b").unwrap();
        fs::write(root.join("sub/deeper/c.txt"), b"c").unwrap();
        fs::create_dir(root.join("empty")).unwrap();

        let paths = collect(root);
        let expected: BTreeSet<PathBuf> = ["a.txt", "sub/b.txt", "sub/deeper/c.txt"]
            .iter()
            .map(|p| root.join(p))
            .collect();
        assert_eq!(paths, expected);
    }

    #[test]
    fn test_scan_includes_hidden_and_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join(".hidden"), b"h").unwrap();
        fs::write(root.join(".gitignore"), b"skipped.txt\n").unwrap();
        fs::write(root.join("skipped.txt"), b"s").unwrap();

        let paths = collect(root);
        assert!(paths.contains(&root.join(".hidden")));
        assert!(paths.contains(&root.join("skipped.txt")));
        assert_eq!(paths.len(), 3);
    }

    #[test]
    fn test_scan_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(collect(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_scan_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let result = scan(&temp_dir.path().join("nope"));
        assert!(matches!(result, Err(Error::DirectoryUnreadable { .. })));
    }

    #[test]
    fn test_scan_file_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(scan(&file), Err(Error::DirectoryUnreadable { .. })));
    }
}
