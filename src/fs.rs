//! Filesystem access for ingestion.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{LoadResult, LoaderError};

/// A read-only view of the files to load.
pub trait FileSystem {
    /// All files under `root`, as `/`-separated paths relative to `root`,
    /// sorted. Hidden entries are skipped.
    fn list(&self, root: &str) -> LoadResult<Vec<String>>;

    /// Contents of the file at `root`/`path`.
    fn read(&self, root: &str, path: &str) -> LoadResult<Vec<u8>>;

    /// Handle passed to file processors so they can open sibling files.
    fn handle(&self, root: &str) -> String;
}

/// The local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn list(&self, root: &str) -> LoadResult<Vec<String>> {
        let root_path = Path::new(root);
        if !root_path.is_dir() {
            return Err(LoaderError::Config(format!(
                "'{}' is not a directory",
                root
            )));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(root_path)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name().to_str()));

        for entry in walker {
            let entry = entry.map_err(|e| LoaderError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root_path)
                .unwrap_or(entry.path());
            files.push(to_slash(relative));
        }

        files.sort();
        Ok(files)
    }

    fn read(&self, root: &str, path: &str) -> LoadResult<Vec<u8>> {
        Ok(std::fs::read(Path::new(root).join(path))?)
    }

    fn handle(&self, root: &str) -> String {
        std::fs::canonicalize(root)
            .unwrap_or_else(|_| PathBuf::from(root))
            .display()
            .to_string()
    }
}

fn is_hidden(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.starts_with('.'))
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// An in-memory filesystem keyed by `root`-relative path.
///
/// Every root sees the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file.
    pub fn with(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&mut self, path: &str, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.to_string(), contents.into());
    }
}

impl FileSystem for MemoryFs {
    fn list(&self, _root: &str) -> LoadResult<Vec<String>> {
        Ok(self
            .files
            .keys()
            .filter(|p| !p.split('/').any(|part| part.starts_with('.')))
            .cloned()
            .collect())
    }

    fn read(&self, _root: &str, path: &str) -> LoadResult<Vec<u8>> {
        self.files.get(path).cloned().ok_or_else(|| {
            LoaderError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path),
            ))
        })
    }

    fn handle(&self, root: &str) -> String {
        format!("memory:{}", root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_fs() {
        let fs = MemoryFs::new()
            .with("b.sql", "select 2")
            .with("a/c.py", "x")
            .with(".git/config", "ignored");
        assert_eq!(fs.list("/").unwrap(), vec!["a/c.py", "b.sql"]);
        assert_eq!(fs.read("/", "b.sql").unwrap(), b"select 2".to_vec());
        assert!(fs.read("/", "missing.sql").is_err());
    }

    #[test]
    fn test_local_fs_lists_relative_sorted() {
        let dir = std::env::temp_dir().join(format!("schemaload-fs-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::create_dir_all(dir.join(".hidden")).unwrap();
        std::fs::write(dir.join("z.sql"), "select 1").unwrap();
        std::fs::write(dir.join("nested/a.sql"), "select 2").unwrap();
        std::fs::write(dir.join(".hidden/x.sql"), "select 3").unwrap();

        let root = dir.to_str().unwrap();
        let files = LocalFs.list(root).unwrap();
        assert_eq!(files, vec!["nested/a.sql", "z.sql"]);
        assert_eq!(LocalFs.read(root, "nested/a.sql").unwrap(), b"select 2".to_vec());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_local_fs_rejects_missing_root() {
        assert!(matches!(
            LocalFs.list("/definitely/not/here"),
            Err(LoaderError::Config(_))
        ));
    }
}
