//! Scratch file pool
//!
//! Every intermediate file of a scrub job (region sub-logs, merged logs,
//! fetched SCOs, new SCOs) is allocated by name from one scratch
//! directory. The owner of the directory cleans it up as a whole.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Named scratch files in one directory.
#[derive(Debug, Clone)]
pub struct FilePool {
    dir: PathBuf,
}

impl FilePool {
    /// Use `dir` (created if needed) as the pool directory.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(FilePool { dir })
    }

    /// Path for a fresh scratch file called `name`.
    ///
    /// A stale file of the same name is removed first.
    pub fn new_file(&self, name: &str) -> io::Result<PathBuf> {
        let path = self.dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(path)
    }

    /// Remove the scratch file `name`, ignoring failures.
    pub fn remove(&self, name: &str) {
        let path = self.dir.join(name);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "ignoring failure to remove scratch file");
            }
        }
    }

    /// Pool directory.
    pub fn directory(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_new_file_in_directory() {
        let dir = tempdir().unwrap();
        let pool = FilePool::new(dir.path().join("pool")).unwrap();
        let path = pool.new_file("rewritten_tlog").unwrap();
        assert_eq!(path.parent().unwrap(), pool.directory());
        assert!(!path.exists());
    }

    #[test]
    fn test_new_file_clears_stale() {
        let dir = tempdir().unwrap();
        let pool = FilePool::new(dir.path()).unwrap();
        fs::write(dir.path().join("x"), b"stale").unwrap();
        let path = pool.new_file("x").unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_missing_is_ignored() {
        let dir = tempdir().unwrap();
        let pool = FilePool::new(dir.path()).unwrap();
        pool.remove("never_created");
    }
}
