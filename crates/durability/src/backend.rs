//! Object store interface
//!
//! TLogs and SCOs end up as named objects in a per-volume namespace of an
//! object store. The pipeline only needs a handful of whole-object
//! operations, captured by the `Backend` trait. Each reader, writer and
//! prefetch thread holds its own handle, obtained through `clone_backend`.
//!
//! `LocalBackend` stores a namespace as a directory, one file per object.

use crate::error::BackendError;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;
use voltlog_core::CheckSum;

/// Whether a read must observe the latest version of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsistOnLatest {
    /// Any version will do
    No,
    /// Must be the latest version
    Yes,
}

/// Whether a write may replace an existing object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteObject {
    /// Fail if the object exists
    Forbid,
    /// Replace an existing object
    Allow,
}

/// Whether removing a missing object is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectMayNotExist {
    /// Missing object is an error
    No,
    /// Missing object is fine
    Yes,
}

/// Whole-object access to one namespace of an object store.
pub trait Backend: Send + Sync {
    /// Namespace this handle operates on.
    fn namespace(&self) -> &str;

    /// Whether `name` exists.
    fn exists(&self, name: &str) -> Result<bool, BackendError>;

    /// Download `name` into the local file `dest`.
    fn read(&self, dest: &Path, name: &str, insist: InsistOnLatest) -> Result<(), BackendError>;

    /// Upload the local file `src` as `name`.
    ///
    /// When `checksum` is given the store verifies the uploaded data
    /// against it.
    fn write(
        &self,
        src: &Path,
        name: &str,
        overwrite: OverwriteObject,
        checksum: Option<&CheckSum>,
    ) -> Result<(), BackendError>;

    /// Delete `name`.
    fn remove(&self, name: &str, may_not_exist: ObjectMayNotExist) -> Result<(), BackendError>;

    /// Names of all objects in the namespace.
    fn list_objects(&self) -> Result<Vec<String>, BackendError>;

    /// Independent handle to the same namespace.
    fn clone_backend(&self) -> Box<dyn Backend>;
}

const PARTIAL_PREFIX: &str = ".partial-";

/// Backend keeping each namespace as a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    dir: PathBuf,
    namespace: String,
}

impl LocalBackend {
    /// Open (creating if needed) namespace `namespace` under `root`.
    pub fn new(root: impl AsRef<Path>, namespace: impl Into<String>) -> io::Result<Self> {
        let namespace = namespace.into();
        let dir = root.as_ref().join(&namespace);
        fs::create_dir_all(&dir)?;
        Ok(LocalBackend { dir, namespace })
    }

    /// Directory holding this namespace's objects.
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn object_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn io_error(&self, name: &str, source: io::Error) -> BackendError {
        BackendError::Io {
            name: name.to_string(),
            namespace: self.namespace.clone(),
            source,
        }
    }

    fn not_found(&self, name: &str) -> BackendError {
        BackendError::ObjectNotFound {
            name: name.to_string(),
            namespace: self.namespace.clone(),
        }
    }
}

fn checksum_file(path: &Path) -> io::Result<u32> {
    let mut file = File::open(path)?;
    let mut checksum = CheckSum::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        checksum.update(&buf[..n]);
    }
    Ok(checksum.value())
}

impl Backend for LocalBackend {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn exists(&self, name: &str) -> Result<bool, BackendError> {
        Ok(self.object_path(name).is_file())
    }

    fn read(&self, dest: &Path, name: &str, _insist: InsistOnLatest) -> Result<(), BackendError> {
        let src = self.object_path(name);
        if !src.is_file() {
            return Err(self.not_found(name));
        }
        fs::copy(&src, dest).map_err(|e| self.io_error(name, e))?;
        debug!(
            target: "voltlog::backend",
            namespace = %self.namespace,
            name,
            dest = %dest.display(),
            "read object"
        );
        Ok(())
    }

    fn write(
        &self,
        src: &Path,
        name: &str,
        overwrite: OverwriteObject,
        checksum: Option<&CheckSum>,
    ) -> Result<(), BackendError> {
        let final_path = self.object_path(name);
        if overwrite == OverwriteObject::Forbid && final_path.exists() {
            return Err(BackendError::ObjectExists {
                name: name.to_string(),
                namespace: self.namespace.clone(),
            });
        }

        if let Some(expected) = checksum {
            let actual = checksum_file(src).map_err(|e| self.io_error(name, e))?;
            if actual != expected.value() {
                return Err(BackendError::ChecksumMismatch {
                    name: name.to_string(),
                    namespace: self.namespace.clone(),
                    expected: expected.value(),
                    actual,
                });
            }
        }

        // copy-fsync-rename so readers never see a partial object
        let temp_path = self.dir.join(format!("{}{}", PARTIAL_PREFIX, name));
        fs::copy(src, &temp_path).map_err(|e| self.io_error(name, e))?;
        File::open(&temp_path)
            .and_then(|f| f.sync_all())
            .map_err(|e| self.io_error(name, e))?;
        fs::rename(&temp_path, &final_path).map_err(|e| self.io_error(name, e))?;

        debug!(
            target: "voltlog::backend",
            namespace = %self.namespace,
            name,
            "wrote object"
        );
        Ok(())
    }

    fn remove(&self, name: &str, may_not_exist: ObjectMayNotExist) -> Result<(), BackendError> {
        match fs::remove_file(self.object_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => match may_not_exist {
                ObjectMayNotExist::Yes => Ok(()),
                ObjectMayNotExist::No => Err(self.not_found(name)),
            },
            Err(e) => Err(self.io_error(name, e)),
        }
    }

    fn list_objects(&self) -> Result<Vec<String>, BackendError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| self.io_error("", e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.io_error("", e))?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with(PARTIAL_PREFIX) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn clone_backend(&self) -> Box<dyn Backend> {
        Box::new(self.clone())
    }
}
