use super::{validate_key, BlobStore};
use crate::error::{ClientError, Result};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Blob store backed by a plain directory.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs_err::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key.trim_end_matches('/')))
    }
}

impl BlobStore for LocalStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path(key)?.exists())
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key)?;
        let parent = path.parent().unwrap_or(&self.root).to_path_buf();
        fs_err::create_dir_all(&parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        tmp.write_all(bytes)?;
        tmp.persist(&path).map_err(|e| ClientError::Io(e.error))?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ClientError::BlobNotFound(self.describe(key)))
            }
            Err(e) => Err(ClientError::Io(e)),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Io(e)),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.path(prefix)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let prefix = prefix.trim_matches('/');

        let mut keys = Vec::new();
        for entry in fs_err::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(".tmp") {
                continue;
            }
            let mut key = super::join_key(prefix, &name);
            if entry.file_type()?.is_dir() {
                key.push('/');
            }
            keys.push(key);
        }
        keys.sort();
        Ok(keys)
    }

    fn describe(&self, key: &str) -> String {
        self.root.join(key).display().to_string()
    }

    fn download(&self, key: &str, dest: &Path) -> Result<()> {
        let src = self.path(key)?;
        if !src.is_file() {
            return Err(ClientError::BlobNotFound(self.describe(key)));
        }
        if let Some(parent) = dest.parent() {
            fs_err::create_dir_all(parent)?;
        }
        fs_err::copy(&src, dest)?;
        Ok(())
    }
}
