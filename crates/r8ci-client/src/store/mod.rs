mod gsutil;
mod local;

pub use gsutil::GsutilStore;
pub use local::LocalStore;

use crate::error::{ClientError, Result};
use r8ci_core::config::{StorageBackend, StorageConfig};
use std::path::Path;
use std::sync::Arc;

/// Key/value access to a bucket-like store.
///
/// Keys are `/`-separated and relative to the store root. Listing returns the
/// immediate children of a prefix, with directories suffixed by `/`.
pub trait BlobStore: Send + Sync {
    fn exists(&self, key: &str) -> Result<bool>;
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    /// Fails with [`ClientError::BlobNotFound`] when the key is absent.
    fn get(&self, key: &str) -> Result<Vec<u8>>;
    /// Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
    /// Full location of `key`, for messages.
    fn describe(&self, key: &str) -> String;

    fn download(&self, key: &str, dest: &Path) -> Result<()> {
        let bytes = self.get(key)?;
        if let Some(parent) = dest.parent() {
            fs_err::create_dir_all(parent)?;
        }
        fs_err::write(dest, bytes)?;
        Ok(())
    }

    fn get_string(&self, key: &str) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.get(key)?).trim().to_string())
    }

    /// Like `get_string`, but an absent key is `None`.
    fn get_optional(&self, key: &str) -> Result<Option<String>> {
        match self.get_string(key) {
            Ok(value) => Ok(Some(value)),
            Err(ClientError::BlobNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

pub fn join_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.starts_with('/') {
        return Err(ClientError::InvalidKey {
            key: key.to_string(),
            reason: "keys are relative to the store root".to_string(),
        });
    }
    if key.split('/').any(|part| part == "..") {
        return Err(ClientError::InvalidKey {
            key: key.to_string(),
            reason: "'..' is not allowed".to_string(),
        });
    }
    Ok(())
}

pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match config.backend {
        StorageBackend::Local => Arc::new(LocalStore::new(config.local_root())?),
        StorageBackend::Gsutil => Arc::new(GsutilStore::new(&config.root, &config.gsutil)),
    };
    Ok(store)
}
