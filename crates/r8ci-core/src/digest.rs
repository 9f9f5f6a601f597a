use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
struct FileDigest {
    path: PathBuf,
    digest: Option<String>,
}

/// Content snapshot of the files a long-running worker was started from.
#[derive(Debug, Clone)]
pub struct SourceWatch {
    files: Vec<FileDigest>,
}

fn digest_file(path: &Path) -> std::io::Result<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(format!("{:x}", Sha256::digest(&bytes)))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

impl SourceWatch {
    pub fn snapshot<I, P>(paths: I) -> std::io::Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut files = Vec::new();
        for path in paths {
            let path = path.as_ref().to_path_buf();
            let digest = digest_file(&path)?;
            files.push(FileDigest { path, digest });
        }
        Ok(Self { files })
    }

    pub fn empty() -> Self {
        Self { files: Vec::new() }
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.path.as_path())
    }

    /// Files whose content differs from the snapshot.
    pub fn changed_files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut changed = Vec::new();
        for file in &self.files {
            if digest_file(&file.path)? != file.digest {
                changed.push(file.path.clone());
            }
        }
        Ok(changed)
    }

    pub fn changed(&self) -> std::io::Result<bool> {
        Ok(!self.changed_files()?.is_empty())
    }

    pub fn combined_digest(&self) -> String {
        let mut hasher = Sha256::new();
        for file in &self.files {
            hasher.update(file.path.to_string_lossy().as_bytes());
            hasher.update(file.digest.as_deref().unwrap_or("-").as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}
