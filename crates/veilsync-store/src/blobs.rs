use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};
use veilsync_shared::BlockHash;

use crate::error::{Result, StoreError};

/// Write-once blob files named after their block hash.
///
/// File names come only from validated [`BlockHash`] values (64 hex chars),
/// so a name can never escape the base directory.
#[derive(Debug, Clone)]
pub struct BlobDir {
    base_path: PathBuf,
}

impl BlobDir {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_path)?;
        info!(path = %base_path.display(), "Blob directory initialized");
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.blob_path(hash).exists()
    }

    /// Write `data` under `hash` if nothing is stored there yet.
    /// Returns `false` when the blob already existed; it is never overwritten.
    pub fn write_once(&self, hash: &BlockHash, data: &[u8]) -> Result<bool> {
        let path = self.blob_path(hash);
        if path.exists() {
            return Ok(false);
        }

        // each writer gets its own temp file; the link into place never clobbers
        let mut tmp = NamedTempFile::new_in(&self.base_path)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        match tmp.persist_noclobber(&path) {
            Ok(_) => {}
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.error.into()),
        }

        debug!(hash = %hash.short(), size = data.len(), "Stored blob");
        Ok(true)
    }

    pub fn read(&self, hash: &BlockHash) -> Result<Vec<u8>> {
        match fs::read(self.blob_path(hash)) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    fn blob_path(&self, hash: &BlockHash) -> PathBuf {
        self.base_path.join(format!("{hash}.dat"))
    }
}
