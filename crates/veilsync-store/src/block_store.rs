//! Content-addressed block storage: the block index plus the blob directory.

use std::path::PathBuf;

use tracing::{debug, warn};
use veilsync_shared::constants::MAX_BLOCK_SIZE;
use veilsync_shared::types::infer_type_tag;
use veilsync_shared::BlockHash;

use crate::blobs::BlobDir;
use crate::database::Database;
use crate::error::{Result, StoreError};

#[derive(Debug, Clone)]
pub struct BlockStore {
    db: Database,
    blobs: BlobDir,
}

impl BlockStore {
    pub fn new(db: Database, blob_path: PathBuf) -> Result<Self> {
        Ok(Self {
            db,
            blobs: BlobDir::new(blob_path)?,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Store `data` under its SHA3-256 hash and mark it saved.
    ///
    /// Idempotent: a second `put` of the same bytes leaves the existing blob
    /// and record untouched apart from re-asserting the saved flags.
    pub fn put(&self, data: &[u8]) -> Result<BlockHash> {
        if data.len() > MAX_BLOCK_SIZE {
            return Err(StoreError::BlockTooLarge {
                size: data.len(),
                max: MAX_BLOCK_SIZE,
            });
        }

        let hash = BlockHash::of(data);
        self.blobs.write_once(&hash, data)?;
        let data_type = infer_type_tag(data);
        self.db.mark_block_saved(&hash, data_type.as_deref())?;

        debug!(hash = %hash.short(), size = data.len(), data_type = ?data_type, "saved block");
        Ok(hash)
    }

    /// Store downloaded `data` only if it hashes to `expected`.
    /// Returns `false`, writing nothing, on a mismatch.
    pub fn put_verified(&self, expected: &BlockHash, data: &[u8]) -> Result<bool> {
        let actual = BlockHash::of(data);
        if actual != *expected {
            warn!(
                expected = %expected.short(),
                actual = %actual.short(),
                "block content does not match its hash"
            );
            return Ok(false);
        }
        self.put(data)?;
        Ok(true)
    }

    pub fn get(&self, hash: &BlockHash) -> Result<Vec<u8>> {
        self.blobs.read(hash)
    }

    /// Record a hash learned from a peer as pending. Malformed hashes are
    /// ignored; returns `true` only if a new entry was added.
    pub fn record_known_hash(&self, hash: &str, saved: bool) -> Result<bool> {
        match BlockHash::parse(hash) {
            Ok(hash) => self.db.insert_block_hash(&hash, saved),
            Err(e) => {
                debug!(error = %e, "ignoring malformed block hash");
                Ok(false)
            }
        }
    }

    pub fn contains(&self, hash: &BlockHash) -> Result<bool> {
        self.db.has_block(hash)
    }

    pub fn list_unsaved(&self) -> Result<Vec<BlockHash>> {
        self.db.list_unsaved_blocks()
    }

    pub fn list_by_type(&self, data_type: &str) -> Result<Vec<BlockHash>> {
        self.db.list_blocks_by_type(data_type)
    }

    pub fn list_hashes(&self) -> Result<Vec<BlockHash>> {
        self.db.list_block_hashes()
    }

    pub fn set_type(&self, hash: &BlockHash, data_type: &str) -> Result<bool> {
        self.db.set_block_type(hash, data_type)
    }

    pub fn digest(&self) -> Result<String> {
        self.db.block_digest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (BlockStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        let store = BlockStore::new(db, dir.path().join("blocks")).unwrap();
        (store, dir)
    }

    #[test]
    fn test_put_get_roundtrip() {
        let (store, _dir) = test_store();
        for data in [&b""[..], b"a", b"\x00\xff binary \x10", b"-txt-hello world"] {
            let hash = store.put(data).unwrap();
            assert_eq!(store.get(&hash).unwrap(), data);
            assert_eq!(hash, BlockHash::of(data));
        }
    }

    #[test]
    fn test_put_is_idempotent() {
        let (store, _dir) = test_store();
        let first = store.put(b"same bytes").unwrap();
        let before = store.database().get_block_record(&first).unwrap();

        let second = store.put(b"same bytes").unwrap();
        let after = store.database().get_block_record(&second).unwrap();

        assert_eq!(first, second);
        assert_eq!(before, after);
        assert_eq!(store.list_hashes().unwrap().len(), 1);
    }

    #[test]
    fn test_put_infers_type() {
        let (store, _dir) = test_store();
        let hash = store.put(b"-txt-hello").unwrap();
        let record = store.database().get_block_record(&hash).unwrap();
        assert_eq!(record.data_type, "txt");
        assert!(record.data_found && record.data_saved);
        assert_eq!(store.list_by_type("txt").unwrap(), vec![hash]);
    }

    #[test]
    fn test_record_known_hash() {
        let (store, _dir) = test_store();
        let hash = "ab".repeat(32);

        assert!(store.record_known_hash(&hash, false).unwrap());
        assert!(!store.record_known_hash(&hash, false).unwrap());
        assert!(!store.record_known_hash(&hash.to_uppercase(), false).unwrap());
        assert!(!store.record_known_hash("not-a-hash", false).unwrap());

        let unsaved = store.list_unsaved().unwrap();
        assert_eq!(unsaved.len(), 1);
        assert_eq!(unsaved[0].as_str(), hash);
    }

    #[test]
    fn test_pending_becomes_saved() {
        let (store, _dir) = test_store();
        let data = b"arrives later";
        let hash = BlockHash::of(data);
        store.record_known_hash(hash.as_str(), false).unwrap();
        assert_eq!(store.list_unsaved().unwrap(), vec![hash.clone()]);

        assert!(store.put_verified(&hash, data).unwrap());
        assert!(store.list_unsaved().unwrap().is_empty());
    }

    #[test]
    fn test_put_verified_rejects_mismatch() {
        let (store, _dir) = test_store();
        let hash = BlockHash::of(b"expected");

        assert!(!store.put_verified(&hash, b"something else").unwrap());
        assert!(matches!(store.get(&hash), Err(StoreError::NotFound)));
        assert!(!store.contains(&BlockHash::of(b"something else")).unwrap());
    }

    #[test]
    fn test_set_type() {
        let (store, _dir) = test_store();
        let hash = store.put(b"untyped").unwrap();
        assert!(store.set_type(&hash, "pm").unwrap());
        assert_eq!(store.list_by_type("pm").unwrap(), vec![hash]);
        assert!(!store.set_type(&BlockHash::of(b"absent"), "pm").unwrap());
    }

    #[test]
    fn test_digest_tracks_index() {
        let (store, _dir) = test_store();
        let empty = store.digest().unwrap();
        assert_eq!(empty, BlockHash::of(b"").to_string());

        store.record_known_hash(&"cd".repeat(32), false).unwrap();
        let one = store.digest().unwrap();
        assert_ne!(empty, one);
        assert_eq!(one, store.digest().unwrap());
    }

    #[test]
    fn test_oversized_block_rejected() {
        let (store, _dir) = test_store();
        let data = vec![0u8; MAX_BLOCK_SIZE + 1];
        assert!(matches!(
            store.put(&data),
            Err(StoreError::BlockTooLarge { .. })
        ));
    }

    #[test]
    fn test_concurrent_put_same_bytes() {
        let (store, _dir) = test_store();

        for round in 0..10u8 {
            let data = vec![round; 256 * 1024];
            let hashes: Vec<BlockHash> = std::thread::scope(|s| {
                let handles: Vec<_> = (0..8)
                    .map(|_| s.spawn(|| store.put(&data).unwrap()))
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let expected = BlockHash::of(&data);
            assert!(hashes.iter().all(|h| *h == expected));
            assert_eq!(store.get(&expected).unwrap(), data);
            assert!(store.list_hashes().unwrap().contains(&expected));
        }
        assert!(store.list_unsaved().unwrap().is_empty());
    }
}
