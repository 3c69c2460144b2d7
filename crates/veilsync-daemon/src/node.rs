//! The local node: identity plus persisted stores.
//!
//! A data directory holds:
//! - `keys.txt`: the node's key pair, generated once
//! - `veilsync.db`: block index, directories and command queue
//! - `blocks/`: block content, one file per hash
//!
//! [`Node`] is cheap to clone; the control process, the peer-facing server
//! and the [`Communicator`] each hold their own copy.
//!
//! [`Communicator`]: crate::Communicator

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use veilsync_net::PeerAction;
use veilsync_shared::crypto::{self, SymmetricKey};
use veilsync_shared::{boxes, BlockHash, Identity};
use veilsync_store::{
    AddressRecord, BlockStore, Database, PeerField, PeerRecord, StoreError, DATABASE_FILE,
};

use crate::error::{DaemonError, Result};

pub const KEYS_FILE: &str = "keys.txt";
pub const BLOCKS_DIR: &str = "blocks";

/// Queue tag that stops the daemon loop.
pub const SHUTDOWN_COMMAND: &str = "shutdown";

#[derive(Clone)]
pub struct Node {
    identity: Arc<Identity>,
    db: Database,
    blocks: BlockStore,
    data_dir: PathBuf,
}

impl Node {
    /// Open the node stored in `data_dir`, initializing whatever is missing.
    /// An existing key file is loaded, never replaced.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db = Database::open_at(&data_dir.join(DATABASE_FILE))?;
        Self::with_database(data_dir, db)
    }

    /// Initialize a fresh node in `data_dir`. Fails if a database is
    /// already there.
    pub fn create(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db = Database::create_at(&data_dir.join(DATABASE_FILE))?;
        Self::with_database(data_dir, db)
    }

    fn with_database(data_dir: &Path, db: Database) -> Result<Self> {
        let identity = Identity::load_or_generate(&data_dir.join(KEYS_FILE))?;
        let blocks = BlockStore::new(db.clone(), data_dir.join(BLOCKS_DIR))?;

        info!(
            data_dir = %data_dir.display(),
            public_key = %identity.public_key(),
            "Node opened"
        );

        Ok(Self {
            identity: Arc::new(identity),
            db,
            blocks,
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The node's public identity, base32.
    pub fn public_key(&self) -> String {
        self.identity.public_key()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn blocks(&self) -> &BlockStore {
        &self.blocks
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // -- Blocks --------------------------------------------------------------

    /// Store locally created content. Returns its hash.
    pub fn add_local_block(&self, data: &[u8]) -> Result<BlockHash> {
        Ok(self.blocks.put(data)?)
    }

    pub fn set_block_type(&self, hash: &BlockHash, data_type: &str) -> Result<bool> {
        Ok(self.blocks.set_type(hash, data_type)?)
    }

    // -- Directory -----------------------------------------------------------

    pub fn list_peers(&self) -> Result<Vec<PeerRecord>> {
        Ok(self.db.list_peers()?)
    }

    pub fn list_addresses(&self) -> Result<Vec<AddressRecord>> {
        Ok(self.db.list_address_records()?)
    }

    pub fn add_address(&self, address: &str) -> Result<bool> {
        Ok(self.db.add_address(address)?)
    }

    /// Add seed addresses, skipping malformed ones. Returns how many were new.
    pub fn add_bootstrap(&self, seeds: &[String]) -> usize {
        let mut added = 0;
        for seed in seeds {
            match self.db.add_address(seed) {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => warn!(seed = %seed, error = %e, "Skipping bootstrap address"),
            }
        }
        if added > 0 {
            info!(count = added, "Added bootstrap addresses");
        }
        added
    }

    // -- Control -------------------------------------------------------------

    pub fn enqueue_shutdown(&self) -> Result<i64> {
        Ok(self.db.enqueue_command(SHUTDOWN_COMMAND, "")?)
    }

    // -- Peer-facing ---------------------------------------------------------

    /// Body for a peer's request, or `None` when there is nothing to send.
    pub fn respond(&self, action: &PeerAction) -> Option<Vec<u8>> {
        let body = match action {
            PeerAction::GetDbHash => self.blocks.digest().map(String::into_bytes),
            PeerAction::GetBlockHashes => self
                .blocks
                .list_hashes()
                .map(|hashes| join_lines(hashes.iter().map(BlockHash::as_str))),
            PeerAction::GetData(hash) => match self.blocks.get(hash) {
                Err(StoreError::NotFound) => return None,
                other => other,
            },
            PeerAction::Pex => self
                .db
                .list_addresses(true)
                .map(|addresses| join_lines(addresses.iter().map(|a| a.as_str()))),
            PeerAction::Kex(_) => self
                .db
                .list_peer_keys(true, &self.public_key())
                .map(|keys| join_lines(keys.iter().map(String::as_str))),
        };

        match body {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(action = action.name(), error = %e, "Failed to answer peer request");
                None
            }
        }
    }

    // -- Channel security ----------------------------------------------------

    /// Generate a new symmetric key for `peer` and store it as the peer's
    /// forward key, replacing any previous one.
    pub fn establish_channel_key(&self, peer: &str) -> Result<SymmetricKey> {
        let key = crypto::generate_symmetric_key();
        if !self
            .db
            .set_peer_field(peer, PeerField::ForwardKey, crypto::encode_key(&key))?
        {
            return Err(DaemonError::UnknownPeer(peer.to_string()));
        }
        debug!(peer = %peer, "Established channel key");
        Ok(key)
    }

    /// Store a channel key received from `peer`.
    pub fn set_channel_key(&self, peer: &str, key: &SymmetricKey) -> Result<()> {
        if !self
            .db
            .set_peer_field(peer, PeerField::ForwardKey, crypto::encode_key(key))?
        {
            return Err(DaemonError::UnknownPeer(peer.to_string()));
        }
        Ok(())
    }

    pub fn channel_key(&self, peer: &str) -> Result<SymmetricKey> {
        let record = match self.db.get_peer(peer) {
            Ok(record) => record,
            Err(StoreError::NotFound) => return Err(DaemonError::UnknownPeer(peer.to_string())),
            Err(e) => return Err(e.into()),
        };
        let encoded = record
            .forward_key
            .ok_or_else(|| DaemonError::NoChannelKey(peer.to_string()))?;
        Ok(crypto::decode_key(&encoded)?)
    }

    pub fn encrypt_for_peer(&self, peer: &str, data: &[u8]) -> Result<Vec<u8>> {
        let key = self.channel_key(peer)?;
        Ok(crypto::encrypt(&key, data)?)
    }

    pub fn decrypt_from_peer(&self, peer: &str, data: &[u8]) -> Result<Vec<u8>> {
        let key = self.channel_key(peer)?;
        Ok(crypto::decrypt(&key, data)?)
    }

    /// Public-key encrypt `data` to `peer`; `anonymous` hides the sender.
    pub fn seal_for_peer(&self, peer: &str, data: &[u8], anonymous: bool) -> Result<Vec<u8>> {
        Ok(boxes::encrypt_to_peer(&self.identity, data, peer, anonymous)?)
    }

    pub fn open_from_peer(&self, peer: &str, data: &[u8], anonymous: bool) -> Result<Vec<u8>> {
        Ok(boxes::decrypt_from_peer(&self.identity, data, peer, anonymous)?)
    }

    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        self.identity.sign(data)
    }
}

fn join_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<u8> {
    let mut body = String::new();
    for line in lines {
        body.push_str(line);
        body.push('\n');
    }
    body.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use veilsync_net::split_lines;
    use veilsync_shared::identity::verify_signature;
    use veilsync_shared::CryptoError;

    fn test_node() -> (Node, TempDir) {
        let dir = TempDir::new().unwrap();
        let node = Node::open(dir.path()).unwrap();
        (node, dir)
    }

    #[test]
    fn test_identity_persists() {
        let dir = TempDir::new().unwrap();
        let first = Node::open(dir.path()).unwrap().public_key();
        let second = Node::open(dir.path()).unwrap().public_key();
        assert_eq!(first, second);
        assert!(dir.path().join(KEYS_FILE).exists());
        assert!(dir.path().join(BLOCKS_DIR).is_dir());
    }

    #[test]
    fn test_create_refuses_existing() {
        let dir = TempDir::new().unwrap();
        Node::create(dir.path()).unwrap();
        assert!(matches!(
            Node::create(dir.path()),
            Err(DaemonError::Store(StoreError::AlreadyExists(_)))
        ));
    }

    #[test]
    fn test_corrupt_key_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(KEYS_FILE), "garbage").unwrap();
        assert!(matches!(
            Node::open(dir.path()),
            Err(DaemonError::Identity(_))
        ));
    }

    #[test]
    fn test_local_block_and_type() {
        let (node, _dir) = test_node();
        let hash = node.add_local_block(b"hello").unwrap();
        assert!(node.set_block_type(&hash, "txt").unwrap());
        assert_eq!(node.blocks().list_by_type("txt").unwrap(), vec![hash.clone()]);
        assert_eq!(
            node.respond(&PeerAction::GetData(hash)).as_deref(),
            Some(&b"hello"[..])
        );
    }

    #[test]
    fn test_respond() {
        let (node, _dir) = test_node();
        let a = node.add_local_block(b"a").unwrap();
        let b = node.add_local_block(b"b").unwrap();
        let onion = format!("{}.onion", "q".repeat(56));
        node.add_address(&onion).unwrap();

        let digest = node.respond(&PeerAction::GetDbHash).unwrap();
        assert_eq!(digest, node.blocks().digest().unwrap().into_bytes());

        let hashes = split_lines(&node.respond(&PeerAction::GetBlockHashes).unwrap());
        let mut expected = vec![a.to_string(), b.to_string()];
        expected.sort();
        assert_eq!(hashes, expected);

        let pex = split_lines(&node.respond(&PeerAction::Pex).unwrap());
        assert_eq!(pex, vec![onion]);

        let kex = split_lines(&node.respond(&PeerAction::Kex(None)).unwrap());
        assert_eq!(kex, vec![node.public_key()]);

        assert_eq!(
            node.respond(&PeerAction::GetData(BlockHash::of(b"missing"))),
            None
        );
    }

    #[test]
    fn test_bootstrap_skips_malformed() {
        let (node, _dir) = test_node();
        let seeds = vec![
            format!("{}.onion", "s".repeat(56)),
            "http://example.com".to_string(),
            format!("{}.onion", "t".repeat(16)),
        ];
        assert_eq!(node.add_bootstrap(&seeds), 2);
        assert_eq!(node.add_bootstrap(&seeds), 0);
        assert_eq!(node.list_addresses().unwrap().len(), 2);
    }

    #[test]
    fn test_enqueue_shutdown() {
        let (node, _dir) = test_node();
        node.enqueue_shutdown().unwrap();
        let command = node.database().pop_command().unwrap().unwrap();
        assert_eq!(command.command, SHUTDOWN_COMMAND);
    }

    #[test]
    fn test_channel_key_round_trip() {
        let (alice, _a) = test_node();
        let (bob, _b) = test_node();
        alice.database().add_peer(&bob.public_key(), "bob").unwrap();
        bob.database().add_peer(&alice.public_key(), "alice").unwrap();

        let key = alice.establish_channel_key(&bob.public_key()).unwrap();
        bob.set_channel_key(&alice.public_key(), &key).unwrap();

        let sealed = alice.encrypt_for_peer(&bob.public_key(), b"secret").unwrap();
        assert_eq!(
            bob.decrypt_from_peer(&alice.public_key(), &sealed).unwrap(),
            b"secret"
        );

        // a fresh key on one side breaks the channel loudly
        alice.establish_channel_key(&bob.public_key()).unwrap();
        let sealed = alice.encrypt_for_peer(&bob.public_key(), b"again").unwrap();
        assert!(matches!(
            bob.decrypt_from_peer(&alice.public_key(), &sealed),
            Err(DaemonError::Crypto(CryptoError::DecryptionFailed))
        ));
    }

    #[test]
    fn test_channel_key_requires_known_peer() {
        let (node, _dir) = test_node();
        let stranger = Identity::generate().public_key();
        assert!(matches!(
            node.establish_channel_key(&stranger),
            Err(DaemonError::UnknownPeer(_))
        ));

        node.database().add_peer(&stranger, "").unwrap();
        assert!(matches!(
            node.encrypt_for_peer(&stranger, b"x"),
            Err(DaemonError::NoChannelKey(_))
        ));
    }

    #[test]
    fn test_public_key_boxes() {
        let (alice, _a) = test_node();
        let (bob, _b) = test_node();

        for anonymous in [false, true] {
            let sealed = alice
                .seal_for_peer(&bob.public_key(), b"box", anonymous)
                .unwrap();
            let opened = bob
                .open_from_peer(&alice.public_key(), &sealed, anonymous)
                .unwrap();
            assert_eq!(opened, b"box");
        }
    }

    #[test]
    fn test_signatures() {
        let (node, _dir) = test_node();
        let signature = node.sign(b"block");
        assert!(verify_signature(&node.public_key(), b"block", &signature).is_ok());
        assert!(verify_signature(&node.public_key(), b"other", &signature).is_err());
    }
}
