/// Application name
pub const APP_NAME: &str = "veilsync";

/// Well-known path every peer answers actions on
pub const PUBLIC_PATH: &str = "/public/";

/// User agent sent with outbound peer requests
pub const USER_AGENT: &str = "veilsync";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Ed25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// Ed25519 secret key size in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Ed25519 detached signature size in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Length of a hex SHA3-256 block hash
pub const BLOCK_HASH_LEN: usize = 64;

/// Largest block accepted from a peer or stored locally (10 MiB)
pub const MAX_BLOCK_SIZE: usize = 10 * 1024 * 1024;

/// Longest content type tag recognised in a `-tag-` prefix
pub const MAX_TYPE_TAG_LEN: usize = 16;

/// Hidden-service suffixes
pub const ONION_SUFFIX: &str = ".onion";
pub const I2P_B32_SUFFIX: &str = ".b32.i2p";

/// Full address lengths, suffix included
pub const TOR_V2_ADDRESS_LEN: usize = 22;
pub const TOR_V3_ADDRESS_LEN: usize = 62;
pub const I2P_B32_ADDRESS_LEN: usize = 60;

/// Default proof-of-work worker thread count
pub const DEFAULT_POW_WORKERS: usize = 3;

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_PAIRWISE_BOX: &str = "veilsync-pairwise-box-v1";
pub const KDF_CONTEXT_SEALED_BOX: &str = "veilsync-sealed-box-v1";
