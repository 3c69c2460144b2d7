use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid key length")]
    InvalidKeyLength,

    #[error("Invalid key encoding")]
    InvalidKeyEncoding,

    #[error("Public key is not a usable curve point")]
    InvalidPublicKey,

    #[error("Signature verification failed")]
    InvalidSignature,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid key bytes")]
    InvalidKeyBytes,

    #[error("Key file error: {0}")]
    KeyFile(String),

    #[error("Key file public key does not match its secret key")]
    KeyMismatch,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed-input rejections. These never touch stored state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid block hash: {0:?}")]
    InvalidHash(String),

    #[error("Invalid peer address: {0:?}")]
    InvalidAddress(String),

    #[error("Invalid public key: {0:?}")]
    InvalidPublicKey(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PowError {
    #[error("Difficulty {0} exceeds the puzzle length")]
    DifficultyTooHigh(usize),

    #[error("A round is already being solved")]
    AlreadySolving,

    #[error("At least one worker is required")]
    NoWorkers,
}
