use thiserror::Error;
use veilsync_net::NetError;
use veilsync_shared::{CryptoError, IdentityError, PowError};
use veilsync_store::StoreError;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Proof of work error: {0}")]
    Pow(#[from] PowError),

    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    #[error("No channel key established with peer {0}")]
    NoChannelKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
