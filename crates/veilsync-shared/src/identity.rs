use std::fs;
use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use tracing::info;
use x25519_dalek::StaticSecret;

use crate::constants::{PUBKEY_SIZE, SECRET_KEY_SIZE, SIGNATURE_SIZE};
use crate::error::{CryptoError, IdentityError};

/// The local node's Ed25519 key pair. Its base32 public key is the node's
/// identity on the network.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Restore identity from secret key bytes
    pub fn from_secret_bytes(secret: &[u8; SECRET_KEY_SIZE]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        Self { signing_key }
    }

    /// Load the identity stored at `path`, generating and persisting one if
    /// the file does not exist. An existing file is never overwritten: if it
    /// cannot be parsed the error is returned.
    pub fn load_or_generate(path: &Path) -> Result<Self, IdentityError> {
        if path.exists() {
            return Self::load(path);
        }

        let identity = Self::generate();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_private(path, identity.to_key_line().as_bytes())?;
        info!(path = %path.display(), "generated new node identity");
        Ok(identity)
    }

    /// Load an identity from a `public,secret` base32 key line.
    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let line = fs::read_to_string(path)?;
        Self::from_key_line(&line)
    }

    pub fn from_key_line(line: &str) -> Result<Self, IdentityError> {
        let (public, secret) = line
            .trim()
            .split_once(',')
            .ok_or_else(|| IdentityError::KeyFile("expected `public,secret`".to_string()))?;

        let secret = data_encoding::BASE32
            .decode(secret.as_bytes())
            .map_err(|e| IdentityError::KeyFile(e.to_string()))?;
        let secret: [u8; SECRET_KEY_SIZE] = secret
            .as_slice()
            .try_into()
            .map_err(|_| IdentityError::InvalidKeyBytes)?;

        let identity = Self::from_secret_bytes(&secret);
        if identity.public_key() != public {
            return Err(IdentityError::KeyMismatch);
        }
        Ok(identity)
    }

    pub fn to_key_line(&self) -> String {
        format!("{},{}", self.public_key(), self.secret_key())
    }

    /// Base32 public key
    pub fn public_key(&self) -> String {
        data_encoding::BASE32.encode(self.signing_key.verifying_key().as_bytes())
    }

    fn secret_key(&self) -> String {
        data_encoding::BASE32.encode(self.signing_key.as_bytes())
    }

    /// Get the raw public key bytes
    pub fn public_key_bytes(&self) -> [u8; PUBKEY_SIZE] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Detached signature over `message`
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Get the verifying (public) key
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// The X25519 secret matching this key pair, for box encryption.
    pub(crate) fn x25519_secret(&self) -> StaticSecret {
        StaticSecret::from(self.signing_key.to_scalar_bytes())
    }
}

/// Decode a base32 Ed25519 public key.
pub fn decode_public_key(encoded: &str) -> Result<VerifyingKey, CryptoError> {
    let bytes = data_encoding::BASE32
        .decode(encoded.trim().as_bytes())
        .map_err(|_| CryptoError::InvalidKeyEncoding)?;
    let bytes: [u8; PUBKEY_SIZE] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength)?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| CryptoError::InvalidPublicKey)
}

/// Verify a detached signature against a base32 public key
pub fn verify_signature(
    public_key: &str,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let verifying_key = decode_public_key(public_key)?;
    let signature = Signature::from_slice(signature).map_err(|_| CryptoError::InvalidKeyLength)?;
    verifying_key
        .verify(message, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    fs::write(path, contents)
}
