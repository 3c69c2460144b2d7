//! Public-key encryption to a peer identified by its Ed25519 key.
//!
//! Both box flavours convert the recipient's Ed25519 key to X25519, run a
//! Diffie-Hellman exchange and seal the payload with the symmetric channel
//! cipher under a BLAKE3-derived key.
//!
//! - authenticated: static local secret x recipient key; only the two
//!   parties can derive the key, so a successful open authenticates the
//!   sender.
//! - sealed (anonymous): a throwaway ephemeral secret x recipient key; the
//!   ephemeral public key is prepended and the sender is not recoverable.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};

use crate::constants::{KDF_CONTEXT_PAIRWISE_BOX, KDF_CONTEXT_SEALED_BOX, PUBKEY_SIZE};
use crate::crypto::{self, SymmetricKey};
use crate::error::CryptoError;
use crate::identity::{decode_public_key, Identity};

/// Encrypt `data` for `peer_public_key` (base32 Ed25519).
pub fn encrypt_to_peer(
    identity: &Identity,
    data: &[u8],
    peer_public_key: &str,
    anonymous: bool,
) -> Result<Vec<u8>, CryptoError> {
    if anonymous {
        seal_anonymous(data, peer_public_key)
    } else {
        seal_to(identity, data, peer_public_key)
    }
}

/// Inverse of [`encrypt_to_peer`]. The peer key is ignored for sealed boxes.
pub fn decrypt_from_peer(
    identity: &Identity,
    data: &[u8],
    peer_public_key: &str,
    anonymous: bool,
) -> Result<Vec<u8>, CryptoError> {
    if anonymous {
        open_anonymous(identity, data)
    } else {
        open_from(identity, data, peer_public_key)
    }
}

pub fn seal_to(
    identity: &Identity,
    data: &[u8],
    peer_public_key: &str,
) -> Result<Vec<u8>, CryptoError> {
    let key = pairwise_key(identity, peer_public_key)?;
    crypto::encrypt(&key, data)
}

pub fn open_from(
    identity: &Identity,
    data: &[u8],
    peer_public_key: &str,
) -> Result<Vec<u8>, CryptoError> {
    let key = pairwise_key(identity, peer_public_key)?;
    crypto::decrypt(&key, data)
}

// Returns ephemeral_pk || nonce || ciphertext || tag
pub fn seal_anonymous(data: &[u8], peer_public_key: &str) -> Result<Vec<u8>, CryptoError> {
    let recipient = x25519_public(peer_public_key)?;
    let ephemeral = StaticSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);

    let shared = ephemeral.diffie_hellman(&recipient);
    let key = sealed_key(shared, &ephemeral_public, &recipient)?;
    let ciphertext = crypto::encrypt(&key, data)?;

    let mut output = Vec::with_capacity(PUBKEY_SIZE + ciphertext.len());
    output.extend_from_slice(ephemeral_public.as_bytes());
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn open_anonymous(identity: &Identity, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < PUBKEY_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }
    let (ephemeral_bytes, ciphertext) = data.split_at(PUBKEY_SIZE);
    let mut ephemeral = [0u8; PUBKEY_SIZE];
    ephemeral.copy_from_slice(ephemeral_bytes);
    let ephemeral_public = PublicKey::from(ephemeral);

    let secret = identity.x25519_secret();
    let own_public = PublicKey::from(&secret);

    let shared = secret.diffie_hellman(&ephemeral_public);
    let key = sealed_key(shared, &ephemeral_public, &own_public)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    crypto::decrypt(&key, ciphertext)
}

fn x25519_public(peer_public_key: &str) -> Result<PublicKey, CryptoError> {
    let verifying = decode_public_key(peer_public_key)?;
    Ok(PublicKey::from(verifying.to_montgomery().to_bytes()))
}

fn pairwise_key(identity: &Identity, peer_public_key: &str) -> Result<SymmetricKey, CryptoError> {
    let peer = x25519_public(peer_public_key)?;
    let secret = identity.x25519_secret();
    let own = PublicKey::from(&secret);

    let shared = secret.diffie_hellman(&peer);
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidPublicKey);
    }

    // order the public keys so both ends derive the same key
    let (first, second) = if own.as_bytes() <= peer.as_bytes() {
        (own, peer)
    } else {
        (peer, own)
    };
    Ok(crypto::derive_key(
        KDF_CONTEXT_PAIRWISE_BOX,
        &[shared.as_bytes(), first.as_bytes(), second.as_bytes()],
    ))
}

fn sealed_key(
    shared: SharedSecret,
    ephemeral_public: &PublicKey,
    recipient: &PublicKey,
) -> Result<SymmetricKey, CryptoError> {
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidPublicKey);
    }
    Ok(crypto::derive_key(
        KDF_CONTEXT_SEALED_BOX,
        &[
            shared.as_bytes(),
            ephemeral_public.as_bytes(),
            recipient.as_bytes(),
        ],
    ))
}
