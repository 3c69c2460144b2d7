//! Shape checks for block hashes, hidden-service addresses and public keys.
//!
//! These are pure functions; every store and transport entry point calls
//! them before touching state or the network.

use crate::constants::{
    BLOCK_HASH_LEN, I2P_B32_ADDRESS_LEN, I2P_B32_SUFFIX, ONION_SUFFIX, PUBKEY_SIZE,
    TOR_V2_ADDRESS_LEN, TOR_V3_ADDRESS_LEN,
};
use crate::types::AddressKind;

/// Accepts iff `data`, after trimming, is exactly 64 hex characters.
pub fn is_valid_hash(data: &str) -> bool {
    let data = data.trim();
    data.len() == BLOCK_HASH_LEN && data.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Classify a hidden-service address, or `None` if it has the wrong shape.
///
/// Exactly three shapes are accepted: 22-char and 62-char `.onion` names and
/// 60-char `.b32.i2p` names, each with a non-empty alphanumeric local part.
pub fn address_kind(address: &str) -> Option<AddressKind> {
    let (suffix, kind) = match address.len() {
        I2P_B32_ADDRESS_LEN => (I2P_B32_SUFFIX, AddressKind::I2pB32),
        TOR_V2_ADDRESS_LEN => (ONION_SUFFIX, AddressKind::TorV2),
        TOR_V3_ADDRESS_LEN => (ONION_SUFFIX, AddressKind::TorV3),
        _ => return None,
    };

    let local = address.strip_suffix(suffix)?;
    // a repeated suffix leaves a '.' in the local part, which fails here too
    if local.is_empty() || !local.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    Some(kind)
}

pub fn is_valid_address(address: &str) -> bool {
    address_kind(address).is_some()
}

/// Accepts a base32 Ed25519 public key that decodes to a curve point.
pub fn is_valid_public_key(key: &str) -> bool {
    let Ok(bytes) = data_encoding::BASE32.decode(key.trim().as_bytes()) else {
        return false;
    };
    let Ok(bytes) = <[u8; PUBKEY_SIZE]>::try_from(bytes.as_slice()) else {
        return false;
    };
    ed25519_dalek::VerifyingKey::from_bytes(&bytes).is_ok()
}
