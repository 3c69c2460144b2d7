use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::constants::MAX_TYPE_TAG_LEN;
use crate::error::ValidationError;
use crate::validate;

/// Hex SHA3-256 digest naming a block. Always stored lowercase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHash(String);

impl BlockHash {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if !validate::is_valid_hash(s) {
            return Err(ValidationError::InvalidHash(s.to_string()));
        }
        Ok(Self(s.trim().to_ascii_lowercase()))
    }

    /// Hash of the exact bytes of a block.
    pub fn of(data: &[u8]) -> Self {
        Self(hex::encode(Sha3_256::digest(data)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl std::fmt::Display for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Stored as an integer in the address directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AddressKind {
    I2pB32 = 1,
    TorV2 = 2,
    TorV3 = 3,
}

impl AddressKind {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::I2pB32),
            2 => Some(Self::TorV2),
            3 => Some(Self::TorV3),
            _ => None,
        }
    }

    pub fn is_tor(self) -> bool {
        matches!(self, Self::TorV2 | Self::TorV3)
    }
}

/// A hidden-service address that passed the shape validator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    address: String,
    kind: AddressKind,
}

impl PeerAddress {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let kind = validate::address_kind(s)
            .ok_or_else(|| ValidationError::InvalidAddress(s.to_string()))?;
        Ok(Self {
            address: s.to_string(),
            kind,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.address
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.address)
    }
}

/// Content type from a `-tag-` prefix, e.g. `-txt-hello` -> `txt`.
pub fn infer_type_tag(data: &[u8]) -> Option<String> {
    let rest = data.strip_prefix(b"-")?;
    let end = rest.iter().position(|&b| b == b'-')?;
    let tag = &rest[..end];
    if tag.is_empty() || tag.len() > MAX_TYPE_TAG_LEN || !tag.iter().all(u8::is_ascii_alphanumeric)
    {
        return None;
    }
    // checked ASCII above
    Some(String::from_utf8_lossy(tag).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_hash_normalized() {
        let upper = "AB".repeat(32);
        let hash = BlockHash::parse(&format!(" {upper} ")).unwrap();
        assert_eq!(hash.as_str(), "ab".repeat(32));
    }

    #[test]
    fn test_block_hash_of_known_vector() {
        // SHA3-256("")
        assert_eq!(
            BlockHash::of(b"").as_str(),
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
        );
    }

    #[test]
    fn test_peer_address_kind() {
        let addr = PeerAddress::parse(&format!("{}.onion", "x".repeat(56))).unwrap();
        assert_eq!(addr.kind(), AddressKind::TorV3);
        assert!(PeerAddress::parse("localhost").is_err());
    }

    #[test]
    fn test_kind_codes() {
        for kind in [AddressKind::I2pB32, AddressKind::TorV2, AddressKind::TorV3] {
            assert_eq!(AddressKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(AddressKind::from_code(9), None);
    }

    #[test]
    fn test_infer_type_tag() {
        assert_eq!(infer_type_tag(b"-txt-hello"), Some("txt".to_string()));
        assert_eq!(infer_type_tag(b"-pm-"), Some("pm".to_string()));
        assert_eq!(infer_type_tag(b"txt-hello"), None);
        assert_eq!(infer_type_tag(b"--hello"), None);
        assert_eq!(infer_type_tag(b"-t x-hello"), None);
        assert_eq!(infer_type_tag(b"-abcdefghijklmnopq-"), None);
    }
}
