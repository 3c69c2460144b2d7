//! Whitelisted mutable columns of the address and peer directories.
//!
//! Callers name a column with an enum variant; the only string-to-column
//! mapping is [`FromStr`], so an unknown name is rejected before any SQL
//! is built.

use std::str::FromStr;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressField {
    Kind,
    KnownPeer,
    Speed,
    Success,
    Failure,
    LastDigest,
}

impl AddressField {
    pub const ALL: [AddressField; 6] = [
        Self::Kind,
        Self::KnownPeer,
        Self::Speed,
        Self::Success,
        Self::Failure,
        Self::LastDigest,
    ];

    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::Kind => "kind",
            Self::KnownPeer => "known_peer",
            Self::Speed => "speed",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::LastDigest => "db_hash",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Kind => "type",
            Self::KnownPeer => "knownPeer",
            Self::Speed => "speed",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::LastDigest => "DBHash",
        }
    }
}

impl FromStr for AddressField {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.name() == s)
            .ok_or_else(|| StoreError::InvalidField(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerField {
    Name,
    Addresses,
    ForwardKey,
    FirstSeen,
    BytesStored,
    Trust,
}

impl PeerField {
    pub const ALL: [PeerField; 6] = [
        Self::Name,
        Self::Addresses,
        Self::ForwardKey,
        Self::FirstSeen,
        Self::BytesStored,
        Self::Trust,
    ];

    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Addresses => "addresses",
            Self::ForwardKey => "forward_key",
            Self::FirstSeen => "first_seen",
            Self::BytesStored => "bytes_stored",
            Self::Trust => "trust",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Addresses => "adders",
            Self::ForwardKey => "forwardKey",
            Self::FirstSeen => "dateSeen",
            Self::BytesStored => "bytesStored",
            Self::Trust => "trust",
        }
    }
}

impl FromStr for PeerField {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.name() == s)
            .ok_or_else(|| StoreError::InvalidField(s.to_string()))
    }
}
