//! Records persisted in the veilsync database.
//!
//! Every struct derives `Serialize` and `Deserialize` so the control plane
//! can render it directly.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Deserialize, Serialize};
use veilsync_shared::{AddressKind, BlockHash, PeerAddress};

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// One entry of the block index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockRecord {
    /// SHA3-256 of the block's exact bytes.
    pub hash: BlockHash,
    /// When this node first learned the hash.
    pub received_at: DateTime<Utc>,
    /// Whether this node could decrypt the block.
    pub decrypted: bool,
    /// Content type tag, empty when unknown.
    pub data_type: String,
    /// Content has been received.
    pub data_found: bool,
    /// Content is on disk in the blob directory.
    pub data_saved: bool,
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A known hidden-service address and its long-term reliability data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressRecord {
    pub address: PeerAddress,
    pub kind: AddressKind,
    /// Public key of the peer believed to run this address.
    pub known_peer: Option<String>,
    pub speed: i64,
    pub success: i64,
    pub failure: i64,
    /// Block-index digest observed at the last reconciliation.
    pub last_digest: Option<String>,
    pub added_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Peer
// ---------------------------------------------------------------------------

/// A known peer identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerRecord {
    /// Base32 Ed25519 public key.
    pub public_key: String,
    pub name: String,
    /// Addresses the peer is reachable at, as reported.
    pub addresses: String,
    /// Base32 per-peer channel key, once established.
    pub forward_key: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub bytes_stored: i64,
    pub trust: i64,
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A control command waiting for the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueuedCommand {
    pub id: i64,
    pub command: String,
    pub data: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Parse an RFC-3339 column, reporting failures against column `idx`.
pub(crate) fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// Value of a single whitelisted column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Text(String),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Integer(n) => ToSqlOutput::Owned(Value::Integer(*n)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl FromSql for FieldValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(n) => Self::Integer(n),
            ValueRef::Real(f) => Self::Integer(f as i64),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                Self::Text(String::from_utf8_lossy(t).into_owned())
            }
        })
    }
}
