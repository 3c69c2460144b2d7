//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `blocks`, `addresses`, `peers` and
//! `commands`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Block index (append-only log of known content)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS blocks (
    hash        TEXT PRIMARY KEY NOT NULL,    -- lowercase hex SHA3-256
    received_at TEXT NOT NULL,                -- RFC-3339
    decrypted   INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    data_type   TEXT NOT NULL DEFAULT '',
    data_found  INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    data_saved  INTEGER NOT NULL DEFAULT 0    -- boolean 0/1
);

CREATE INDEX IF NOT EXISTS idx_blocks_saved ON blocks(data_saved);
CREATE INDEX IF NOT EXISTS idx_blocks_type ON blocks(data_type);

-- ----------------------------------------------------------------
-- Address directory
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS addresses (
    address    TEXT PRIMARY KEY NOT NULL,     -- validated hidden-service name
    kind       INTEGER NOT NULL,              -- 1 i2p b32, 2 tor v2, 3 tor v3
    known_peer TEXT,                          -- base32 public key
    speed      INTEGER NOT NULL DEFAULT 0,
    success    INTEGER NOT NULL DEFAULT 0,
    failure    INTEGER NOT NULL DEFAULT 0,
    db_hash    TEXT,                          -- last observed block-index digest
    added_at   TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Peer identities
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS peers (
    pubkey       TEXT PRIMARY KEY NOT NULL,   -- base32 Ed25519 public key
    name         TEXT NOT NULL DEFAULT '',
    addresses    TEXT NOT NULL DEFAULT '',
    forward_key  TEXT,                        -- base32 32-byte symmetric key
    first_seen   TEXT NOT NULL,
    bytes_stored INTEGER NOT NULL DEFAULT 0,
    trust        INTEGER NOT NULL DEFAULT 0
);

-- ----------------------------------------------------------------
-- Daemon command queue
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS commands (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    command     TEXT NOT NULL,
    data        TEXT NOT NULL DEFAULT '',
    enqueued_at TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
