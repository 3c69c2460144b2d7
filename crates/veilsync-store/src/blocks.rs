//! Block index operations on [`Database`].

use chrono::Utc;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use veilsync_shared::BlockHash;

use crate::database::Database;
use crate::error::{not_found, Result};
use crate::models::{parse_timestamp, BlockRecord};

impl Database {
    /// Insert a pending entry for `hash` unless it is already known.
    /// Returns `true` if a row was inserted.
    pub fn insert_block_hash(&self, hash: &BlockHash, saved: bool) -> Result<bool> {
        let affected = self.connect()?.execute(
            "INSERT OR IGNORE INTO blocks (hash, received_at, decrypted, data_type, data_found, data_saved)
             VALUES (?1, ?2, 0, '', ?3, ?3)",
            params![hash.as_str(), Utc::now().to_rfc3339(), saved as i32],
        )?;
        Ok(affected > 0)
    }

    pub fn has_block(&self, hash: &BlockHash) -> Result<bool> {
        let found = self
            .connect()?
            .query_row(
                "SELECT 1 FROM blocks WHERE hash = ?1",
                params![hash.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get_block_record(&self, hash: &BlockHash) -> Result<BlockRecord> {
        self.connect()?
            .query_row(
                "SELECT hash, received_at, decrypted, data_type, data_found, data_saved
                 FROM blocks
                 WHERE hash = ?1",
                params![hash.as_str()],
                row_to_block,
            )
            .map_err(not_found)
    }

    /// Record that content for `hash` is on disk, tagging it with
    /// `inferred_type` if the entry has no type yet.
    pub fn mark_block_saved(&self, hash: &BlockHash, inferred_type: Option<&str>) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT OR IGNORE INTO blocks (hash, received_at, decrypted, data_type, data_found, data_saved)
             VALUES (?1, ?2, 0, '', 0, 0)",
            params![hash.as_str(), Utc::now().to_rfc3339()],
        )?;
        tx.execute(
            "UPDATE blocks
             SET data_found = 1,
                 data_saved = 1,
                 data_type = CASE WHEN ?2 IS NOT NULL AND data_type = '' THEN ?2 ELSE data_type END
             WHERE hash = ?1",
            params![hash.as_str(), inferred_type],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Returns `true` if the entry existed.
    pub fn set_block_type(&self, hash: &BlockHash, data_type: &str) -> Result<bool> {
        let affected = self.connect()?.execute(
            "UPDATE blocks SET data_type = ?2 WHERE hash = ?1",
            params![hash.as_str(), data_type],
        )?;
        Ok(affected > 0)
    }

    pub fn set_block_decrypted(&self, hash: &BlockHash, decrypted: bool) -> Result<bool> {
        let affected = self.connect()?.execute(
            "UPDATE blocks SET decrypted = ?2 WHERE hash = ?1",
            params![hash.as_str(), decrypted as i32],
        )?;
        Ok(affected > 0)
    }

    /// Every known hash, sorted.
    pub fn list_block_hashes(&self) -> Result<Vec<BlockHash>> {
        self.query_hashes("SELECT hash FROM blocks ORDER BY hash ASC", params![])
    }

    /// Hashes whose content has not been saved yet, oldest first.
    pub fn list_unsaved_blocks(&self) -> Result<Vec<BlockHash>> {
        self.query_hashes(
            "SELECT hash FROM blocks WHERE data_saved = 0 ORDER BY received_at ASC, hash ASC",
            params![],
        )
    }

    pub fn list_blocks_by_type(&self, data_type: &str) -> Result<Vec<BlockHash>> {
        self.query_hashes(
            "SELECT hash FROM blocks WHERE data_type = ?1 ORDER BY received_at ASC, hash ASC",
            params![data_type],
        )
    }

    /// SHA3-256 over the sorted index, one `hash\n` line per entry.
    ///
    /// Peers compare this value to decide whether a full hash listing is
    /// worth fetching.
    pub fn block_digest(&self) -> Result<String> {
        let listing = self
            .list_block_hashes()?
            .iter()
            .fold(String::new(), |mut acc, hash| {
                acc.push_str(hash.as_str());
                acc.push('\n');
                acc
            });
        Ok(BlockHash::of(listing.as_bytes()).to_string())
    }

    fn query_hashes(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<BlockHash>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| {
            let hash: String = row.get(0)?;
            parse_hash(0, &hash)
        })?;

        let mut hashes = Vec::new();
        for row in rows {
            hashes.push(row?);
        }
        Ok(hashes)
    }
}

fn parse_hash(idx: usize, hash: &str) -> rusqlite::Result<BlockHash> {
    BlockHash::parse(hash).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_block(row: &rusqlite::Row<'_>) -> rusqlite::Result<BlockRecord> {
    let hash_str: String = row.get(0)?;
    let received_str: String = row.get(1)?;
    let decrypted: i32 = row.get(2)?;
    let data_type: String = row.get(3)?;
    let data_found: i32 = row.get(4)?;
    let data_saved: i32 = row.get(5)?;

    let hash = parse_hash(0, &hash_str)?;
    let received_at = parse_timestamp(1, &received_str)?;

    Ok(BlockRecord {
        hash,
        received_at,
        decrypted: decrypted != 0,
        data_type,
        data_found: data_found != 0,
        data_saved: data_saved != 0,
    })
}
