//! Command queue operations on [`Database`].
//!
//! The queue is the only channel from the control process to the daemon.
//! `pop_command` takes an immediate write lock so two consumers can never
//! receive the same row.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::database::Database;
use crate::error::Result;
use crate::models::{parse_timestamp, QueuedCommand};

impl Database {
    /// Append a command. Returns its id.
    pub fn enqueue_command(&self, command: &str, data: &str) -> Result<i64> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO commands (command, data, enqueued_at) VALUES (?1, ?2, ?3)",
            params![command, data, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Remove and return the oldest command, or `None` when the queue is empty.
    pub fn pop_command(&self) -> Result<Option<QueuedCommand>> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let next = tx
            .query_row(
                "SELECT id, command, data, enqueued_at FROM commands ORDER BY id ASC LIMIT 1",
                [],
                row_to_command,
            )
            .optional()?;
        if let Some(command) = &next {
            tx.execute("DELETE FROM commands WHERE id = ?1", params![command.id])?;
        }
        tx.commit()?;
        Ok(next)
    }

    pub fn pending_commands(&self) -> Result<i64> {
        let count = self
            .connect()?
            .query_row("SELECT COUNT(*) FROM commands", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Empty the queue. A database without the table is already empty.
    pub fn clear_commands(&self) -> Result<()> {
        let conn = self.connect()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'commands'",
                [],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            conn.execute("DELETE FROM commands", [])?;
        }
        Ok(())
    }
}

fn row_to_command(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueuedCommand> {
    let enqueued: String = row.get(3)?;
    Ok(QueuedCommand {
        id: row.get(0)?,
        command: row.get(1)?,
        data: row.get(2)?,
        enqueued_at: parse_timestamp(3, &enqueued)?,
    })
}
