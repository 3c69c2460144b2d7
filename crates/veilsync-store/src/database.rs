//! Database handle management.
//!
//! The [`Database`] struct remembers where the SQLite file lives and hands out
//! a fresh [`rusqlite::Connection`] for every operation. Nothing holds a
//! connection across a network call, so the daemon and an external control
//! process can share the same file; WAL mode and a busy timeout let their
//! short transactions interleave.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use rusqlite::Connection;
use veilsync_shared::constants::APP_NAME;

use crate::error::{Result, StoreError};
use crate::migrations;

/// File name of the index database inside a data directory.
pub const DATABASE_FILE: &str = "veilsync.db";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Location of a migrated veilsync database.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// The platform-appropriate data directory:
    /// - Linux:   `~/.local/share/veilsync`
    /// - macOS:   `~/Library/Application Support/net.veilsync.veilsync`
    /// - Windows: `{FOLDERID_RoamingAppData}\veilsync\veilsync\data`
    pub fn default_data_dir() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("net", APP_NAME, APP_NAME).ok_or(StoreError::NoDataDir)?;
        Ok(project_dirs.data_dir().to_path_buf())
    }

    /// Open (or create) a database at an explicit path and run migrations.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "opening database");

        let db = Self {
            path: path.to_path_buf(),
        };
        let conn = db.connect()?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        migrations::run_migrations(&conn)?;

        Ok(db)
    }

    /// Create a new database, failing if one already exists at `path`.
    pub fn create_at(path: &Path) -> Result<Self> {
        if path.exists() {
            return Err(StoreError::AlreadyExists(path.to_path_buf()));
        }
        Self::open_at(path)
    }

    /// A short-lived connection for one unit of work.
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Return the filesystem path of the database.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
