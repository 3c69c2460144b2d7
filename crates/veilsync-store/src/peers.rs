//! Peer identity directory operations on [`Database`].

use chrono::Utc;
use rusqlite::params;
use veilsync_shared::validate::is_valid_public_key;
use veilsync_shared::ValidationError;

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::fields::PeerField;
use crate::models::{parse_timestamp, FieldValue, PeerRecord};

impl Database {
    /// Add a peer by its base32 Ed25519 key. Returns `true` if the key was new.
    pub fn add_peer(&self, public_key: &str, name: &str) -> Result<bool> {
        let public_key = public_key.trim();
        if !is_valid_public_key(public_key) {
            return Err(ValidationError::InvalidPublicKey(public_key.to_string()).into());
        }
        let affected = self.connect()?.execute(
            "INSERT OR IGNORE INTO peers (pubkey, name, first_seen) VALUES (?1, ?2, ?3)",
            params![public_key, name, Utc::now().to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    pub fn remove_peer(&self, public_key: &str) -> Result<bool> {
        let affected = self
            .connect()?
            .execute("DELETE FROM peers WHERE pubkey = ?1", params![public_key.trim()])?;
        Ok(affected > 0)
    }

    pub fn get_peer(&self, public_key: &str) -> Result<PeerRecord> {
        self.connect()?
            .query_row(
                "SELECT pubkey, name, addresses, forward_key, first_seen, bytes_stored, trust
                 FROM peers
                 WHERE pubkey = ?1",
                params![public_key.trim()],
                row_to_peer,
            )
            .map_err(not_found)
    }

    pub fn list_peers(&self) -> Result<Vec<PeerRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT pubkey, name, addresses, forward_key, first_seen, bytes_stored, trust
             FROM peers
             ORDER BY first_seen ASC, pubkey ASC",
        )?;
        let rows = stmt.query_map([], row_to_peer)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Known peer keys, optionally shuffled, with `local_key` always last.
    pub fn list_peer_keys(&self, random: bool, local_key: &str) -> Result<Vec<String>> {
        let sql = if random {
            "SELECT pubkey FROM peers WHERE pubkey != ?1 ORDER BY RANDOM()"
        } else {
            "SELECT pubkey FROM peers WHERE pubkey != ?1 ORDER BY first_seen ASC, pubkey ASC"
        };
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![local_key], |row| row.get::<_, String>(0))?;
        let mut keys = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        keys.push(local_key.to_string());
        Ok(keys)
    }

    pub fn get_peer_field(&self, public_key: &str, field: PeerField) -> Result<FieldValue> {
        let sql = format!("SELECT {} FROM peers WHERE pubkey = ?1", field.column());
        self.connect()?
            .query_row(&sql, params![public_key.trim()], |row| row.get(0))
            .map_err(not_found)
    }

    /// Returns `true` if the peer exists and was updated.
    pub fn set_peer_field(
        &self,
        public_key: &str,
        field: PeerField,
        value: impl Into<FieldValue>,
    ) -> Result<bool> {
        let value = value.into();
        check_peer_value(field, &value)?;
        let sql = format!("UPDATE peers SET {} = ?2 WHERE pubkey = ?1", field.column());
        let affected = self
            .connect()?
            .execute(&sql, params![public_key.trim(), value])?;
        Ok(affected > 0)
    }

    pub fn set_peer_field_by_name(
        &self,
        public_key: &str,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<bool> {
        let field: PeerField = name.parse()?;
        self.set_peer_field(public_key, field, value)
    }
}

fn check_peer_value(field: PeerField, value: &FieldValue) -> Result<()> {
    let ok = match field {
        PeerField::BytesStored | PeerField::Trust => value.as_integer().is_some(),
        PeerField::Name | PeerField::Addresses => value.as_text().is_some(),
        PeerField::ForwardKey => matches!(value, FieldValue::Null | FieldValue::Text(_)),
        PeerField::FirstSeen => value
            .as_text()
            .is_some_and(|ts| chrono::DateTime::parse_from_rfc3339(ts).is_ok()),
    };
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidField(format!("{}={value:?}", field.name())))
    }
}

fn row_to_peer(row: &rusqlite::Row<'_>) -> rusqlite::Result<PeerRecord> {
    let first_seen: String = row.get(4)?;
    Ok(PeerRecord {
        public_key: row.get(0)?,
        name: row.get(1)?,
        addresses: row.get(2)?,
        forward_key: row.get(3)?,
        first_seen: parse_timestamp(4, &first_seen)?,
        bytes_stored: row.get(5)?,
        trust: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use veilsync_shared::Identity;

    fn test_db() -> (Database, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    #[test]
    fn test_add_and_get_peer() {
        let (db, _dir) = test_db();
        let key = Identity::generate().public_key();

        assert!(db.add_peer(&key, "alice").unwrap());
        assert!(!db.add_peer(&key, "again").unwrap());

        let peer = db.get_peer(&key).unwrap();
        assert_eq!(peer.name, "alice");
        assert_eq!(peer.trust, 0);
        assert!(peer.forward_key.is_none());
        assert_eq!(db.list_peers().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_key_rejected() {
        let (db, _dir) = test_db();
        assert!(matches!(
            db.add_peer("not base32!", ""),
            Err(StoreError::Invalid(ValidationError::InvalidPublicKey(_)))
        ));
        assert!(db.list_peers().unwrap().is_empty());
    }

    #[test]
    fn test_local_key_always_last() {
        let (db, _dir) = test_db();
        let local = Identity::generate().public_key();
        let others: Vec<String> = (0..3).map(|_| Identity::generate().public_key()).collect();
        for key in &others {
            db.add_peer(key, "").unwrap();
        }
        // a stored copy of the local key is not listed twice
        db.add_peer(&local, "me").unwrap();

        for random in [false, true] {
            let keys = db.list_peer_keys(random, &local).unwrap();
            assert_eq!(keys.len(), 4);
            assert_eq!(keys.last(), Some(&local));
        }

        let (empty, _dir2) = test_db();
        assert_eq!(empty.list_peer_keys(true, &local).unwrap(), vec![local]);
    }

    #[test]
    fn test_peer_fields() {
        let (db, _dir) = test_db();
        let key = Identity::generate().public_key();
        db.add_peer(&key, "").unwrap();

        assert!(db.set_peer_field(&key, PeerField::Trust, 7).unwrap());
        assert!(db.set_peer_field_by_name(&key, "name", "bob").unwrap());
        assert_eq!(
            db.get_peer_field(&key, PeerField::Trust).unwrap(),
            FieldValue::Integer(7)
        );
        assert_eq!(db.get_peer(&key).unwrap().name, "bob");
    }

    #[test]
    fn test_unknown_peer_field_changes_nothing() {
        let (db, _dir) = test_db();
        let key = Identity::generate().public_key();
        db.add_peer(&key, "carol").unwrap();
        let before = db.get_peer(&key).unwrap();

        assert!(matches!(
            db.set_peer_field_by_name(&key, "pubkey", "x"),
            Err(StoreError::InvalidField(_))
        ));
        assert!(db.set_peer_field(&key, PeerField::Trust, "high").is_err());
        assert_eq!(db.get_peer(&key).unwrap(), before);
    }

    #[test]
    fn test_remove_peer() {
        let (db, _dir) = test_db();
        let key = Identity::generate().public_key();
        db.add_peer(&key, "").unwrap();
        assert!(db.remove_peer(&key).unwrap());
        assert!(matches!(db.get_peer(&key), Err(StoreError::NotFound)));
    }
}
