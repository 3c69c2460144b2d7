//! Address directory operations on [`Database`].

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::debug;
use veilsync_shared::{AddressKind, PeerAddress};

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::fields::AddressField;
use crate::models::{parse_timestamp, AddressRecord, FieldValue};

impl Database {
    /// Add `address` if it is well-formed and not yet known.
    /// Returns `true` if a row was inserted.
    pub fn add_address(&self, address: &str) -> Result<bool> {
        let address = PeerAddress::parse(address)?;
        let affected = self.connect()?.execute(
            "INSERT OR IGNORE INTO addresses (address, kind, added_at) VALUES (?1, ?2, ?3)",
            params![
                address.as_str(),
                address.kind().code(),
                Utc::now().to_rfc3339()
            ],
        )?;
        if affected > 0 {
            debug!(address = %address, "added address");
        }
        Ok(affected > 0)
    }

    pub fn remove_address(&self, address: &str) -> Result<bool> {
        let address = PeerAddress::parse(address)?;
        let affected = self.connect()?.execute(
            "DELETE FROM addresses WHERE address = ?1",
            params![address.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Every known address. With `random` the order is shuffled per call so
    /// contact order cannot be predicted from outside.
    pub fn list_addresses(&self, random: bool) -> Result<Vec<PeerAddress>> {
        let sql = if random {
            "SELECT address FROM addresses ORDER BY RANDOM()"
        } else {
            "SELECT address FROM addresses ORDER BY added_at ASC, address ASC"
        };
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            let address: String = row.get(0)?;
            parse_address(0, &address)
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn list_address_records(&self) -> Result<Vec<AddressRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT address, kind, known_peer, speed, success, failure, db_hash, added_at
             FROM addresses
             ORDER BY added_at ASC, address ASC",
        )?;
        let rows = stmt.query_map([], row_to_address)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn get_address(&self, address: &PeerAddress) -> Result<AddressRecord> {
        self.connect()?
            .query_row(
                "SELECT address, kind, known_peer, speed, success, failure, db_hash, added_at
                 FROM addresses
                 WHERE address = ?1",
                params![address.as_str()],
                row_to_address,
            )
            .map_err(not_found)
    }

    pub fn get_address_field(&self, address: &PeerAddress, field: AddressField) -> Result<FieldValue> {
        let sql = format!(
            "SELECT {} FROM addresses WHERE address = ?1",
            field.column()
        );
        self.connect()?
            .query_row(&sql, params![address.as_str()], |row| row.get(0))
            .map_err(not_found)
    }

    /// Returns `true` if the address exists and was updated.
    pub fn set_address_field(
        &self,
        address: &PeerAddress,
        field: AddressField,
        value: impl Into<FieldValue>,
    ) -> Result<bool> {
        let value = value.into();
        check_address_value(field, &value)?;
        let sql = format!(
            "UPDATE addresses SET {} = ?2 WHERE address = ?1",
            field.column()
        );
        let affected = self
            .connect()?
            .execute(&sql, params![address.as_str(), value])?;
        Ok(affected > 0)
    }

    /// String-keyed variant for external callers. An unknown `name` fails
    /// with [`StoreError::InvalidField`] before anything is written.
    pub fn set_address_field_by_name(
        &self,
        address: &PeerAddress,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<bool> {
        let field: AddressField = name.parse()?;
        self.set_address_field(address, field, value)
    }

    /// Block-index digest last observed at `address`.
    pub fn address_digest(&self, address: &PeerAddress) -> Result<Option<String>> {
        let digest = self
            .connect()?
            .query_row(
                "SELECT db_hash FROM addresses WHERE address = ?1",
                params![address.as_str()],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(digest.flatten())
    }

    pub fn set_address_digest(&self, address: &PeerAddress, digest: &str) -> Result<bool> {
        self.set_address_field(address, AddressField::LastDigest, digest)
    }

    /// Add one session's contact counts to the persisted totals.
    pub fn record_session_outcome(
        &self,
        address: &PeerAddress,
        successes: u32,
        failures: u32,
    ) -> Result<bool> {
        let affected = self.connect()?.execute(
            "UPDATE addresses
             SET success = success + ?2, failure = failure + ?3
             WHERE address = ?1",
            params![address.as_str(), successes, failures],
        )?;
        Ok(affected > 0)
    }
}

fn check_address_value(field: AddressField, value: &FieldValue) -> Result<()> {
    let ok = match field {
        AddressField::Kind => value
            .as_integer()
            .and_then(AddressKind::from_code)
            .is_some(),
        AddressField::Speed | AddressField::Success | AddressField::Failure => {
            value.as_integer().is_some()
        }
        AddressField::KnownPeer | AddressField::LastDigest => {
            matches!(value, FieldValue::Null | FieldValue::Text(_))
        }
    };
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidField(format!("{}={value:?}", field.name())))
    }
}

fn parse_address(idx: usize, address: &str) -> rusqlite::Result<PeerAddress> {
    PeerAddress::parse(address).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_address(row: &rusqlite::Row<'_>) -> rusqlite::Result<AddressRecord> {
    let address_str: String = row.get(0)?;
    let kind_code: i64 = row.get(1)?;
    let added_str: String = row.get(7)?;

    let address = parse_address(0, &address_str)?;
    let kind = AddressKind::from_code(kind_code).unwrap_or_else(|| address.kind());

    Ok(AddressRecord {
        address,
        kind,
        known_peer: row.get(2)?,
        speed: row.get(3)?,
        success: row.get(4)?,
        failure: row.get(5)?,
        last_digest: row.get(6)?,
        added_at: parse_timestamp(7, &added_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_db() -> (Database, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    fn onion(c: char) -> String {
        format!("{}.onion", c.to_string().repeat(56))
    }

    #[test]
    fn test_add_and_list() {
        let (db, _dir) = test_db();
        assert!(db.add_address(&onion('a')).unwrap());
        assert!(!db.add_address(&onion('a')).unwrap());
        assert!(db.add_address(&format!("{}.b32.i2p", "b".repeat(52))).unwrap());

        let listed = db.list_addresses(false).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].as_str(), onion('a'));
        assert_eq!(listed[1].kind(), AddressKind::I2pB32);

        let mut shuffled = db.list_addresses(true).unwrap();
        shuffled.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        let mut ordered = listed.clone();
        ordered.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(shuffled, ordered);
    }

    #[test]
    fn test_malformed_address_rejected() {
        let (db, _dir) = test_db();
        assert!(matches!(
            db.add_address("example.com"),
            Err(StoreError::Invalid(_))
        ));
        assert!(db.remove_address("nope").is_err());
        assert!(db.list_addresses(false).unwrap().is_empty());
    }

    #[test]
    fn test_remove_address() {
        let (db, _dir) = test_db();
        db.add_address(&onion('c')).unwrap();
        assert!(db.remove_address(&onion('c')).unwrap());
        assert!(!db.remove_address(&onion('c')).unwrap());
    }

    #[test]
    fn test_field_get_set() {
        let (db, _dir) = test_db();
        db.add_address(&onion('d')).unwrap();
        let addr = PeerAddress::parse(&onion('d')).unwrap();

        assert!(db.set_address_field(&addr, AddressField::Speed, 42).unwrap());
        assert_eq!(
            db.get_address_field(&addr, AddressField::Speed).unwrap(),
            FieldValue::Integer(42)
        );
        assert!(db
            .set_address_field_by_name(&addr, "knownPeer", "SOMEKEY")
            .unwrap());
        assert_eq!(db.get_address(&addr).unwrap().known_peer.as_deref(), Some("SOMEKEY"));
        assert_eq!(
            db.get_address_field(&addr, AddressField::Kind).unwrap(),
            FieldValue::Integer(AddressKind::TorV3.code())
        );
    }

    #[test]
    fn test_unknown_field_changes_nothing() {
        let (db, _dir) = test_db();
        db.add_address(&onion('e')).unwrap();
        let addr = PeerAddress::parse(&onion('e')).unwrap();
        let before = db.get_address(&addr).unwrap();

        assert!(matches!(
            db.set_address_field_by_name(&addr, "address", "x"),
            Err(StoreError::InvalidField(_))
        ));
        assert!(matches!(
            db.set_address_field(&addr, AddressField::Kind, 9),
            Err(StoreError::InvalidField(_))
        ));
        assert_eq!(db.get_address(&addr).unwrap(), before);
    }

    #[test]
    fn test_digest_and_session_outcome() {
        let (db, _dir) = test_db();
        db.add_address(&onion('f')).unwrap();
        let addr = PeerAddress::parse(&onion('f')).unwrap();

        assert_eq!(db.address_digest(&addr).unwrap(), None);
        db.set_address_digest(&addr, "aaaa").unwrap();
        assert_eq!(db.address_digest(&addr).unwrap().as_deref(), Some("aaaa"));

        db.record_session_outcome(&addr, 3, 1).unwrap();
        db.record_session_outcome(&addr, 1, 2).unwrap();
        let record = db.get_address(&addr).unwrap();
        assert_eq!((record.success, record.failure), (4, 3));
    }
}
